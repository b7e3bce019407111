use anyhow::{Context, Result};
use chrono::NaiveDate;
use collector_manager::client::{
    HttpTransport, OAuthApp, ResilientClient, RetryPolicy, Sleeper, TokenManager, TokioSleeper,
    Transport,
};
use collector_manager::collectors::fitbit::resolve_timezone;
use collector_manager::orchestrator::is_fatal;
use collector_manager::registry::default_collectors;
use collector_manager::scheduler::SystemClock;
use collector_manager::window::Window;
use collector_manager::{SyncOrchestrator, SyncSettings};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vitalsync::config::{apply_env, load_config, SyncConfig, TimezoneSetting};
use vitalsync::credentials::{CredentialPair, CredentialStore};
use vitalsync::sink::build_sink;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let mut config = match std::env::var("VITALSYNC_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => SyncConfig::default(),
    };
    apply_env(&mut config).context("Invalid environment configuration")?;

    init_tracing(config.logging.file.as_deref())?;
    info!("Collector Manager starting...");

    if let Err(e) = run(config).await {
        if is_fatal(&e) {
            error!(error = %format!("{:#}", e), "Fatal error, stopping");
        } else {
            error!(error = %format!("{:#}", e), "Sync failed");
        }
        std::process::exit(1);
    }

    info!("Collector Manager stopped");
    Ok(())
}

/// Stdout plus an optional log file, truncated on every start.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collector_manager=info,vitalsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn prompt_date(message: &str) -> Result<NaiveDate> {
    let input = prompt(message)?;
    NaiveDate::parse_from_str(&input, "%Y-%m-%d")
        .with_context(|| format!("'{}' is not a YYYY-MM-DD date", input))
}

/// Stored credentials, or a refresh token typed in on first run.
fn initial_credentials(store: &CredentialStore) -> Result<CredentialPair> {
    if let Some(pair) = store.load()? {
        info!(path = %store.path().display(), "Loaded stored credentials");
        return Ok(pair);
    }

    info!(path = %store.path().display(), "No token file found");
    let refresh_token = prompt("No token file found. Please enter a valid refresh token: ")?;
    anyhow::ensure!(!refresh_token.is_empty(), "A refresh token is required");
    Ok(CredentialPair::from_refresh_token(refresh_token))
}

async fn run(config: SyncConfig) -> Result<()> {
    let store = CredentialStore::new(&config.fitbit.token_file);
    let credentials = initial_credentials(&store)?;

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let tokens = TokenManager::new(
        store,
        OAuthApp {
            client_id: config.fitbit.client_id.clone(),
            client_secret: config.fitbit.client_secret.clone(),
            token_url: config.fitbit.token_url(),
        },
        credentials,
    );
    let mut client = ResilientClient::new(
        transport,
        Arc::clone(&sleeper),
        RetryPolicy::from(&config.retry),
        tokens,
        config.fitbit.api_base_url.clone(),
        config.fitbit.language.clone(),
    );

    // Every run starts from a freshly rotated token
    client.refresh_token().await?;
    info!("Access token refreshed");

    let timezone = match config.fitbit.timezone_setting()? {
        TimezoneSetting::Fixed(tz) => tz,
        TimezoneSetting::Automatic => {
            let tz = resolve_timezone(&mut client).await?;
            info!(timezone = %tz, "Resolved timezone from profile");
            tz
        }
    };

    let sink = build_sink(&config.influxdb)?;
    info!(sink = sink.name(), "Sink ready");

    let settings = SyncSettings {
        device: config.fitbit.device_name.clone(),
        timezone,
        trailing_days: config.schedule.trailing_days,
        poll_interval: Duration::from_secs(config.schedule.poll_interval_seconds),
    };
    let mut orchestrator = SyncOrchestrator::new(
        client,
        sink,
        default_collectors(),
        settings,
        Arc::new(SystemClock),
        sleeper,
    );

    if config.schedule.auto_date_range {
        orchestrator.run_incremental().await?;
    } else {
        let start = prompt_date("Enter start date in YYYY-MM-DD format: ")?;
        let end = prompt_date("Enter end date in YYYY-MM-DD format: ")?;
        orchestrator.run_bulk(Window::new(start, end)).await?;
    }

    if config.schedule.continuous() {
        orchestrator.run_forever().await?;
    }
    Ok(())
}
