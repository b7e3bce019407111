use super::retry::{ResponseClass, RetryMachine, RetryPolicy, Step};
use super::transport::{ApiRequest, Auth, Transport};
use super::{Sleeper, SyncError};
use serde::Deserialize;
use tracing::{error, info};
use vitalsync::credentials::{CredentialPair, CredentialStore};

/// Token response from the OAuth token endpoint.
#[derive(Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth application used for the refresh grant.
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Owns the current credential pair and rotates it through the token
/// endpoint. Every successful refresh is persisted before the new access
/// token is handed out.
pub struct TokenManager {
    store: CredentialStore,
    app: OAuthApp,
    credentials: CredentialPair,
}

impl TokenManager {
    pub fn new(store: CredentialStore, app: OAuthApp, credentials: CredentialPair) -> Self {
        Self {
            store,
            app,
            credentials,
        }
    }

    /// Current access token (may be empty before the first refresh).
    pub fn access_token(&self) -> &str {
        &self.credentials.access_token
    }

    pub fn credentials(&self) -> &CredentialPair {
        &self.credentials
    }

    /// Exchanges the refresh token for a new pair.
    ///
    /// Rate limits, network failures and 5xx on the token endpoint go through
    /// the same retry policy as data requests. A 401 or any other rejection
    /// from the token endpoint is an [`SyncError::AuthFailure`].
    pub async fn refresh(
        &mut self,
        transport: &dyn Transport,
        sleeper: &dyn Sleeper,
        policy: &RetryPolicy,
    ) -> Result<String, SyncError> {
        if !self.credentials.has_refresh_token() {
            return Err(SyncError::AuthFailure(
                "no refresh token available".to_string(),
            ));
        }

        info!("Refreshing access token");

        let request = ApiRequest::post(self.app.token_url.as_str())
            .with_header("Accept", "application/json")
            .with_form("grant_type", "refresh_token")
            .with_form("refresh_token", self.credentials.refresh_token.as_str())
            .with_auth(Auth::Basic {
                user: self.app.client_id.clone(),
                password: self.app.client_secret.clone(),
            });

        let mut machine = RetryMachine::new(policy.clone(), false);
        let body = loop {
            let outcome = transport.send(&request).await;
            match machine.advance(&self.app.token_url, ResponseClass::classify(outcome)) {
                Step::Deliver(body) => break body,
                Step::Retry { delay, .. } => sleeper.sleep(delay).await,
                Step::Skip => {
                    return Err(SyncError::AuthFailure(format!(
                        "token endpoint unavailable after {} attempts",
                        machine.attempts()
                    )))
                }
                Step::Fail(SyncError::UnexpectedStatus { status, body, .. }) => {
                    return Err(SyncError::AuthFailure(format!(
                        "token endpoint returned {}: {}",
                        status, body
                    )))
                }
                Step::Fail(SyncError::ServerErrorExhausted { status, .. }) => {
                    return Err(SyncError::AuthFailure(format!(
                        "token endpoint kept failing with {}",
                        status
                    )))
                }
                Step::Fail(e) => return Err(e),
            }
        };

        let response: TokenRefreshResponse = serde_json::from_str(&body).map_err(|e| {
            SyncError::AuthFailure(format!("failed to parse token response: {}", e))
        })?;

        // Keep the existing refresh token if the provider did not rotate it
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.credentials.refresh_token.clone());
        let pair = CredentialPair::new(response.access_token, refresh_token);

        if let Err(e) = self.store.save(&pair) {
            error!(path = %self.store.path().display(), error = %e, "Failed to persist tokens");
            return Err(SyncError::Credentials(format!("{:#}", e)));
        }
        self.credentials = pair;

        info!("Access token refreshed");
        Ok(self.credentials.access_token.clone())
    }
}
