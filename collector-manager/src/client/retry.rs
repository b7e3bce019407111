//! Retry state machine.
//!
//! One [`RetryMachine`] lives for one logical call. Each transport outcome is
//! classified into a [`ResponseClass`] and fed to [`RetryMachine::advance`],
//! which returns the next [`Step`]. The machine never sleeps or performs I/O
//! itself, so the whole policy is testable with plain values.
//!
//! | outcome          | step                                              |
//! |------------------|---------------------------------------------------|
//! | 200              | deliver body                                      |
//! | 429              | wait `reset + 300s`, unbounded                    |
//! | 401              | refresh token, wait 30s; fail past the ceiling    |
//! | 5xx              | wait 120s; skip or fail past the ceiling          |
//! | network failure  | wait 30s, unbounded                               |
//! | anything else    | fail immediately                                  |

use super::transport::{RawResponse, TransportError};
use super::SyncError;
use std::time::Duration;
use tracing::{debug, error, warn};
use vitalsync::config::RetryConfig;

/// Delays and ceilings applied by the retry machine.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Added to the provider's reset hint on 429
    pub rate_limit_padding: Duration,
    pub unauthorized_delay: Duration,
    pub server_error_delay: Duration,
    pub network_delay: Duration,
    /// Attempts after which 401 is fatal
    pub auth_ceiling: u32,
    /// Attempts after which 5xx is no longer retried
    pub server_error_ceiling: u32,
    /// Past the 5xx ceiling: `true` returns "no data", `false` fails
    pub skip_on_server_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit_padding: Duration::from_secs(300),
            unauthorized_delay: Duration::from_secs(30),
            server_error_delay: Duration::from_secs(120),
            network_delay: Duration::from_secs(30),
            auth_ceiling: 5,
            server_error_ceiling: 3,
            skip_on_server_error: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            auth_ceiling: config.expired_token_max_retry,
            server_error_ceiling: config.server_error_max_retry,
            skip_on_server_error: config.skip_request_on_server_error,
            ..Self::default()
        }
    }
}

/// Outcome of one transport exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseClass {
    Success(String),
    /// Seconds until the quota window resets
    RateLimited(u64),
    Unauthorized(String),
    ServerError { status: u16, body: String },
    ClientError { status: u16, body: String },
    NetworkFailure(String),
}

impl ResponseClass {
    /// Classifies purely from status code and headers.
    pub fn classify(outcome: Result<RawResponse, TransportError>) -> Self {
        let response = match outcome {
            Ok(r) => r,
            Err(e) => return ResponseClass::NetworkFailure(e.0),
        };
        match response.status {
            200 => ResponseClass::Success(response.body),
            429 => ResponseClass::RateLimited(rate_limit_reset(&response)),
            401 => ResponseClass::Unauthorized(response.body),
            500..=599 => ResponseClass::ServerError {
                status: response.status,
                body: response.body,
            },
            status => ResponseClass::ClientError {
                status,
                body: response.body,
            },
        }
    }
}

/// `Fitbit-Rate-Limit-Reset`, then `Retry-After`, then 0.
fn rate_limit_reset(response: &RawResponse) -> u64 {
    ["fitbit-rate-limit-reset", "retry-after"]
        .iter()
        .find_map(|name| response.header(name))
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    Unauthorized,
    ServerError,
    NetworkFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AuthFailure,
    AuthExhausted,
    ServerErrorExhausted,
    UnexpectedStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    Retrying { reason: RetryReason, attempt: u32 },
    Succeeded,
    Skipped,
    Failed(FailureKind),
}

/// What the caller must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Deliver(String),
    /// Sleep `delay`, refreshing the access token first when `refresh` is set
    Retry { delay: Duration, refresh: bool },
    /// Give up with "no data"
    Skip,
    Fail(SyncError),
}

pub struct RetryMachine {
    policy: RetryPolicy,
    /// Whether a 401 may be answered with a token refresh. The token
    /// endpoint itself runs without it.
    refresh_on_unauthorized: bool,
    attempts: u32,
    phase: RetryPhase,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy, refresh_on_unauthorized: bool) -> Self {
        Self {
            policy,
            refresh_on_unauthorized,
            attempts: 0,
            phase: RetryPhase::Idle,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    /// Iterations consumed so far, across all outcome kinds.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn advance(&mut self, url: &str, class: ResponseClass) -> Step {
        self.attempts += 1;
        let attempt = self.attempts;

        match class {
            ResponseClass::Success(body) => {
                debug!(url = %url, status = 200, attempt, "Request succeeded");
                self.phase = RetryPhase::Succeeded;
                Step::Deliver(body)
            }
            ResponseClass::RateLimited(reset) => {
                let delay = Duration::from_secs(reset) + self.policy.rate_limit_padding;
                warn!(
                    url = %url,
                    status = 429,
                    attempt,
                    retry_in_secs = delay.as_secs(),
                    "Rate limit reached, waiting for quota reset"
                );
                self.retry(RetryReason::RateLimited, delay, false)
            }
            ResponseClass::Unauthorized(body) => {
                if !self.refresh_on_unauthorized {
                    error!(url = %url, status = 401, body = %body, "Credentials rejected");
                    self.phase = RetryPhase::Failed(FailureKind::AuthFailure);
                    return Step::Fail(SyncError::AuthFailure(format!(
                        "{} rejected the client credentials: {}",
                        url, body
                    )));
                }
                if attempt > self.policy.auth_ceiling {
                    error!(
                        url = %url,
                        status = 401,
                        attempt,
                        body = %body,
                        "Unauthorized after refresh ceiling"
                    );
                    self.phase = RetryPhase::Failed(FailureKind::AuthExhausted);
                    return Step::Fail(SyncError::AuthExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                    });
                }
                warn!(
                    url = %url,
                    status = 401,
                    attempt,
                    "Access token rejected, refreshing"
                );
                self.retry(
                    RetryReason::Unauthorized,
                    self.policy.unauthorized_delay,
                    true,
                )
            }
            ResponseClass::ServerError { status, body } => {
                if attempt > self.policy.server_error_ceiling {
                    if self.policy.skip_on_server_error {
                        warn!(
                            url = %url,
                            status,
                            attempt,
                            "Server error retry limit reached, skipping request"
                        );
                        self.phase = RetryPhase::Skipped;
                        return Step::Skip;
                    }
                    error!(
                        url = %url,
                        status,
                        attempt,
                        body = %body,
                        "Server error retry limit reached"
                    );
                    self.phase = RetryPhase::Failed(FailureKind::ServerErrorExhausted);
                    return Step::Fail(SyncError::ServerErrorExhausted {
                        url: url.to_string(),
                        status,
                        attempts: attempt,
                    });
                }
                warn!(
                    url = %url,
                    status,
                    attempt,
                    retry_in_secs = self.policy.server_error_delay.as_secs(),
                    "Server error, retrying"
                );
                self.retry(
                    RetryReason::ServerError,
                    self.policy.server_error_delay,
                    false,
                )
            }
            ResponseClass::NetworkFailure(reason) => {
                warn!(
                    url = %url,
                    attempt,
                    error = %reason,
                    retry_in_secs = self.policy.network_delay.as_secs(),
                    "Network failure, retrying"
                );
                self.retry(RetryReason::NetworkFailure, self.policy.network_delay, false)
            }
            ResponseClass::ClientError { status, body } => {
                error!(url = %url, status, body = %body, "Request failed");
                self.phase = RetryPhase::Failed(FailureKind::UnexpectedStatus);
                Step::Fail(SyncError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                    body,
                })
            }
        }
    }

    fn retry(&mut self, reason: RetryReason, delay: Duration, refresh: bool) -> Step {
        self.phase = RetryPhase::Retrying {
            reason,
            attempt: self.attempts,
        };
        Step::Retry { delay, refresh }
    }
}
