use std::fmt;

/// Errors surfaced by the resilient client and token manager.
///
/// Rate limits and network failures never appear here: they are retried
/// until they clear.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No refresh token, or the token endpoint refused the exchange
    AuthFailure(String),
    /// 401 kept coming back after the refresh ceiling
    AuthExhausted { url: String, attempts: u32 },
    /// 5xx beyond the ceiling with skipping disabled
    ServerErrorExhausted { url: String, status: u16, attempts: u32 },
    /// Status outside the retry policy (4xx other than 401/429, 2xx other than 200)
    UnexpectedStatus { url: String, status: u16, body: String },
    /// 200 with a body that does not match the expected shape
    InvalidPayload { url: String, reason: String },
    /// Credential file could not be written
    Credentials(String),
}

impl SyncError {
    /// Auth-class failures stop the process; everything else is contained
    /// at the collector boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::AuthFailure(_) | SyncError::AuthExhausted { .. } | SyncError::Credentials(_)
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::AuthFailure(reason) => write!(f, "authorization failed: {}", reason),
            SyncError::AuthExhausted { url, attempts } => write!(
                f,
                "still unauthorized after {} attempts for {}",
                attempts, url
            ),
            SyncError::ServerErrorExhausted {
                url,
                status,
                attempts,
            } => write!(
                f,
                "server error {} persisted after {} attempts for {}",
                status, attempts, url
            ),
            SyncError::UnexpectedStatus { url, status, body } => {
                write!(f, "unexpected status {} for {}: {}", status, url, body)
            }
            SyncError::InvalidPayload { url, reason } => {
                write!(f, "invalid payload from {}: {}", url, reason)
            }
            SyncError::Credentials(reason) => {
                write!(f, "failed to persist credentials: {}", reason)
            }
        }
    }
}

impl std::error::Error for SyncError {}
