//! Authenticated, self-healing access to the remote API.
//!
//! [`ResilientClient`] wraps a [`Transport`] with the retry policy in
//! [`retry`] and owns the [`TokenManager`]. Callers see either a payload,
//! "no data" (`Ok(None)`, server errors skipped past the ceiling) or a
//! [`SyncError`].

mod error;
pub mod retry;
mod sleep;
mod token;
mod transport;

pub use error::SyncError;
pub use retry::{ResponseClass, RetryMachine, RetryPhase, RetryPolicy, Step};
pub use sleep::{Sleeper, TokioSleeper};
pub use token::{OAuthApp, TokenManager};
pub use transport::{ApiRequest, Auth, HttpTransport, Method, RawResponse, Transport, TransportError};

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ResilientClient {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    tokens: TokenManager,
    api_base: String,
    language: String,
}

impl ResilientClient {
    /// # Arguments
    /// * `api_base` - e.g. "https://api.fitbit.com"; paths are appended verbatim
    /// * `language` - sent as `Accept-Language`
    pub fn new(
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
        tokens: TokenManager,
        api_base: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            language: language.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Runs one logical call to completion.
    ///
    /// The bearer token is re-read on every iteration, so a refresh triggered
    /// by a 401 takes effect on the next attempt.
    pub async fn execute(&mut self, request: ApiRequest) -> Result<Option<String>, SyncError> {
        let url = request.display_url();
        let mut machine = RetryMachine::new(self.policy.clone(), true);
        debug!(url = %url, "Requesting");

        loop {
            let attempt = request
                .clone()
                .with_header("Accept", "application/json")
                .with_header("Accept-Language", self.language.as_str())
                .with_auth(Auth::Bearer(self.tokens.access_token().to_string()));

            let outcome = self.transport.send(&attempt).await;
            match machine.advance(&url, ResponseClass::classify(outcome)) {
                Step::Deliver(body) => return Ok(Some(body)),
                Step::Skip => return Ok(None),
                Step::Fail(e) => return Err(e),
                Step::Retry { delay, refresh } => {
                    if refresh {
                        self.tokens
                            .refresh(self.transport.as_ref(), self.sleeper.as_ref(), &self.policy)
                            .await?;
                    }
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    /// GETs `path` (relative to the API base) and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &mut self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, SyncError> {
        let mut request = ApiRequest::get(self.url(path));
        for (key, value) in query {
            request = request.with_query(*key, value.as_str());
        }
        let url = request.display_url();

        let body = match self.execute(request).await? {
            Some(body) => body,
            None => return Ok(None),
        };
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| SyncError::InvalidPayload {
                url,
                reason: e.to_string(),
            })
    }

    /// Proactive refresh outside of a 401.
    pub async fn refresh_token(&mut self) -> Result<(), SyncError> {
        self.tokens
            .refresh(self.transport.as_ref(), self.sleeper.as_ref(), &self.policy)
            .await
            .map(|_| ())
    }

    /// Sleeps on the client's sleeper (paging delays).
    pub async fn pause(&self, duration: Duration) {
        self.sleeper.sleep(duration).await;
    }
}

#[cfg(test)]
mod tests;
