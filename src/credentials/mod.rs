//! OAuth credential persistence.
//!
//! The remote API issues a short-lived access token and a single-use refresh
//! token. Both are rotated on every refresh and must be written together:
//! losing the new refresh token means the user has to re-authorize.
//!
//! # Usage
//!
//! ```no_run
//! use vitalsync::credentials::{CredentialPair, CredentialStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = CredentialStore::new("tokens/tokens.json");
//!
//! store.save(&CredentialPair::new("access", "refresh"))?;
//!
//! if let Some(pair) = store.load()? {
//!     println!("refresh token: {}", pair.refresh_token);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

mod storage;

pub use storage::CredentialStore;

/// Access/refresh token pair, always read and written as a unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Bearer token for API requests
    #[serde(default)]
    pub access_token: String,

    /// Token exchanged for the next pair
    #[serde(default)]
    pub refresh_token: String,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// A pair seeded from a refresh token only (first run, typed in by the user).
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self::new(String::new(), refresh_token)
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}
