//! Store connection settings.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL`: base URL of the PostgREST store (required)
//! - `SUPABASE_SERVICE_KEY`: service key (required)

use crate::StoreError;
use std::env;
use std::fmt;

/// Credentials for [`PostgrestStore`](crate::PostgrestStore).
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base URL, e.g. `https://project.supabase.co`.
    pub url: String,

    /// Service key sent as `apikey` and as the bearer token.
    pub service_key: String,
}

impl StoreConfig {
    /// Create a config from explicit values.
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
        }
    }

    /// Load both credentials from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] naming every missing variable. The
    /// job treats this as fatal and exits before running any task.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load both credentials through `lookup`, which maps a variable name
    /// to its value. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let url = non_empty("SUPABASE_URL");
        let service_key = non_empty("SUPABASE_SERVICE_KEY");

        match (url, service_key) {
            (Some(url), Some(service_key)) => Ok(Self { url, service_key }),
            (url, key) => {
                let missing: Vec<&str> = [
                    url.is_none().then_some("SUPABASE_URL"),
                    key.is_none().then_some("SUPABASE_SERVICE_KEY"),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(StoreError::Config(format!(
                    "missing required environment variable(s): {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

// The key never appears in logs.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("service_key", &"***")
            .finish()
    }
}
