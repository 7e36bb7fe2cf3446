//! Configuration options for the LMS client

use std::path::PathBuf;
use std::time::Duration;

/// Configuration options for the LMS client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Where to persist the token pair between runs.
    ///
    /// When unset, tokens live in process memory only and the session does
    /// not survive a restart.
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            storage_path: None,
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the durable storage path for the token pair
    pub fn with_storage_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(value.into());
        self
    }
}
