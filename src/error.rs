//! Error handling for the LMS client

use std::fmt;
use thiserror::Error;

/// Unified error type for the LMS client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The login or registration input was rejected by the server
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The session could not be recovered; re-authentication is required
    #[error("session expired")]
    SessionExpired,

    /// The authenticated role is not allowed to access the resource
    #[error("forbidden")]
    Forbidden,

    /// The server failed (5xx)
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other non-success response, passed through unmodified
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Credential store read/write errors
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Create a new invalid-credentials error
    pub fn invalid_credentials<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidCredentials(msg.to_string())
    }

    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Error::Storage(msg.to_string())
    }

    /// Map a non-success response status and body into the error taxonomy.
    ///
    /// 403 is a role problem, never a session problem; 5xx is opaque server
    /// failure; everything else passes through with its status.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            403 => Error::Forbidden,
            500..=599 => Error::Server { status, message },
            _ => Error::Api { status, message },
        }
    }
}
