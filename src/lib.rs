//! LMS Rust Client Library
//!
//! A Rust client for an LMS-style REST backend, centered on a single
//! owned session: bearer-token acquisition, durable persistence,
//! coordinated refresh on expiry, and role-based access decisions.
//! Resource endpoints are reached through the request gateway, which
//! attaches credentials and recovers from token expiry transparently.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod store;

use reqwest::Client;
use std::sync::Arc;
use url::Url;

use crate::auth::{RefreshCoordinator, Session, SessionManager};
use crate::config::ClientOptions;
use crate::error::Error;
use crate::gateway::Gateway;
use crate::guard::AccessGuard;
use crate::store::{FileTokenStore, MemoryTokenStore, TokenStore};

/// The main entry point for the LMS client.
///
/// Owns the process-wide session singleton and hands out the three
/// surfaces collaborators consume: the session manager for the
/// authentication lifecycle, the gateway for resource calls, and the
/// access guard for routing decisions.
pub struct LmsClient {
    /// The base URL of the LMS API
    pub base_url: String,
    /// HTTP client used for requests
    pub http_client: Client,
    auth: SessionManager,
    gateway: Arc<Gateway>,
    guard: AccessGuard,
}

impl LmsClient {
    /// Create a new client with default options.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use lms_client::LmsClient;
    ///
    /// let client = LmsClient::new("https://lms.example.com/api").unwrap();
    /// ```
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::new_with_options(base_url, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// When `storage_path` is set, the token pair persists there and a
    /// later process can pick the session back up with
    /// [`SessionManager::restore`]; otherwise tokens live in memory only.
    pub fn new_with_options(base_url: &str, options: ClientOptions) -> Result<Self, Error> {
        let store: Arc<dyn TokenStore> = match &options.storage_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Self::with_store(base_url, store, options)
    }

    /// Create a new client over a caller-provided credential store
    pub fn with_store(
        base_url: &str,
        store: Arc<dyn TokenStore>,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let parsed = Url::parse(base_url)?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();

        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let session = Session::new();
        let refresh = Arc::new(RefreshCoordinator::new(
            http_client.clone(),
            &base_url,
            store.clone(),
            session.clone(),
        ));
        let gateway = Arc::new(Gateway::new(
            http_client.clone(),
            &base_url,
            store.clone(),
            session.clone(),
            refresh,
        ));
        let auth = SessionManager::new(
            http_client.clone(),
            &base_url,
            store,
            session.clone(),
            gateway.clone(),
        );
        let guard = AccessGuard::new(session);

        Ok(Self {
            base_url,
            http_client,
            auth,
            gateway,
            guard,
        })
    }

    /// The session manager for login, registration, restore, and logout
    pub fn auth(&self) -> &SessionManager {
        &self.auth
    }

    /// The request gateway for protected resource endpoints
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// The access guard for routing decisions
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{Role, SessionStatus, User};
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::guard::Decision;
    pub use crate::LmsClient;
}
