//! Session lifecycle and authentication for the LMS API

mod refresh;
mod session;
mod types;

use reqwest::{Client, StatusCode};
use std::sync::Arc;

use crate::error::Error;
use crate::gateway::Gateway;
use crate::store::{TokenKind, TokenStore};

pub use session::{Session, SessionStatus};
pub use types::{ProfileUpdate, Registration, Role, User};

pub(crate) use refresh::RefreshCoordinator;

use types::TokenPair;

const PROFILE_PATH: &str = "/users/profile";

/// Owns the authenticated-identity lifecycle: login, registration,
/// restore-on-start, logout, and the cached user record.
///
/// The manager is the only component that installs or rolls back the
/// persisted token pair; the refresh coordinator only ever rotates the
/// access token within an installed pair.
pub struct SessionManager {
    http: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    session: Session,
    gateway: Arc<Gateway>,
}

impl SessionManager {
    pub(crate) fn new(
        http: Client,
        base_url: &str,
        store: Arc<dyn TokenStore>,
        session: Session,
        gateway: Arc<Gateway>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            store,
            session,
            gateway,
        }
    }

    /// The current lifecycle status
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// The cached identity, or `None` when not authenticated.
    ///
    /// Pure read; never touches the network.
    pub fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    /// Re-establish a persisted session at startup.
    ///
    /// Looks for a persisted token pair and validates it by fetching the
    /// profile; the fetch goes through the gateway, so a stale access
    /// token is refreshed transparently. Any failure clears the persisted
    /// tokens and lands on `Anonymous` — a half-valid session is worse
    /// than none.
    ///
    /// Only the first call in an anonymous window does work; callers that
    /// arrive while a restore is already running (or after it succeeded)
    /// get the current status back unchanged.
    pub async fn restore(&self) -> Result<SessionStatus, Error> {
        if !self
            .session
            .transition(SessionStatus::Anonymous, SessionStatus::Restoring)
        {
            return Ok(self.session.status());
        }

        if !self.has_persisted_tokens() {
            self.session.set_status(SessionStatus::Anonymous);
            return Ok(SessionStatus::Anonymous);
        }

        tracing::debug!("restoring persisted session");
        match self.fetch_profile().await {
            Ok(user) => {
                tracing::info!(username = %user.username, "session restored");
                self.session.install_identity(user);
                Ok(SessionStatus::Authenticated)
            }
            Err(err) => {
                tracing::debug!(%err, "restore failed, clearing persisted tokens");
                self.teardown();
                Ok(SessionStatus::Anonymous)
            }
        }
    }

    /// Exchange credentials for a token pair and establish the session.
    ///
    /// The token-pair write and the identity fetch are one logical unit:
    /// if the profile fetch fails after a successful exchange, the freshly
    /// stored pair is rolled back and the session stays anonymous. A
    /// failed exchange leaves the session exactly as it was.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, Error> {
        let pair = self.exchange_credentials(username, password).await?;
        self.install_pair(&pair)?;

        match self.fetch_profile().await {
            Ok(user) => {
                tracing::info!(username = %user.username, role = user.role.as_str(), "logged in");
                self.session.install_identity(user.clone());
                Ok(user)
            }
            Err(err) => {
                self.teardown();
                Err(err)
            }
        }
    }

    /// Create an account, then log in with the same credentials
    pub async fn register(&self, registration: &Registration) -> Result<User, Error> {
        let url = format!("{}/users/register", self.base_url);
        let response = self.http.post(&url).json(registration).send().await?;
        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::invalid_credentials(detail));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), message));
        }

        self.login(&registration.username, &registration.password)
            .await
    }

    /// Clear both tokens and return to `Anonymous`. Never fails.
    pub fn logout(&self) {
        if let Err(err) = self.store.clear_all() {
            tracing::warn!(%err, "failed to clear stored tokens on logout");
        }
        self.session.bump_epoch();
        self.session.reset_anonymous();
        tracing::debug!("logged out");
    }

    /// Update the profile and replace the cached identity wholesale
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, Error> {
        let user = self
            .gateway
            .patch(PROFILE_PATH)
            .json(update)?
            .execute::<User>()
            .await?;
        self.session.replace_identity(user.clone());
        Ok(user)
    }

    async fn exchange_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, Error> {
        let url = format!("{}/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let status = response.status();
        // The token endpoint answers 401 for bad credentials; that is not
        // an expiry and must never reach the refresh machinery.
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::invalid_credentials(detail));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), message));
        }

        Ok(response.json::<TokenPair>().await?)
    }

    fn install_pair(&self, pair: &TokenPair) -> Result<(), Error> {
        let written = self
            .store
            .set(TokenKind::Access, &pair.access)
            .and_then(|()| self.store.set(TokenKind::Refresh, &pair.refresh));
        if let Err(err) = written {
            // Never leave half a pair behind
            if let Err(err) = self.store.clear_all() {
                tracing::warn!(%err, "failed to roll back partial token write");
            }
            return Err(err);
        }
        // Invalidate any refresh still in flight for the previous identity
        self.session.bump_epoch();
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<User, Error> {
        self.gateway.get(PROFILE_PATH).execute::<User>().await
    }

    fn has_persisted_tokens(&self) -> bool {
        for kind in [TokenKind::Refresh, TokenKind::Access] {
            match self.store.get(kind) {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%err, "failed to read persisted tokens");
                }
            }
        }
        false
    }

    fn teardown(&self) {
        if let Err(err) = self.store.clear_all() {
            tracing::warn!(%err, "failed to clear stored tokens");
        }
        self.session.reset_anonymous();
    }
}
