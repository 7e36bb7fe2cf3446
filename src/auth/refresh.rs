//! Single-flight coordination of access-token refresh.
//!
//! Several gateway calls can discover an expired access token at the same
//! moment. Most backends rotate the refresh token on first use, so letting
//! each caller race to the refresh endpoint would invalidate every attempt
//! but the first and tear down a perfectly recoverable session. The
//! coordinator funnels all of them into one network call: the first caller
//! becomes the leader, everyone else subscribes to the leader's outcome.

use std::sync::{Arc, Mutex};

use reqwest::Client;
use tokio::sync::broadcast;

use crate::auth::session::{Session, SessionStatus};
use crate::auth::types::RefreshedToken;
use crate::error::Error;
use crate::store::{TokenKind, TokenStore};

/// Shared result of one refresh attempt
#[derive(Debug, Clone)]
enum Outcome {
    Refreshed(String),
    Failed,
}

enum Entry {
    Leader,
    Follower(broadcast::Receiver<Outcome>),
}

/// Guarantees at most one refresh request is in flight at a time
pub(crate) struct RefreshCoordinator {
    http: Client,
    refresh_url: String,
    store: Arc<dyn TokenStore>,
    session: Session,
    inflight: Mutex<Option<broadcast::Sender<Outcome>>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        http: Client,
        base_url: &str,
        store: Arc<dyn TokenStore>,
        session: Session,
    ) -> Self {
        Self {
            http,
            refresh_url: format!("{}/token/refresh", base_url),
            store,
            session,
            inflight: Mutex::new(None),
        }
    }

    /// Obtain a usable access token after `stale` was rejected.
    ///
    /// `stale` is the token the caller attached to the rejected request
    /// (`None` if it sent no credentials). If the stored token already
    /// differs, a sibling call refreshed while this one was on the wire
    /// and the stored token is returned without touching the network.
    ///
    /// Failure never mutates stored tokens; session teardown is the
    /// gateway's responsibility.
    pub(crate) async fn refresh(&self, stale: Option<&str>) -> Result<String, Error> {
        let entry = {
            let mut inflight = self.inflight.lock().unwrap();
            match &*inflight {
                Some(tx) => Entry::Follower(tx.subscribe()),
                None => {
                    if let Some(current) = self.store.get(TokenKind::Access)? {
                        if stale != Some(current.as_str()) {
                            tracing::debug!("access token already rotated, skipping refresh");
                            return Ok(current);
                        }
                    }
                    let (tx, _) = broadcast::channel(1);
                    *inflight = Some(tx);
                    Entry::Leader
                }
            }
        };

        match entry {
            Entry::Follower(mut rx) => {
                tracing::debug!("joining in-flight token refresh");
                match rx.recv().await {
                    Ok(Outcome::Refreshed(token)) => Ok(token),
                    Ok(Outcome::Failed) | Err(_) => Err(Error::SessionExpired),
                }
            }
            Entry::Leader => self.lead().await,
        }
    }

    async fn lead(&self) -> Result<String, Error> {
        // If this future is dropped mid-attempt, the guard removes the
        // in-flight marker and wakes followers with a closed channel.
        let _guard = InflightGuard { coordinator: self };

        let epoch = self.session.epoch();
        self.session
            .transition(SessionStatus::Authenticated, SessionStatus::Refreshing);

        let mut outcome = self.attempt().await;

        if let Outcome::Refreshed(token) = &outcome {
            if self.session.epoch() != epoch {
                // An explicit logout or login happened while the request
                // was in flight; its state wins over ours.
                tracing::debug!("discarding refresh result: session replaced mid-flight");
                outcome = Outcome::Failed;
            } else if let Err(err) = self.store.set(TokenKind::Access, token) {
                tracing::warn!(%err, "failed to persist refreshed access token");
                outcome = Outcome::Failed;
            } else {
                self.session
                    .transition(SessionStatus::Refreshing, SessionStatus::Authenticated);
            }
        }

        // Take the sender out before sending so a caller arriving after
        // the broadcast starts a fresh attempt instead of waiting on a
        // spent channel.
        let tx = self.inflight.lock().unwrap().take();
        if let Some(tx) = tx {
            let _ = tx.send(outcome.clone());
        }

        match outcome {
            Outcome::Refreshed(token) => Ok(token),
            Outcome::Failed => Err(Error::SessionExpired),
        }
    }

    async fn attempt(&self) -> Outcome {
        let refresh_token = match self.store.get(TokenKind::Refresh) {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("no refresh token stored, cannot refresh");
                return Outcome::Failed;
            }
            Err(err) => {
                tracing::warn!(%err, "failed to read refresh token");
                return Outcome::Failed;
            }
        };

        tracing::debug!("refreshing access token");
        let response = match self
            .http
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%err, "refresh request failed");
                return Outcome::Failed;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "refresh rejected by server");
            return Outcome::Failed;
        }

        match response.json::<RefreshedToken>().await {
            Ok(refreshed) => Outcome::Refreshed(refreshed.access),
            Err(err) => {
                tracing::warn!(%err, "malformed refresh response");
                Outcome::Failed
            }
        }
    }
}

struct InflightGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.inflight.lock().unwrap().take();
    }
}
