//! Shared session state and its lifecycle

use std::sync::{Arc, RwLock};

use crate::auth::types::User;

/// Where the session is in its lifecycle.
///
/// `Authenticated` implies an access token is stored and an identity is
/// cached; `Anonymous` implies neither token is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No credentials; requests go out without an Authorization header
    Anonymous,
    /// Persisted tokens found at startup, identity fetch in flight
    Restoring,
    /// Access token stored and identity cached
    Authenticated,
    /// An access token refresh is in flight
    Refreshing,
    /// Credentials are known to be invalid; re-authentication required
    Expired,
}

#[derive(Debug)]
struct SessionInner {
    status: SessionStatus,
    user: Option<User>,
    epoch: u64,
}

/// Process-wide authentication state, shared by the session manager, the
/// request gateway, the refresh coordinator, and the access guard.
///
/// The session is a singleton for the lifetime of the client; cloning the
/// handle shares the same state. Critical sections are synchronous and
/// short — nothing holds the lock across an await point.
#[derive(Clone)]
pub struct Session {
    inner: Arc<RwLock<SessionInner>>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner {
                status: SessionStatus::Anonymous,
                user: None,
                epoch: 0,
            })),
        }
    }

    /// The current lifecycle status
    pub fn status(&self) -> SessionStatus {
        self.inner.read().unwrap().status
    }

    /// The cached identity of the authenticated principal, if any
    pub fn user(&self) -> Option<User> {
        self.inner.read().unwrap().user.clone()
    }

    /// Monotonic counter bumped on every explicit login/logout.
    ///
    /// A refresh that completes under a stale epoch must discard its
    /// result: the user who asked for it is gone.
    pub(crate) fn epoch(&self) -> u64 {
        self.inner.read().unwrap().epoch
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.inner.write().unwrap().status = status;
    }

    /// Move from `status` to `next` only if the session is still in
    /// `status`. Returns whether the transition happened.
    pub(crate) fn transition(&self, status: SessionStatus, next: SessionStatus) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.status == status {
            inner.status = next;
            true
        } else {
            false
        }
    }

    /// Cache the identity and mark the session authenticated
    pub(crate) fn install_identity(&self, user: User) {
        let mut inner = self.inner.write().unwrap();
        inner.user = Some(user);
        inner.status = SessionStatus::Authenticated;
    }

    /// Replace the cached identity wholesale, keeping the current status
    pub(crate) fn replace_identity(&self, user: User) {
        self.inner.write().unwrap().user = Some(user);
    }

    /// Drop the identity and return to `Anonymous`
    pub(crate) fn reset_anonymous(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.user = None;
        inner.status = SessionStatus::Anonymous;
    }

    pub(crate) fn bump_epoch(&self) {
        self.inner.write().unwrap().epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::Role;

    fn user(role: Role) -> User {
        User {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn test_new_session_is_anonymous() {
        let session = Session::new();
        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert!(session.user().is_none());
        assert_eq!(session.epoch(), 0);
    }

    #[test]
    fn test_install_and_reset() {
        let session = Session::new();
        session.install_identity(user(Role::Student));
        assert_eq!(session.status(), SessionStatus::Authenticated);
        assert_eq!(session.user().unwrap().username, "alice");

        session.reset_anonymous();
        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert!(session.user().is_none());
    }

    #[test]
    fn test_transition_only_fires_from_expected_state() {
        let session = Session::new();
        assert!(session.transition(SessionStatus::Anonymous, SessionStatus::Restoring));
        assert_eq!(session.status(), SessionStatus::Restoring);
        // Second caller sees Restoring and backs off
        assert!(!session.transition(SessionStatus::Anonymous, SessionStatus::Restoring));
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::new();
        let other = session.clone();
        session.bump_epoch();
        assert_eq!(other.epoch(), 1);
    }
}
