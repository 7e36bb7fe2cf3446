//! Role-based access decisions for routing.
//!
//! The guard never performs navigation itself; it returns a decision and
//! the routing layer acts on it. That keeps the core testable without a
//! UI harness.

use crate::auth::{Role, Session, SessionStatus};

/// Where unauthenticated callers should be sent
pub const LOGIN_PATH: &str = "/login";

/// Where authenticated-but-underprivileged callers should be sent
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The caller may reach the resource
    Allow,
    /// No valid session; send the caller to the login entry point
    RedirectLogin,
    /// Valid session, insufficient role; send to the access-denied view
    RedirectUnauthorized,
    /// Session still restoring; render a neutral state and re-evaluate
    Pending,
}

/// Stateless access decisions over the shared session state
pub struct AccessGuard {
    session: Session,
}

impl AccessGuard {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Decide whether the current session may reach a resource guarded by
    /// `required_roles`. An empty slice means any authenticated user.
    pub fn decide(&self, required_roles: &[Role]) -> Decision {
        match self.session.status() {
            SessionStatus::Restoring => Decision::Pending,
            SessionStatus::Anonymous | SessionStatus::Expired => Decision::RedirectLogin,
            SessionStatus::Authenticated | SessionStatus::Refreshing => {
                if required_roles.is_empty() {
                    return Decision::Allow;
                }
                match self.session.user() {
                    Some(user) if required_roles.contains(&user.role) => Decision::Allow,
                    Some(_) => Decision::RedirectUnauthorized,
                    None => Decision::RedirectLogin,
                }
            }
        }
    }

    /// Default destination for a freshly authenticated identity
    pub fn landing_path_for(&self, role: Role) -> &'static str {
        match role {
            Role::Admin => "/admin/dashboard",
            Role::Teacher => "/teacher/dashboard",
            Role::Student => "/student/dashboard",
        }
    }
}
