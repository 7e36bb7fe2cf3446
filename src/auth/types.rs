//! Types for authentication and user management

use serde::{Deserialize, Serialize};

/// Coarse-grained permission class attached to an authenticated identity.
///
/// The role is never mutated locally; it is only ever replaced wholesale
/// by a fresh profile fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

/// Profile of the authenticated principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: i64,

    /// Login username
    pub username: String,

    /// Email address
    #[serde(default)]
    pub email: String,

    /// The user's role
    pub role: Role,

    /// First name
    #[serde(default)]
    pub first_name: String,

    /// Last name
    #[serde(default)]
    pub last_name: String,
}

/// Token pair returned by the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response from the refresh endpoint; only the access token is rotated
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshedToken {
    pub access: String,
}

/// Fields for creating a new account
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    /// Login username
    pub username: String,

    /// Email address
    pub email: String,

    /// Plaintext password, sent once over TLS and never stored
    pub password: String,

    /// Requested role; the server defaults to `student` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// First name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Last name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Profile fields that can be updated
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    /// Email address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// First name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Last name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}
