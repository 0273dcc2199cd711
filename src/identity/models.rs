//! Identity record and its public projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// The three fixed roles, ordered by privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
    Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// True if this role grants at least the privileges of `required`.
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored identity. Only the store and the password lifecycle see this
/// type; everything that leaves the process goes through [`PublicUser`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub id: Uuid,
    pub display_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// New record with the default role. `email` must already be normalized.
    pub fn new(display_name: String, username: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            username,
            email,
            password_hash,
            role: Role::User,
            created_at: Utc::now(),
        }
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser::from(self)
    }
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// User object returned by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    #[schema(example = "Alice")]
    pub name: String,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&IdentityRecord> for PublicUser {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            id: record.id,
            name: record.display_name.clone(),
            username: record.username.clone(),
            email: record.email.clone(),
            role: record.role,
            created_at: record.created_at,
        }
    }
}

/// Trim and lowercase an email so lookups and uniqueness are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
