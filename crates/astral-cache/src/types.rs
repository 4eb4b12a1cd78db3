//! Domain types shared by the cache, the backing stores and the HTTP layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Identifiers
// =============================================================================

/// Store-assigned user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Users and Tokens
// =============================================================================

/// A registered user.
///
/// Users are created by registration and never mutated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
}

/// An opaque bearer credential bound to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub user_id: UserId,
    pub token: String,
}

/// A user joined with one of its live tokens.
///
/// The snapshot holds one entry per token, so a user with several tokens
/// appears several times under different keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub login: String,
    pub password_hash: String,
    pub token: String,
}

impl ResolvedIdentity {
    /// Join a user with a token value.
    #[must_use]
    pub fn new(user: &User, token: impl Into<String>) -> Self {
        Self {
            user_id: user.id,
            login: user.login.clone(),
            password_hash: user.password_hash.clone(),
            token: token.into(),
        }
    }
}

// =============================================================================
// Documents
// =============================================================================

/// Document metadata as served from the snapshot.
///
/// `grant_ids` and `grant` are parallel: `grant[i]` is the login of
/// `grant_ids[i]` as resolved when the snapshot was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Globally unique; the natural external key.
    pub filename: String,
    pub public: bool,
    pub mime: String,
    pub owner: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub grant_ids: Vec<UserId>,
    pub grant: Vec<String>,
}

impl Document {
    /// Returns `true` if `user_id` is listed as a grantee.
    #[must_use]
    pub fn is_granted_to(&self, user_id: UserId) -> bool {
        self.grant_ids.contains(&user_id)
    }
}

/// Input for creating a document in the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub filename: String,
    pub public: bool,
    pub mime: String,
    pub owner: UserId,
    /// Grantee logins. Recorded only for private documents; the owner and
    /// unknown logins are skipped.
    pub grant: Vec<String>,
}

// =============================================================================
// Snapshot Maps
// =============================================================================

/// Token value to identity.
pub type IdentityMap = BTreeMap<String, ResolvedIdentity>;

/// Filename to document.
pub type DocumentMap = BTreeMap<String, Document>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_identity_joins_user_and_token() {
        let user = User {
            id: UserId(7),
            login: "alice".to_string(),
            password_hash: "hash".to_string(),
        };

        let identity = ResolvedIdentity::new(&user, "abc");
        assert_eq!(identity.user_id, UserId(7));
        assert_eq!(identity.login, "alice");
        assert_eq!(identity.password_hash, "hash");
        assert_eq!(identity.token, "abc");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(DocumentId(3).to_string(), "3");
    }
}
