//! Session types and authorization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSession(format!("invalid session ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session scopes for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionScope {
    /// Read portal content and certificate listings.
    #[serde(rename = "portal:read")]
    PortalRead,
    /// Create and edit announcements, categories, links and inventory.
    #[serde(rename = "content:write")]
    ContentWrite,
    /// Trigger certificate sync and alert jobs.
    #[serde(rename = "certificates:manage")]
    CertificatesManage,
    /// Everything, including sessions and deletes.
    #[serde(rename = "portal:admin")]
    PortalAdmin,
}

impl SessionScope {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "portal:read" => Ok(Self::PortalRead),
            "content:write" => Ok(Self::ContentWrite),
            "certificates:manage" => Ok(Self::CertificatesManage),
            "portal:admin" => Ok(Self::PortalAdmin),
            _ => Err(crate::Error::InvalidSession(format!("unknown scope: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PortalRead => "portal:read",
            Self::ContentWrite => "content:write",
            Self::CertificatesManage => "certificates:manage",
            Self::PortalAdmin => "portal:admin",
        }
    }

    /// Check if this scope implies another scope.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::PortalAdmin => true,
            Self::ContentWrite => matches!(other, Self::ContentWrite | Self::PortalRead),
            Self::CertificatesManage => {
                matches!(other, Self::CertificatesManage | Self::PortalRead)
            }
            Self::PortalRead => matches!(other, Self::PortalRead),
        }
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated session with its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// User the session belongs to.
    pub username: String,
    /// Granted scopes.
    pub scopes: HashSet<SessionScope>,
    /// Token browsers must echo in the CSRF header on unsafe methods.
    pub csrf_token: String,
    /// When the session expires.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    /// When the session was revoked (if revoked).
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Session {
    /// Check if the session is valid (not expired or revoked).
    pub fn is_valid(&self) -> bool {
        let now = OffsetDateTime::now_utc();

        if self.revoked_at.is_some() {
            return false;
        }

        if let Some(expires_at) = self.expires_at
            && now > expires_at
        {
            return false;
        }

        true
    }

    /// Check if the session has a specific scope.
    pub fn has_scope(&self, scope: SessionScope) -> bool {
        self.scopes.iter().any(|s| s.implies(&scope))
    }

    /// Check if the session has admin access.
    pub fn is_admin(&self) -> bool {
        self.is_valid() && self.has_scope(SessionScope::PortalAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(scopes: &[SessionScope]) -> Session {
        Session {
            id: SessionId::new(),
            username: "ops".to_string(),
            scopes: scopes.iter().copied().collect(),
            csrf_token: "csrf".to_string(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_scope_implies() {
        assert!(SessionScope::PortalAdmin.implies(&SessionScope::PortalRead));
        assert!(SessionScope::PortalAdmin.implies(&SessionScope::CertificatesManage));
        assert!(SessionScope::ContentWrite.implies(&SessionScope::PortalRead));
        assert!(!SessionScope::ContentWrite.implies(&SessionScope::CertificatesManage));
        assert!(SessionScope::CertificatesManage.implies(&SessionScope::PortalRead));
        assert!(!SessionScope::CertificatesManage.implies(&SessionScope::ContentWrite));
        assert!(!SessionScope::PortalRead.implies(&SessionScope::ContentWrite));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(
            SessionScope::parse("portal:read").unwrap(),
            SessionScope::PortalRead
        );
        assert_eq!(
            SessionScope::parse("certificates:manage").unwrap(),
            SessionScope::CertificatesManage
        );
        assert!(SessionScope::parse("cache:read").is_err());
    }

    #[test]
    fn test_revoked_and_expired_sessions_are_invalid() {
        let mut s = session(&[SessionScope::PortalAdmin]);
        assert!(s.is_admin());

        s.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!s.is_valid());
        assert!(!s.is_admin());

        let mut s = session(&[SessionScope::PortalRead]);
        s.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        assert!(!s.is_valid());
    }
}
