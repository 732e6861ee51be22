//! Tenant (profile) identity and lifecycle status.

use serde::{Deserialize, Serialize};

/// An independently configured monitoring and publishing identity.
///
/// Loaded wholesale from the profiles file and never mutated while a unit is
/// running for it; a running unit holds its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Profile identifier, also used to look up the remote session.
    pub id: String,
    /// API credential for the source query API.
    #[serde(skip_serializing)]
    pub credential: String,
    /// Source (channel) ids in configuration order.
    pub sources: Vec<String>,
}

impl Tenant {
    pub fn new(
        id: impl Into<String>,
        credential: impl Into<String>,
        sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            credential: credential.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// The credential with everything but a short prefix and suffix hidden.
    pub fn masked_credential(&self) -> String {
        let chars: Vec<char> = self.credential.chars().collect();
        if chars.len() <= 15 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{head}...{tail}")
    }
}

/// Lifecycle status of a tenant unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Error,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Stopped => "stopped",
            TenantStatus::Starting => "starting",
            TenantStatus::Running => "running",
            TenantStatus::Error => "error",
        }
    }

    /// Whether a unit exists and owns (or is acquiring) resources.
    pub fn is_active(&self) -> bool {
        matches!(self, TenantStatus::Starting | TenantStatus::Running)
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_credential() {
        let tenant = Tenant::new("p1", "AIzaSyA1234567890abcdefXYZ", ["c1"]);
        assert_eq!(tenant.masked_credential(), "AIzaSyA123...efXYZ");

        let short = Tenant::new("p2", "short", ["c1"]);
        assert_eq!(short.masked_credential(), "*****");
    }

    #[test]
    fn test_credential_not_serialized() {
        let tenant = Tenant::new("p1", "secret-key-value-here", ["c1", "c2"]);
        let json = serde_json::to_string(&tenant).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("c2"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TenantStatus::Running).unwrap(),
            "\"running\""
        );
        assert!(TenantStatus::Starting.is_active());
        assert!(!TenantStatus::Error.is_active());
    }
}
