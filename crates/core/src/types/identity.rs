//! Verified identities and authorization roles.

use serde::{Deserialize, Serialize};

use super::id::PiUid;

/// A caller identity verified by the Pi Network identity provider.
///
/// Never constructed from client-supplied fields; the storefront only builds
/// one from the identity provider's response to a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: PiUid,
    pub username: String,
    pub wallet_address: Option<String>,
}

impl Identity {
    /// Username normalised for allow-list comparison (lowercase, trimmed).
    #[must_use]
    pub fn normalized_username(&self) -> String {
        self.username.trim().to_lowercase()
    }

    /// Wallet address normalised for allow-list comparison (uppercase, trimmed).
    #[must_use]
    pub fn normalized_wallet(&self) -> Option<String> {
        self.wallet_address
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_uppercase)
    }
}

/// Authorization level of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unauthenticated visitor. Never persisted.
    Guest,
    /// Default role for any verified identity.
    #[default]
    Customer,
    /// May post products and manage orders for them.
    Seller,
    /// Pre-provisioned operator. Only ever read from a persisted record.
    Admin,
}

impl Role {
    /// Interpret a role string read from storage.
    ///
    /// Only the three persistable roles are recognised; anything else
    /// (including `guest`) yields `None` so the caller can apply its default.
    #[must_use]
    pub fn from_stored(value: &str) -> Option<Self> {
        match value.trim() {
            "customer" => Some(Self::Customer),
            "seller" => Some(Self::Seller),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// String form used in storage and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Customer => "customer",
            Self::Seller => "seller",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid role: {0}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            other => Self::from_stored(other).ok_or_else(|| ParseRoleError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_role_ignores_guest_and_unknown() {
        assert_eq!(Role::from_stored("seller"), Some(Role::Seller));
        assert_eq!(Role::from_stored("admin"), Some(Role::Admin));
        assert_eq!(Role::from_stored("guest"), None);
        assert_eq!(Role::from_stored("superuser"), None);
    }

    #[test]
    fn test_normalization() {
        let identity = Identity {
            uid: PiUid::new("u1"),
            username: " Alice ".to_string(),
            wallet_address: Some("gabc".to_string()),
        };
        assert_eq!(identity.normalized_username(), "alice");
        assert_eq!(identity.normalized_wallet().as_deref(), Some("GABC"));
    }

    #[test]
    fn test_role_round_trips_through_from_str() {
        for role in [Role::Guest, Role::Customer, Role::Seller, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
    }
}
