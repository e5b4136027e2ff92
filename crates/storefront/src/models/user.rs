//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use titi_core::{Identity, PiUid, Role};

/// A persisted Pi user and the raw role string stored for them.
///
/// The role is kept as stored text; the role resolver decides how to
/// interpret values it does not recognise.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uid: PiUid,
    pub username: String,
    pub wallet_address: Option<String>,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// A fresh record for a newly seen identity.
    #[must_use]
    pub fn from_identity(identity: &Identity, role: Role) -> Self {
        let now = Utc::now();
        Self {
            uid: identity.uid.clone(),
            username: identity.username.clone(),
            wallet_address: identity.wallet_address.clone(),
            role: Some(role.as_str().to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    /// The stored role, if it is one of the persistable roles.
    #[must_use]
    pub fn stored_role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::from_stored)
    }
}
