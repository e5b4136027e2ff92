//! Role resolution for verified identities.

use std::sync::Arc;

use titi_core::{Identity, Role};

use crate::config::SellerAllowList;
use crate::db::UserStore;

/// Maps a verified identity to its role.
///
/// A stored user row wins. Without one, the seller allow-lists decide
/// between `seller` and `customer`. Admin is only ever read from a stored
/// row.
#[derive(Clone)]
pub struct RoleResolver {
    users: Arc<dyn UserStore>,
    sellers: SellerAllowList,
}

impl RoleResolver {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, sellers: SellerAllowList) -> Self {
        Self { users, sellers }
    }

    /// Resolve the role of `identity`.
    ///
    /// Lookup errors are logged and treated as "no stored row", so a store
    /// outage degrades to the allow-lists instead of locking everyone out.
    pub async fn resolve(&self, identity: &Identity) -> Role {
        match self.users.find_user(&identity.uid).await {
            Ok(Some(user)) => user.stored_role().unwrap_or(Role::Customer),
            Ok(None) => self.fallback(identity),
            Err(e) => {
                tracing::warn!(uid = %identity.uid, error = %e, "user lookup failed, using allow-lists");
                self.fallback(identity)
            }
        }
    }

    fn fallback(&self, identity: &Identity) -> Role {
        let by_username = self
            .sellers
            .contains_username(&identity.normalized_username());
        let by_wallet = identity
            .normalized_wallet()
            .is_some_and(|wallet| self.sellers.contains_wallet(&wallet));

        if by_username || by_wallet {
            Role::Seller
        } else {
            Role::Customer
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use titi_core::PiUid;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::UserRecord;

    fn identity(uid: &str, username: &str, wallet: Option<&str>) -> Identity {
        Identity {
            uid: PiUid::new(uid),
            username: username.to_string(),
            wallet_address: wallet.map(str::to_string),
        }
    }

    fn resolver(store: Arc<MemoryStore>) -> RoleResolver {
        RoleResolver::new(
            store,
            SellerAllowList::new(["Alice"], ["gseller"]),
        )
    }

    async fn stored(store: &MemoryStore, uid: &str, role: Option<&str>) {
        let now = Utc::now();
        store
            .insert_user(UserRecord {
                uid: PiUid::new(uid),
                username: String::new(),
                wallet_address: None,
                role: role.map(str::to_string),
                created_at: now,
                updated_at: now,
            })
            .await;
    }

    #[tokio::test]
    async fn test_stored_role_wins() {
        let store = Arc::new(MemoryStore::new());
        stored(&store, "admin", Some("admin")).await;
        stored(&store, "alice", Some("customer")).await;

        let roles = resolver(store);
        assert_eq!(roles.resolve(&identity("admin", "x", None)).await, Role::Admin);
        // On the allow-list, but the stored row says customer.
        assert_eq!(
            roles.resolve(&identity("alice", "alice", None)).await,
            Role::Customer
        );
    }

    #[tokio::test]
    async fn test_unknown_stored_role_defaults_to_customer() {
        let store = Arc::new(MemoryStore::new());
        stored(&store, "u1", Some("superuser")).await;
        stored(&store, "u2", None).await;

        let roles = resolver(store);
        assert_eq!(roles.resolve(&identity("u1", "", None)).await, Role::Customer);
        assert_eq!(roles.resolve(&identity("u2", "", None)).await, Role::Customer);
    }

    #[tokio::test]
    async fn test_allow_lists_are_case_normalized() {
        let roles = resolver(Arc::new(MemoryStore::new()));
        assert_eq!(
            roles.resolve(&identity("u1", " ALICE ", None)).await,
            Role::Seller
        );
        assert_eq!(
            roles.resolve(&identity("u2", "bob", Some("GSeller"))).await,
            Role::Seller
        );
        assert_eq!(roles.resolve(&identity("u3", "bob", None)).await, Role::Customer);
    }

    #[tokio::test]
    async fn test_lookup_errors_fall_back_to_allow_lists() {
        let store = Arc::new(MemoryStore::new());
        stored(&store, "admin", Some("admin")).await;
        store.fail_user_lookups(true);

        let roles = resolver(store);
        assert_eq!(
            roles.resolve(&identity("u1", "alice", None)).await,
            Role::Seller
        );
        // Never admin without a readable row.
        assert_eq!(
            roles.resolve(&identity("admin", "x", None)).await,
            Role::Customer
        );
    }
}
