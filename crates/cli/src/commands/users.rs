//! User role commands.
//!
//! Admin is never granted by the storefront itself; this is how an
//! operator provisions one.

use titi_core::{Identity, PiUid, Role};
use titi_storefront::db::RepositoryError;

use super::{CommandError, connect};

/// Store `role` for `uid`, creating a bare user row if none exists.
pub async fn set_role(uid: &str, role: &str) -> Result<(), CommandError> {
    let uid = uid.trim();
    if uid.is_empty() {
        return Err(CommandError::Invalid("uid must not be empty".to_string()));
    }
    let role = parse_role(role)?;
    let uid = PiUid::new(uid);

    let stores = connect().await?;
    match stores.users.set_role(&uid, role).await {
        Ok(_) => {}
        Err(RepositoryError::NotFound) => {
            let identity = Identity {
                uid: uid.clone(),
                username: String::new(),
                wallet_address: None,
            };
            stores.users.upsert_user(&identity, role).await?;
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(uid = %uid, role = %role, "Role stored");
    Ok(())
}

fn parse_role(raw: &str) -> Result<Role, CommandError> {
    Role::from_stored(raw.trim()).ok_or_else(|| {
        CommandError::Invalid(format!(
            "invalid role: {raw}. Valid roles: customer, seller, admin"
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_accepts_persistable_roles() {
        assert_eq!(parse_role("admin").unwrap(), Role::Admin);
        assert_eq!(parse_role(" seller ").unwrap(), Role::Seller);
        assert_eq!(parse_role("customer").unwrap(), Role::Customer);
    }

    #[test]
    fn test_parse_role_rejects_guest_and_unknown() {
        assert!(parse_role("guest").is_err());
        assert!(parse_role("root").is_err());
    }
}
