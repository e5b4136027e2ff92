//! Authorization policy.
//!
//! Every protected handler asks one of these capability checks instead of
//! comparing roles inline.
//!
//! | Capability | Guest | Customer | Seller | Admin |
//! |---|---|---|---|---|
//! | place an order | no | yes | yes | yes |
//! | view an order | no | own | own, or holds an item | any |
//! | change order status | no | no | holds an item | any |
//! | seller endpoints | no | no | yes | yes |
//! | review or return an order | no | own | own | own |

use titi_core::{Order, Role};

use crate::middleware::AuthUser;

#[must_use]
pub fn can_place_order(user: &AuthUser) -> bool {
    user.role != Role::Guest
}

#[must_use]
pub fn can_view_order(user: &AuthUser, order: &Order) -> bool {
    match user.role {
        Role::Guest => false,
        Role::Admin => true,
        Role::Seller => is_buyer(user, order) || order.has_item_from(user.uid()),
        Role::Customer => is_buyer(user, order),
    }
}

#[must_use]
pub fn can_mutate_order(user: &AuthUser, order: &Order) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Seller => order.has_item_from(user.uid()),
        Role::Guest | Role::Customer => false,
    }
}

#[must_use]
pub fn can_act_as_seller(user: &AuthUser) -> bool {
    matches!(user.role, Role::Seller | Role::Admin)
}

/// Only the buyer reviews an order.
#[must_use]
pub fn can_review_order(user: &AuthUser, order: &Order) -> bool {
    user.role != Role::Guest && is_buyer(user, order)
}

/// Only the buyer asks for a return.
#[must_use]
pub fn can_return_order(user: &AuthUser, order: &Order) -> bool {
    can_review_order(user, order)
}

fn is_buyer(user: &AuthUser, order: &Order) -> bool {
    &order.buyer_uid == user.uid()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use titi_core::{Identity, OrderId, OrderItem, OrderStatus, PiUid, ProductId};

    use super::*;

    fn user(uid: &str, role: Role) -> AuthUser {
        AuthUser {
            identity: Identity {
                uid: PiUid::new(uid),
                username: uid.to_string(),
                wallet_address: None,
            },
            role,
        }
    }

    /// Order `o1` bought by `u1`, containing only `p1` sold by `s1`.
    fn order() -> Order {
        Order {
            id: OrderId::generate(),
            buyer_uid: PiUid::new("u1"),
            status: OrderStatus::Pending,
            total: Decimal::from(16),
            note: None,
            payment_id: None,
            created_at: Utc::now(),
            items: vec![OrderItem {
                product_id: ProductId::new("p1"),
                seller_uid: PiUid::new("s1"),
                name: "Mango".to_string(),
                quantity: 2,
                price: Decimal::from(8),
            }],
        }
    }

    #[test]
    fn test_buyer_views_but_cannot_mutate() {
        let buyer = user("u1", Role::Customer);
        assert!(can_view_order(&buyer, &order()));
        assert!(!can_mutate_order(&buyer, &order()));
        assert!(can_review_order(&buyer, &order()));
    }

    #[test]
    fn test_other_customer_sees_nothing() {
        let other = user("u2", Role::Customer);
        assert!(!can_view_order(&other, &order()));
        assert!(!can_review_order(&other, &order()));
        assert!(!can_return_order(&other, &order()));
    }

    #[test]
    fn test_only_owning_seller_mutates() {
        assert!(can_mutate_order(&user("s1", Role::Seller), &order()));
        assert!(can_view_order(&user("s1", Role::Seller), &order()));
        assert!(!can_mutate_order(&user("s2", Role::Seller), &order()));
        assert!(!can_view_order(&user("s2", Role::Seller), &order()));
    }

    #[test]
    fn test_seller_item_owner_is_not_the_reviewer() {
        assert!(!can_review_order(&user("s1", Role::Seller), &order()));
    }

    #[test]
    fn test_admin_can_do_anything_with_orders() {
        let admin = user("a1", Role::Admin);
        assert!(can_view_order(&admin, &order()));
        assert!(can_mutate_order(&admin, &order()));
        assert!(can_act_as_seller(&admin));
    }

    #[test]
    fn test_guest_is_refused_everything() {
        let guest = user("u1", Role::Guest);
        assert!(!can_place_order(&guest));
        assert!(!can_view_order(&guest, &order()));
        assert!(!can_review_order(&guest, &order()));
        assert!(!can_act_as_seller(&guest));
    }

    #[test]
    fn test_customers_are_not_sellers() {
        assert!(!can_act_as_seller(&user("u1", Role::Customer)));
        assert!(can_act_as_seller(&user("s1", Role::Seller)));
    }
}
