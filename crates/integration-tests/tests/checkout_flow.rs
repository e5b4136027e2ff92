//! Full checkout: orchestrator → storefront → mocked Pi.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use titi_checkout::{CartLine, CheckoutFailure, CheckoutState};
use titi_core::{OrderStatus, PaymentId, PaymentState, PiUid, ProductId, UnitPricing};
use titi_integration_tests::{BUYER_TOKEN, SELLER_TOKEN, TestContext};
use titi_storefront::db::Stores;

fn tea(quantity: u32) -> CartLine {
    let mut line = CartLine::new(
        ProductId::new("p1"),
        PiUid::new("s1"),
        "Pi Tea",
        UnitPricing {
            sale_price: Some(Decimal::new(8, 0)),
            ..UnitPricing::list(Decimal::new(10, 0))
        },
    );
    line.quantity = quantity;
    line
}

#[tokio::test]
async fn test_checkout_settles_at_sale_price() {
    let ctx = TestContext::start().await;
    ctx.accept_all_payments().await;
    let (cart, journal, checkout) = ctx.checkout(BUYER_TOKEN).await;
    cart.add(tea(2)).await.unwrap();

    let request = checkout.begin("TiTi Mall order").await.unwrap();
    assert_eq!(request.amount, Decimal::new(16, 0));

    checkout
        .on_ready_for_server_approval(PaymentId::new("pay-1"))
        .await
        .unwrap();
    let state = checkout
        .on_ready_for_server_completion(PaymentId::new("pay-1"), "tx-1".to_string())
        .await
        .unwrap();

    let CheckoutState::Settled { order_id } = state else {
        panic!("expected settled, got {state:?}");
    };
    assert!(cart.lines().await.is_empty());
    assert!(journal.load().await.unwrap().is_none());

    let stores = Stores::from_backend(ctx.store.clone());
    let order = stores.orders.order_by_id(order_id).await.unwrap().unwrap();
    assert_eq!(order.total, Decimal::new(16, 0));
    assert_eq!(order.buyer_uid, PiUid::new("u1"));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items[0].seller_uid, PiUid::new("s1"));

    let payment = stores
        .payments
        .payment(&PaymentId::new("pay-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.state, PaymentState::Completed);
    assert_eq!(payment.txid.as_deref(), Some("tx-1"));
    assert_eq!(payment.order_id, Some(order_id));
}

#[tokio::test]
async fn test_seller_sees_order_and_buyer_cannot_patch() {
    let ctx = TestContext::start().await;
    ctx.accept_all_payments().await;
    let (cart, _, checkout) = ctx.checkout(BUYER_TOKEN).await;
    cart.add(tea(1)).await.unwrap();
    checkout.begin("order").await.unwrap();
    checkout
        .on_ready_for_server_approval(PaymentId::new("pay-2"))
        .await
        .unwrap();
    let CheckoutState::Settled { order_id } = checkout
        .on_ready_for_server_completion(PaymentId::new("pay-2"), "tx-2".to_string())
        .await
        .unwrap()
    else {
        panic!("checkout did not settle");
    };

    let http = ctx.http();
    let seller_orders: Value = http
        .get(ctx.url("/seller/orders"))
        .bearer_auth(SELLER_TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(seller_orders.as_array().unwrap().len(), 1);

    let response = http
        .patch(ctx.url(&format!("/orders/{order_id}")))
        .bearer_auth(BUYER_TOKEN)
        .json(&json!({"status": "shipping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = http
        .patch(ctx.url(&format!("/orders/{order_id}")))
        .bearer_auth(SELLER_TOKEN)
        .json(&json!({"status": "shipping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cancelled_checkout_records_nothing() {
    let ctx = TestContext::start().await;
    ctx.accept_all_payments().await;
    let (cart, _, checkout) = ctx.checkout(BUYER_TOKEN).await;
    cart.add(tea(1)).await.unwrap();

    checkout.begin("order").await.unwrap();
    checkout
        .on_ready_for_server_approval(PaymentId::new("pay-3"))
        .await
        .unwrap();
    let state = checkout
        .on_cancel(Some(PaymentId::new("pay-3")))
        .await
        .unwrap();

    assert_eq!(state, CheckoutState::Cancelled);
    assert_eq!(ctx.store.order_count().await, 0);
    assert_eq!(cart.lines().await.len(), 1);
}

#[tokio::test]
async fn test_rejected_order_keeps_payment_journalled() {
    let ctx = TestContext::start().await;
    ctx.accept_all_payments().await;
    let (cart, journal, checkout) = ctx.checkout(BUYER_TOKEN).await;
    cart.add(tea(1)).await.unwrap();
    // A stale cart line for a product the catalog no longer has.
    cart.add(CartLine::new(
        ProductId::new("gone"),
        PiUid::new("s1"),
        "Gone",
        UnitPricing::list(Decimal::ONE),
    ))
    .await
    .unwrap();

    checkout.begin("order").await.unwrap();
    checkout
        .on_ready_for_server_approval(PaymentId::new("pay-4"))
        .await
        .unwrap();
    let state = checkout
        .on_ready_for_server_completion(PaymentId::new("pay-4"), "tx-4".to_string())
        .await
        .unwrap();
    assert_eq!(state, CheckoutState::Failed(CheckoutFailure::OrderNotRecorded));
    assert_eq!(ctx.store.order_count().await, 0);
    assert_eq!(cart.lines().await.len(), 2);

    // The journalled snapshot still names the unknown product, so a retry
    // is refused the same way and the payment stays for the operator.
    assert!(checkout.resume().await.is_err());
    assert!(journal.load().await.unwrap().unwrap().needs_order());
}

#[tokio::test]
async fn test_order_retry_with_same_payment_is_idempotent() {
    let ctx = TestContext::start().await;
    let http = ctx.http();
    let body = json!({
        "items": [{"productId": "p2", "quantity": 2}],
        "paymentId": "pay-5"
    });

    let first = http
        .post(ctx.url("/orders"))
        .bearer_auth(BUYER_TOKEN)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.unwrap();

    let second = http
        .post(ctx.url("/orders"))
        .bearer_auth(BUYER_TOKEN)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second: Value = second.json().await.unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(ctx.store.order_count().await, 1);
}

#[tokio::test]
async fn test_payment_relays_are_rate_limited() {
    let ctx = TestContext::start().await;
    let http = ctx.http();

    let mut statuses = Vec::new();
    for _ in 0..15 {
        let response = http
            .post(ctx.url("/pi/approve"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses[0], StatusCode::BAD_REQUEST);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_requests_need_a_verified_token() {
    let ctx = TestContext::start().await;
    let http = ctx.http();

    let response = http.get(ctx.url("/me")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = http
        .get(ctx.url("/me"))
        .bearer_auth("stolen")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "UNAUTHENTICATED"}));

}
