//! Return requests and reviews left by buyers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use titi_core::{OrderId, PiUid, ReturnId, ReviewId};

/// A return request to persist.
#[derive(Debug, Clone)]
pub struct NewReturn {
    pub order_id: OrderId,
    pub buyer_uid: PiUid,
    pub reason: String,
    pub images: Vec<String>,
}

/// A stored return request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub buyer_uid: PiUid,
    pub reason: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A review to persist.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub order_id: OrderId,
    pub buyer_uid: PiUid,
    pub rating: u8,
    pub comment: String,
}

/// A stored review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub order_id: OrderId,
    pub buyer_uid: PiUid,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}
