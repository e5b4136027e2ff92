//! The checkout state machine.
//!
//! ```text
//! Idle ──begin──▶ AwaitingApproval ──approval──▶ AwaitingCompletion ──completion──▶ Settled
//!                        │                              │                  │
//!                        └──────── cancel / error ──────┴──▶ Cancelled     └──▶ Failed
//! ```
//!
//! The Pi SDK owns the payment dialog and calls back into the app at each
//! phase; the embedding app forwards those callbacks to the matching
//! `on_*` method. Only one flow runs at a time: [`CheckoutOrchestrator::begin`]
//! refuses while a previous flow has not reached a terminal state.
//!
//! An order is only ever created after the server completion call succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use titi_core::{Order, OrderId, PaymentId, PaymentState, PricedLine, compute_total};

use crate::api::{CreateOrder, StorefrontClient};
use crate::cart::CartStore;
use crate::error::CheckoutError;
use crate::journal::{JournalEntry, JournalItem, PaymentJournal};

/// What to hand the Pi SDK's `createPayment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub memo: String,
    pub metadata: Value,
}

/// Why a flow ended in [`CheckoutState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutFailure {
    /// The server refused or could not relay completion. No order exists.
    CompletionRejected,
    /// Pi completed the payment but the order call failed. The journal keeps
    /// the payment so [`CheckoutOrchestrator::resume`] can retry.
    OrderNotRecorded,
    /// The payment could not be journalled, so it was never approved. Pi
    /// lets an unapproved payment expire without charging the buyer.
    NotJournalled,
    /// The Pi SDK reported an error.
    Payment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    Idle,
    AwaitingApproval,
    AwaitingCompletion { payment_id: PaymentId },
    Settled { order_id: OrderId },
    Cancelled,
    Failed(CheckoutFailure),
}

impl CheckoutState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled { .. } | Self::Cancelled | Self::Failed(_))
    }
}

/// Cart lines frozen when the payment was requested.
#[derive(Debug, Clone)]
struct Snapshot {
    items: Vec<JournalItem>,
    total: Decimal,
    note: Option<String>,
}

struct Flow {
    state: CheckoutState,
    processing: bool,
    snapshot: Option<Snapshot>,
}

impl Flow {
    fn finish(&mut self, state: CheckoutState) -> CheckoutState {
        self.state = state.clone();
        self.processing = false;
        self.snapshot = None;
        state
    }

    fn unexpected(&self, callback: &'static str) -> CheckoutError {
        CheckoutError::UnexpectedCallback {
            callback,
            state: self.state.clone(),
        }
    }
}

/// Drives one Pi payment at a time from cart to recorded order.
pub struct CheckoutOrchestrator {
    cart: Arc<CartStore>,
    journal: PaymentJournal,
    client: StorefrontClient,
    flow: Mutex<Flow>,
}

impl CheckoutOrchestrator {
    pub fn new(cart: Arc<CartStore>, journal: PaymentJournal, client: StorefrontClient) -> Self {
        Self {
            cart,
            journal,
            client,
            flow: Mutex::new(Flow {
                state: CheckoutState::Idle,
                processing: false,
                snapshot: None,
            }),
        }
    }

    pub async fn state(&self) -> CheckoutState {
        self.flow.lock().await.state.clone()
    }

    pub async fn is_processing(&self) -> bool {
        self.flow.lock().await.processing
    }

    /// Start a checkout of the selected cart lines.
    ///
    /// # Errors
    ///
    /// - `AlreadyProcessing` while a previous flow is still running
    /// - `EmptySelection` when no line is selected
    pub async fn begin(&self, memo: impl Into<String>) -> Result<PaymentRequest, CheckoutError> {
        self.begin_at(memo, None, Utc::now()).await
    }

    /// [`Self::begin`] with an order note and an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::begin`].
    pub async fn begin_at(
        &self,
        memo: impl Into<String>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, CheckoutError> {
        let mut flow = self.flow.lock().await;
        if flow.processing {
            return Err(CheckoutError::AlreadyProcessing);
        }

        let lines = self.cart.selected().await;
        if lines.is_empty() {
            return Err(CheckoutError::EmptySelection);
        }

        let total = compute_total(&lines, now);
        let items: Vec<JournalItem> = lines
            .iter()
            .map(|line| JournalItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity(),
                price: line.unit_price_at(now),
            })
            .collect();
        let metadata = json!({
            "items": items
                .iter()
                .map(|i| json!({"productId": i.product_id, "quantity": i.quantity}))
                .collect::<Vec<_>>(),
        });

        flow.state = CheckoutState::AwaitingApproval;
        flow.processing = true;
        flow.snapshot = Some(Snapshot { items, total, note });

        tracing::info!(amount = %total, lines = lines.len(), "checkout started");
        Ok(PaymentRequest {
            amount: total,
            memo: memo.into(),
            metadata,
        })
    }

    /// Pi SDK `onReadyForServerApproval`.
    ///
    /// A failed approve call is logged and the flow still advances; Pi will
    /// not call for completion of a payment the server never approved.
    /// Nothing is approved unless the payment is journalled first: when that
    /// write fails the flow ends in `Failed(NotJournalled)`.
    ///
    /// # Errors
    ///
    /// `UnexpectedCallback` outside `AwaitingApproval`.
    #[tracing::instrument(skip(self, payment_id), fields(payment_id = %payment_id))]
    pub async fn on_ready_for_server_approval(
        &self,
        payment_id: PaymentId,
    ) -> Result<CheckoutState, CheckoutError> {
        let mut flow = self.flow.lock().await;
        if flow.state != CheckoutState::AwaitingApproval {
            return Err(flow.unexpected("approval"));
        }
        let Some(snapshot) = flow.snapshot.clone() else {
            return Err(flow.unexpected("approval"));
        };

        let mut entry = JournalEntry {
            payment_id: payment_id.clone(),
            state: PaymentState::Created,
            txid: None,
            order_id: None,
            items: snapshot.items,
            total: snapshot.total,
            note: snapshot.note,
        };
        if let Err(e) = self.journal.save(&entry).await {
            tracing::error!(error = %e, "cannot journal payment, not approving it");
            return Ok(flow.finish(CheckoutState::Failed(CheckoutFailure::NotJournalled)));
        }

        match self.client.approve(&payment_id).await {
            Ok(()) => {
                entry.state = PaymentState::Approved;
                self.save_journal(&entry).await;
            }
            Err(e) => tracing::warn!(error = %e, "server approval failed, continuing"),
        }

        flow.state = CheckoutState::AwaitingCompletion { payment_id };
        Ok(flow.state.clone())
    }

    /// Pi SDK `onReadyForServerCompletion`: complete on the server, then
    /// record the order and drop the paid lines from the cart.
    ///
    /// Once the server has completed the payment the order call is always
    /// made; journal write failures past that point are only logged.
    ///
    /// # Errors
    ///
    /// `UnexpectedCallback` outside `AwaitingCompletion`, `PaymentMismatch`
    /// for a different payment id. Server failures end the flow in
    /// [`CheckoutState::Failed`] instead.
    #[tracing::instrument(skip(self, payment_id, txid), fields(payment_id = %payment_id))]
    pub async fn on_ready_for_server_completion(
        &self,
        payment_id: PaymentId,
        txid: String,
    ) -> Result<CheckoutState, CheckoutError> {
        let mut flow = self.flow.lock().await;
        let CheckoutState::AwaitingCompletion { payment_id: expected } = &flow.state else {
            return Err(flow.unexpected("completion"));
        };
        if expected != &payment_id {
            return Err(CheckoutError::PaymentMismatch {
                expected: expected.to_string(),
                received: payment_id.to_string(),
            });
        }

        let Some(snapshot) = flow.snapshot.clone() else {
            return Err(flow.unexpected("completion"));
        };

        if let Err(e) = self.client.complete(&payment_id, &txid).await {
            tracing::error!(error = %e, "server completion failed, no order recorded");
            return Ok(flow.finish(CheckoutState::Failed(CheckoutFailure::CompletionRejected)));
        }

        let mut entry = JournalEntry {
            payment_id,
            state: PaymentState::Completed,
            txid: Some(txid),
            order_id: None,
            items: snapshot.items,
            total: snapshot.total,
            note: snapshot.note,
        };
        self.save_journal(&entry).await;

        match self.record_order(&mut entry).await {
            Ok(order) => {
                if let Err(e) = self.cart.remove_paid(&entry.items).await {
                    tracing::warn!(error = %e, "failed to clear paid cart lines");
                }
                Ok(flow.finish(CheckoutState::Settled { order_id: order.id }))
            }
            Err(e) => {
                tracing::error!(error = %e, "payment completed but order not recorded");
                // Another chance for resume() to find it.
                self.save_journal(&entry).await;
                Ok(flow.finish(CheckoutState::Failed(CheckoutFailure::OrderNotRecorded)))
            }
        }
    }

    /// Pi SDK `onCancel`. No order is created.
    ///
    /// # Errors
    ///
    /// Journal errors.
    pub async fn on_cancel(&self, payment_id: Option<PaymentId>) -> Result<CheckoutState, CheckoutError> {
        let mut flow = self.flow.lock().await;
        if !flow.processing {
            return Err(flow.unexpected("cancel"));
        }

        if let Some(entry) = self.journal.load().await?
            && payment_id.as_ref().is_none_or(|id| id == &entry.payment_id)
        {
            self.journal.clear().await?;
        }

        tracing::info!(payment_id = ?payment_id, "checkout cancelled");
        Ok(flow.finish(CheckoutState::Cancelled))
    }

    /// Pi SDK `onError`. The journal keeps any payment already handed over
    /// so it can be reconciled.
    ///
    /// # Errors
    ///
    /// `UnexpectedCallback` when no flow is running.
    pub async fn on_error(
        &self,
        message: impl Into<String>,
        payment_id: Option<PaymentId>,
    ) -> Result<CheckoutState, CheckoutError> {
        let mut flow = self.flow.lock().await;
        if !flow.processing {
            return Err(flow.unexpected("error"));
        }

        let message = message.into();
        tracing::warn!(payment_id = ?payment_id, error = %message, "checkout failed");
        Ok(flow.finish(CheckoutState::Failed(CheckoutFailure::Payment(message))))
    }

    /// Finish an interrupted flow: record the order for a journalled payment
    /// that completed on Pi without one.
    ///
    /// Returns `None` when there is nothing to retry. Payments that never
    /// completed stay journalled for the operator.
    ///
    /// # Errors
    ///
    /// `AlreadyProcessing` while a flow runs; journal and storefront errors.
    pub async fn resume(&self) -> Result<Option<Order>, CheckoutError> {
        let mut flow = self.flow.lock().await;
        if flow.processing {
            return Err(CheckoutError::AlreadyProcessing);
        }

        let Some(mut entry) = self.journal.load().await? else {
            return Ok(None);
        };
        if !entry.needs_order() {
            tracing::info!(
                payment_id = %entry.payment_id,
                state = %entry.state,
                "journalled payment is not completed, leaving it for reconciliation"
            );
            return Ok(None);
        }

        let order = self.record_order(&mut entry).await?;
        tracing::info!(payment_id = %entry.payment_id, order_id = %order.id, "recovered order for completed payment");
        flow.state = CheckoutState::Settled { order_id: order.id };
        Ok(Some(order))
    }

    async fn record_order(&self, entry: &mut JournalEntry) -> Result<Order, CheckoutError> {
        let order = self
            .client
            .create_order(&CreateOrder {
                items: &entry.items,
                note: entry.note.as_deref(),
                payment_id: &entry.payment_id,
                total: entry.total,
            })
            .await?;

        entry.order_id = Some(order.id);
        if let Err(e) = self.journal.clear().await {
            tracing::warn!(error = %e, order_id = %order.id, "order recorded but journal not cleared");
        }
        Ok(order)
    }

    async fn save_journal(&self, entry: &JournalEntry) {
        if let Err(e) = self.journal.save(entry).await {
            tracing::error!(
                payment_id = %entry.payment_id,
                state = %entry.state,
                error = %e,
                "failed to journal payment"
            );
        }
    }
}
