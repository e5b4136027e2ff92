//! The payment currently in flight, persisted across restarts.
//!
//! A checkout writes an entry as soon as Pi hands over a payment id and
//! keeps it until the order is recorded or the payment is cancelled. An
//! entry found at start-up means the last flow was interrupted.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use titi_core::{OrderId, PaymentId, PaymentState, ProductId};

use crate::error::StorageError;
use crate::storage::{ClientStorage, load_json, save_json};

const JOURNAL_KEY: &str = "payment_journal";

/// One line of the order the payment is for, priced at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub payment_id: PaymentId,
    pub state: PaymentState,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub items: Vec<JournalItem>,
    pub total: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

impl JournalEntry {
    /// Completed on Pi but no order recorded yet.
    #[must_use]
    pub fn needs_order(&self) -> bool {
        self.state == PaymentState::Completed && self.order_id.is_none()
    }
}

/// Storage-backed journal holding at most one entry.
#[derive(Clone)]
pub struct PaymentJournal {
    storage: Arc<dyn ClientStorage>,
}

impl PaymentJournal {
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self { storage }
    }

    /// # Errors
    ///
    /// Returns storage errors, including an entry that no longer parses.
    pub async fn load(&self) -> Result<Option<JournalEntry>, StorageError> {
        load_json(self.storage.as_ref(), JOURNAL_KEY).await
    }

    /// # Errors
    ///
    /// Returns the storage error if the entry cannot be written.
    pub async fn save(&self, entry: &JournalEntry) -> Result<(), StorageError> {
        save_json(self.storage.as_ref(), JOURNAL_KEY, entry).await
    }

    /// # Errors
    ///
    /// Returns the storage error if the entry cannot be removed.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(JOURNAL_KEY).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn entry(state: PaymentState) -> JournalEntry {
        JournalEntry {
            payment_id: PaymentId::new("pay-1"),
            state,
            txid: None,
            order_id: None,
            items: vec![JournalItem {
                product_id: ProductId::new("p1"),
                quantity: 2,
                price: Decimal::new(8, 0),
            }],
            total: Decimal::new(16, 0),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_entry_survives_new_journal_instance() {
        let storage: Arc<dyn ClientStorage> = Arc::new(MemoryStorage::new());
        PaymentJournal::new(storage.clone())
            .save(&entry(PaymentState::Approved))
            .await
            .unwrap();

        let loaded = PaymentJournal::new(storage).load().await.unwrap().unwrap();

        assert_eq!(loaded, entry(PaymentState::Approved));
    }

    #[tokio::test]
    async fn test_clear_removes_entry() {
        let journal = PaymentJournal::new(Arc::new(MemoryStorage::new()));
        journal.save(&entry(PaymentState::Created)).await.unwrap();

        journal.clear().await.unwrap();

        assert!(journal.load().await.unwrap().is_none());
    }

    #[test]
    fn test_needs_order_only_when_completed_without_order() {
        assert!(entry(PaymentState::Completed).needs_order());
        assert!(!entry(PaymentState::Approved).needs_order());

        let mut recorded = entry(PaymentState::Completed);
        recorded.order_id = Some(OrderId::generate());
        assert!(!recorded.needs_order());
    }
}
