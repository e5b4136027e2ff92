//! The buyer's cart.
//!
//! Lines are keyed by product id and carry the product's pricing so the
//! checkout amount can be computed without a round trip. Only selected
//! lines are paid for. Every mutation is saved to [`ClientStorage`] before
//! a [`CartEvent`] goes out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use titi_core::{PiUid, PricedLine, ProductId, UnitPricing, compute_total};

use crate::error::StorageError;
use crate::journal::JournalItem;
use crate::storage::{ClientStorage, load_json, save_json};

const CART_KEY: &str = "cart";
const EVENT_CAPACITY: usize = 16;

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub seller_uid: PiUid,
    pub name: String,
    #[serde(flatten)]
    pub pricing: UnitPricing,
    pub quantity: u32,
    #[serde(default = "selected_by_default")]
    pub selected: bool,
}

const fn selected_by_default() -> bool {
    true
}

impl CartLine {
    /// A selected line of one unit.
    #[must_use]
    pub fn new(
        product_id: ProductId,
        seller_uid: PiUid,
        name: impl Into<String>,
        pricing: UnitPricing,
    ) -> Self {
        Self {
            product_id,
            seller_uid,
            name: name.into(),
            pricing,
            quantity: 1,
            selected: true,
        }
    }
}

impl PricedLine for CartLine {
    fn unit_price_at(&self, now: DateTime<Utc>) -> Decimal {
        self.pricing.effective_at(now)
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// What happened to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartEvent {
    /// Lines were added, removed or edited.
    Changed,
    /// Paid lines were removed after a settled payment.
    Cleared,
    /// The in-memory cart was replaced from storage.
    Invalidated,
}

/// Cart lines behind a load/save boundary.
pub struct CartStore {
    storage: Arc<dyn ClientStorage>,
    lines: Mutex<Vec<CartLine>>,
    events: broadcast::Sender<CartEvent>,
}

impl CartStore {
    /// Load the cart saved in `storage`.
    ///
    /// A stored cart that no longer parses is discarded with a warning.
    ///
    /// # Errors
    ///
    /// Returns storage I/O errors.
    pub async fn load(storage: Arc<dyn ClientStorage>) -> Result<Self, StorageError> {
        let lines = read_lines(storage.as_ref()).await?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            storage,
            lines: Mutex::new(lines),
            events,
        })
    }

    /// Receive every later cart event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.events.subscribe()
    }

    /// Add `line`, or add its quantity to the line already holding the product.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the cart cannot be saved.
    pub async fn add(&self, line: CartLine) -> Result<(), StorageError> {
        if line.quantity == 0 {
            return Ok(());
        }

        let mut lines = self.lines.lock().await;
        match lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
                existing.pricing = line.pricing;
            }
            None => lines.push(line),
        }
        self.commit(&lines, CartEvent::Changed).await
    }

    /// Set a line's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the cart cannot be saved.
    pub async fn set_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<(), StorageError> {
        let mut lines = self.lines.lock().await;
        if quantity == 0 {
            lines.retain(|l| &l.product_id != product_id);
        } else if let Some(line) = lines.iter_mut().find(|l| &l.product_id == product_id) {
            line.quantity = quantity;
        }
        self.commit(&lines, CartEvent::Changed).await
    }

    /// # Errors
    ///
    /// Returns the storage error if the cart cannot be saved.
    pub async fn remove(&self, product_id: &ProductId) -> Result<(), StorageError> {
        self.set_quantity(product_id, 0).await
    }

    /// Include or exclude a line from checkout.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the cart cannot be saved.
    pub async fn set_selected(&self, product_id: &ProductId, selected: bool) -> Result<(), StorageError> {
        let mut lines = self.lines.lock().await;
        if let Some(line) = lines.iter_mut().find(|l| &l.product_id == product_id) {
            line.selected = selected;
        }
        self.commit(&lines, CartEvent::Changed).await
    }

    pub async fn lines(&self) -> Vec<CartLine> {
        self.lines.lock().await.clone()
    }

    /// The lines a checkout would pay for.
    pub async fn selected(&self) -> Vec<CartLine> {
        self.lines
            .lock()
            .await
            .iter()
            .filter(|l| l.selected)
            .cloned()
            .collect()
    }

    /// Amount due for the selected lines at `now`.
    pub async fn selected_total(&self, now: DateTime<Utc>) -> Decimal {
        let lines = self.lines.lock().await;
        compute_total(lines.iter().filter(|l| l.selected), now)
    }

    /// Take the paid quantities out of the cart once their payment settled.
    ///
    /// Only what `paid` lists is removed: lines added while the payment was
    /// open stay, and a line whose quantity grew keeps the difference.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the cart cannot be saved.
    pub async fn remove_paid(&self, paid: &[JournalItem]) -> Result<(), StorageError> {
        let mut lines = self.lines.lock().await;
        for item in paid {
            if let Some(line) = lines.iter_mut().find(|l| l.product_id == item.product_id) {
                line.quantity = line.quantity.saturating_sub(item.quantity);
            }
        }
        lines.retain(|l| l.quantity > 0);
        self.commit(&lines, CartEvent::Cleared).await
    }

    /// Replace the in-memory cart with what storage holds now.
    ///
    /// # Errors
    ///
    /// Returns storage I/O errors.
    pub async fn reload(&self) -> Result<(), StorageError> {
        let fresh = read_lines(self.storage.as_ref()).await?;
        *self.lines.lock().await = fresh;
        self.notify(CartEvent::Invalidated);
        Ok(())
    }

    async fn commit(&self, lines: &[CartLine], event: CartEvent) -> Result<(), StorageError> {
        save_json(self.storage.as_ref(), CART_KEY, &lines).await?;
        self.notify(event);
        Ok(())
    }

    fn notify(&self, event: CartEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn read_lines(storage: &dyn ClientStorage) -> Result<Vec<CartLine>, StorageError> {
    match load_json::<Vec<CartLine>>(storage, CART_KEY).await {
        Ok(lines) => Ok(lines.unwrap_or_default()),
        Err(StorageError::Json(e)) => {
            tracing::warn!(error = %e, "discarding unreadable saved cart");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
