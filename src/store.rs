//! Remote collaborators.
//!
//! The engine consumes, but never implements, the authoritative server-side
//! cart and the stock oracle. Transport adapters (REST, WebSocket, ...) live
//! outside this crate and implement these traits.

use async_trait::async_trait;
use mockall::automock;
use rust_decimal::Decimal;

use crate::{
    cart::LineId,
    errors::RemoteCartError,
    products::ProductId,
    stock::StockLevel,
};

/// Snapshot of the authoritative server-side cart.
#[derive(Debug, Clone, Default)]
pub struct RemoteCart {
    /// Lines as the server currently holds them.
    pub lines: Vec<RemoteCartLine>,
}

/// One server-side cart line, including the product record embedded in the
/// snapshot.
#[derive(Debug, Clone)]
pub struct RemoteCartLine {
    /// Server-assigned line identifier.
    pub id: LineId,

    /// Product the line refers to.
    pub product_id: ProductId,

    /// Product display name.
    pub name: String,

    /// Unit price.
    pub unit_price: Decimal,

    /// Quantity held server-side.
    pub quantity: u32,

    /// Display-only image URL.
    pub image_url: Option<String>,

    /// Display-only catalogue slug.
    pub slug: Option<String>,
}

/// The authoritative per-user cart collection.
#[automock]
#[async_trait]
pub trait RemoteCartStore: Send + Sync {
    /// Fetches the current cart snapshot.
    async fn get(&self) -> Result<RemoteCart, RemoteCartError>;

    /// Adds a product to the cart, returning the new line's identifier.
    async fn add_item(
        &self,
        product: &ProductId,
        quantity: u32,
    ) -> Result<LineId, RemoteCartError>;

    /// Sets the quantity of an existing line.
    async fn update_item(&self, line: LineId, quantity: u32) -> Result<(), RemoteCartError>;

    /// Removes a line from the cart.
    async fn remove_item(&self, line: LineId) -> Result<(), RemoteCartError>;

    /// Empties the cart.
    async fn clear(&self) -> Result<(), RemoteCartError>;

    /// Reports a line's activation state back to the server. Best-effort:
    /// callers log failures and move on.
    async fn mark_line_inactive(&self, line: LineId, active: bool) -> Result<(), RemoteCartError>;
}

/// Source of truth for how many units of a product remain purchasable.
#[automock]
#[async_trait]
pub trait StockOracle: Send + Sync {
    /// Reports the current stock level for a product.
    async fn check(&self, product: &ProductId) -> Result<StockLevel, RemoteCartError>;
}
