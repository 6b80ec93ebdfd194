//! Cart

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::products::ProductId;

/// Errors related to cart construction or consistency.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    /// A second line exists for the same product.
    #[error("duplicate cart line for product {0}")]
    DuplicateLine(ProductId),

    /// A line violates one of the stock/activation invariants.
    #[error("cart line for product {product} is inconsistent: {rule}")]
    Inconsistent {
        /// Product whose line is inconsistent.
        product: ProductId,
        /// Description of the violated rule.
        rule: &'static str,
    },
}

/// Server-assigned identifier of a remote cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(Uuid);

impl LineId {
    /// Wraps a raw UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Display for LineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for LineId {
    fn from(value: Uuid) -> Self {
        Self::from_uuid(value)
    }
}

/// One product's presence in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product this line refers to.
    pub product_id: ProductId,

    /// Display name, captured at the time the line was created.
    pub name: String,

    /// Unit price. Exact fixed-point; never a binary float.
    pub unit_price: Decimal,

    /// Requested quantity. At least 1 for checkout-eligible lines.
    pub quantity: u32,

    /// Display-only image URL.
    pub image_url: Option<String>,

    /// Display-only catalogue slug.
    pub slug: Option<String>,

    /// Whether the line is checkout-eligible.
    pub is_active: bool,

    /// Human-readable explanation, set iff the line was deactivated by a
    /// stock condition.
    pub stock_error: Option<String>,

    /// Last known stock for the product. `None` means unknown; `Some(0)`
    /// means confirmed unavailable.
    pub available_stock: Option<u32>,

    /// Identifier of the corresponding server-side line, once acknowledged.
    /// Absent for local-only lines.
    pub server_line_id: Option<LineId>,
}

impl CartLine {
    /// Creates a new active, local-only line.
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            quantity,
            image_url: None,
            slug: None,
            is_active: true,
            stock_error: None,
            available_stock: None,
            server_line_id: None,
        }
    }

    /// The line's contribution to the subtotal: zero when inactive.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        if self.is_active {
            self.unit_price * Decimal::from(self.quantity)
        } else {
            Decimal::ZERO
        }
    }

    /// Deactivates the line with a stock error, recording the stock level
    /// when one is known.
    pub fn deactivate(&mut self, message: impl Into<String>, available: Option<u32>) {
        self.is_active = false;
        self.stock_error = Some(message.into());
        if available.is_some() {
            self.available_stock = available;
        }
    }

    /// Reactivates the line, clearing any stock error.
    pub fn reactivate(&mut self) {
        self.is_active = true;
        self.stock_error = None;
    }
}

/// The ordered collection of cart lines for the current session.
///
/// Lines are keyed by [`ProductId`]: adding a product that is already present
/// merges into the existing line rather than creating a duplicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Creates an empty cart.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cart from the given lines.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::DuplicateLine`] if two lines share a product.
    pub fn from_lines(lines: impl Into<Vec<CartLine>>) -> Result<Self, CartError> {
        let lines = lines.into();

        let mut seen = HashSet::new();
        for line in &lines {
            if !seen.insert(&line.product_id) {
                return Err(CartError::DuplicateLine(line.product_id.clone()));
            }
        }

        Ok(Self { lines })
    }

    /// Returns the line for the given product, if present.
    #[must_use]
    pub fn line(&self, product: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.product_id == product)
    }

    /// Returns the line for the given product, mutably.
    pub fn line_mut(&mut self, product: &ProductId) -> Option<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|line| &line.product_id == product)
    }

    /// Adds a line, merging into an existing line for the same product.
    ///
    /// On merge the quantities are summed, the line is reactivated with any
    /// stock error cleared, and a known stock level or server line id on the
    /// incoming line replaces the previous one.
    pub fn add_or_merge(&mut self, line: CartLine) {
        if let Some(existing) = self.line_mut(&line.product_id) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
            existing.reactivate();
            if line.available_stock.is_some() {
                existing.available_stock = line.available_stock;
            }
            if line.server_line_id.is_some() {
                existing.server_line_id = line.server_line_id;
            }
        } else {
            self.lines.push(line);
        }
    }

    /// Removes and returns the line for the given product.
    pub fn remove(&mut self, product: &ProductId) -> Option<CartLine> {
        let index = self
            .lines
            .iter()
            .position(|line| &line.product_id == product)?;

        Some(self.lines.remove(index))
    }

    /// Removes all lines.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Iterates over the lines in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter()
    }

    pub(crate) fn lines_mut(&mut self) -> impl Iterator<Item = &mut CartLine> {
        self.lines.iter_mut()
    }

    /// Iterates over the checkout-eligible lines only.
    pub fn active_lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.iter().filter(|line| line.is_active)
    }

    /// Subtotal over checkout-eligible lines. Inactive lines contribute
    /// nothing regardless of their quantity.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.active_lines().map(CartLine::line_total).sum()
    }

    /// Total quantity across all lines, inactive ones included.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Number of lines in the cart.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Verifies the cart's consistency rules: product uniqueness, and that
    /// any line whose quantity conflicts with a known stock level is inactive
    /// and carries a stock error.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn check_invariants(&self) -> Result<(), CartError> {
        let mut seen = HashSet::new();

        for line in &self.lines {
            if !seen.insert(&line.product_id) {
                return Err(CartError::DuplicateLine(line.product_id.clone()));
            }

            if line.is_active && line.quantity == 0 {
                return Err(CartError::Inconsistent {
                    product: line.product_id.clone(),
                    rule: "active line must have quantity >= 1",
                });
            }

            if let Some(available) = line.available_stock {
                let conflicted = available == 0 || line.quantity > available;

                if conflicted && line.is_active {
                    return Err(CartError::Inconsistent {
                        product: line.product_id.clone(),
                        rule: "line exceeding known stock must be inactive",
                    });
                }

                if conflicted && line.stock_error.is_none() {
                    return Err(CartError::Inconsistent {
                        product: line.product_id.clone(),
                        rule: "stock-deactivated line must carry a stock error",
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn line(product: &str, price_minor: i64, quantity: u32) -> CartLine {
        CartLine::new(
            ProductId::from(product),
            product,
            Decimal::new(price_minor, 2),
            quantity,
        )
    }

    #[test]
    fn empty_cart_has_zero_totals() {
        let cart = Cart::new();

        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), Decimal::ZERO);
        assert_eq!(cart.total_items(), 0);
    }

    #[test]
    fn from_lines_rejects_duplicate_products() {
        let result = Cart::from_lines([line("sofa-1", 100_00, 1), line("sofa-1", 100_00, 2)]);

        assert!(
            matches!(result, Err(CartError::DuplicateLine(ref p)) if p.as_str() == "sofa-1"),
            "expected DuplicateLine, got {result:?}"
        );
    }

    #[test]
    fn add_or_merge_sums_quantities_for_same_product() -> TestResult {
        let mut cart = Cart::new();

        cart.add_or_merge(line("sofa-1", 100_00, 2));
        cart.add_or_merge(line("sofa-1", 100_00, 3));

        assert_eq!(cart.len(), 1);
        assert_eq!(
            cart.line(&ProductId::from("sofa-1"))
                .map(|l| l.quantity),
            Some(5)
        );
        cart.check_invariants()?;

        Ok(())
    }

    #[test]
    fn add_or_merge_saturates_instead_of_overflowing() {
        let mut cart = Cart::new();

        cart.add_or_merge(line("sofa-1", 100_00, u32::MAX - 1));
        cart.add_or_merge(line("sofa-1", 100_00, 5));

        assert_eq!(
            cart.line(&ProductId::from("sofa-1")).map(|l| l.quantity),
            Some(u32::MAX)
        );
    }

    #[test]
    fn add_or_merge_reactivates_and_clears_stock_error() {
        let mut cart = Cart::new();

        let mut stale = line("lamp-2", 25_00, 1);
        stale.deactivate("only 1 available", Some(1));
        cart.add_or_merge(stale);

        let mut fresh = line("lamp-2", 25_00, 1);
        fresh.available_stock = Some(5);
        cart.add_or_merge(fresh);

        let merged = cart
            .line(&ProductId::from("lamp-2"))
            .cloned()
            .unwrap_or_else(|| line("missing", 0, 0));

        assert!(merged.is_active);
        assert_eq!(merged.stock_error, None);
        assert_eq!(merged.quantity, 2);
        assert_eq!(merged.available_stock, Some(5));
    }

    #[test]
    fn subtotal_excludes_inactive_lines() {
        let mut cart = Cart::new();
        cart.add_or_merge(line("sofa-1", 100_00, 2));
        cart.add_or_merge(line("lamp-2", 25_00, 4));

        if let Some(lamp) = cart.line_mut(&ProductId::from("lamp-2")) {
            lamp.deactivate("no longer available", Some(0));
        }

        // 2 x 100.00; the inactive lamp contributes nothing despite quantity 4
        assert_eq!(cart.subtotal(), Decimal::new(200_00, 2));
        assert_eq!(cart.total_items(), 6);
    }

    #[test]
    fn line_total_is_zero_when_inactive() {
        let mut inactive = line("chair-3", 49_99, 3);
        inactive.deactivate("out of stock", Some(0));

        assert_eq!(inactive.line_total(), Decimal::ZERO);
    }

    #[test]
    fn remove_returns_the_line() {
        let mut cart = Cart::new();
        cart.add_or_merge(line("sofa-1", 100_00, 1));

        let removed = cart.remove(&ProductId::from("sofa-1"));

        assert!(removed.is_some());
        assert!(cart.is_empty());
        assert!(cart.remove(&ProductId::from("sofa-1")).is_none());
    }

    #[test]
    fn deactivate_records_stock_and_reactivate_clears_error() {
        let mut l = line("table-4", 300_00, 10);

        l.deactivate("only 4 available", Some(4));
        assert!(!l.is_active);
        assert_eq!(l.available_stock, Some(4));
        assert!(l.stock_error.as_deref().is_some_and(|m| m.contains("4")));

        l.reactivate();
        assert!(l.is_active);
        assert_eq!(l.stock_error, None);
        // the last known stock level survives reactivation
        assert_eq!(l.available_stock, Some(4));
    }

    #[test]
    fn check_invariants_flags_active_line_over_stock() {
        let mut cart = Cart::new();
        let mut l = line("table-4", 300_00, 10);
        l.available_stock = Some(4);
        cart.add_or_merge(l);

        let result = cart.check_invariants();

        assert!(
            matches!(result, Err(CartError::Inconsistent { .. })),
            "expected Inconsistent, got {result:?}"
        );
    }

    #[test]
    fn check_invariants_accepts_deactivated_conflict() -> TestResult {
        let mut cart = Cart::new();
        let mut l = line("table-4", 300_00, 10);
        l.deactivate("only 4 available", Some(4));
        cart.add_or_merge(l);

        cart.check_invariants()?;

        Ok(())
    }

    #[test]
    fn cart_round_trips_through_serde() -> TestResult {
        let mut cart = Cart::new();
        let mut l = line("sofa-1", 100_00, 2);
        l.server_line_id = Some(LineId::from_uuid(Uuid::now_v7()));
        cart.add_or_merge(l);

        let json = serde_json::to_string(&cart)?;
        let restored: Cart = serde_json::from_str(&json)?;

        assert_eq!(restored, cart);

        Ok(())
    }
}
