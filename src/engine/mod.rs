//! Reconciliation engine.
//!
//! The sole authority for turning user intent and remote store results into a
//! consistent local cart. Mutations are applied optimistically (persisted
//! before the remote call returns), then confirmed, marked inactive, or
//! rolled back once the remote call settles.
//!
//! Cache reads and writes are synchronous around `await` points, never across
//! them. No ordering is enforced between concurrent operations: last write
//! wins on the shared cache, and the next full reconciliation is
//! authoritative.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    cache::LocalCartCache,
    cart::{Cart, CartLine, LineId},
    errors::{CartSyncError, RemoteCartError},
    products::ProductId,
    stock::{StockLevel, apply_stock},
    store::{RemoteCartStore, StockOracle},
};

pub mod scheduler;

const LOAD_FAILED: &str = "failed to load cart from server";
const SYNC_FAILED: &str = "failed to sync cart with server";
const STOCK_CHANGED: &str =
    "some items in your cart are no longer available or have limited stock";

/// Details of a product being added to the cart, as known to the caller from
/// the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLine {
    /// Product to add.
    pub product_id: ProductId,

    /// Display name.
    pub name: String,

    /// Unit price.
    pub unit_price: Decimal,

    /// Display-only image URL.
    pub image_url: Option<String>,

    /// Display-only catalogue slug.
    pub slug: Option<String>,
}

impl NewLine {
    /// Creates a new line with the display-only fields unset.
    pub fn new(product_id: ProductId, name: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit_price,
            image_url: None,
            slug: None,
        }
    }
}

/// The cart synchronization engine.
///
/// Holds the local cart cache, the global advisory error slot and the
/// in-flight operation counter, and negotiates every mutation against the
/// remote store.
pub struct CartSyncEngine<S, O> {
    store: S,
    oracle: O,
    cache: LocalCartCache,
    error: Mutex<Option<String>>,
    in_flight: AtomicUsize,
}

impl<S, O> Debug for CartSyncEngine<S, O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CartSyncEngine")
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl<S, O> CartSyncEngine<S, O>
where
    S: RemoteCartStore,
    O: StockOracle,
{
    /// Creates an engine over the given collaborators and cache.
    pub fn new(store: S, oracle: O, cache: LocalCartCache) -> Self {
        Self {
            store,
            oracle,
            cache,
            error: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetches the remote snapshot, validates every line against the stock
    /// oracle and replaces the local cart wholesale.
    ///
    /// Lines that fail validation are deactivated with a stock error and
    /// reported back to the server (best-effort). When any line was
    /// deactivated a single global advisory is raised rather than one error
    /// per line.
    ///
    /// # Errors
    ///
    /// Returns [`CartSyncError::Load`] when the snapshot fetch fails; the
    /// local cache is left untouched.
    #[tracing::instrument(skip(self))]
    pub async fn load_from_remote(&self) -> Result<Cart, CartSyncError> {
        let _in_flight = self.begin_op();

        let snapshot = match self.store.get().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.set_error(LOAD_FAILED);
                return Err(CartSyncError::Load(err));
            }
        };

        // fold any server-side duplicates into one line per product before
        // validation
        let mut cart = Cart::new();
        for remote in snapshot.lines {
            if cart.line(&remote.product_id).is_some() {
                warn!(product = %remote.product_id, "duplicate line in remote snapshot; merging");
            }

            let mut line = CartLine::new(
                remote.product_id,
                remote.name,
                remote.unit_price,
                remote.quantity,
            );
            line.image_url = remote.image_url;
            line.slug = remote.slug;
            line.server_line_id = Some(remote.id);

            cart.add_or_merge(line);
        }

        let mut deactivated = Vec::new();
        for line in cart.lines_mut() {
            match self.oracle.check(&line.product_id).await {
                Ok(stock) => {
                    if apply_stock(line, stock) {
                        debug!(product = %line.product_id, "line deactivated during reconciliation");
                        if let Some(id) = line.server_line_id {
                            deactivated.push(id);
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        product = %line.product_id,
                        error = %err,
                        "stock lookup failed; stock level left unknown"
                    );
                }
            }
        }

        for id in &deactivated {
            if let Err(err) = self.store.mark_line_inactive(*id, false).await {
                warn!(line = %id, error = %err, "failed to report inactive line to server");
            }
        }

        self.cache.write(cart.clone());

        if !deactivated.is_empty() {
            self.set_error(STOCK_CHANGED);
        }

        Ok(cart)
    }

    /// Adds a product to the cart, merging into an existing line for the same
    /// product.
    ///
    /// The merge is applied and persisted before the remote call returns.
    /// The add is rejected up front, without touching the cart, when a stock
    /// hint or a previously learned stock level shows the combined quantity
    /// is not sellable. Adding zero units is a no-op. On a stock-classified
    /// remote failure the line is kept but deactivated in place; on any
    /// other failure the pre-mutation cart is restored and a global error
    /// raised.
    ///
    /// # Errors
    ///
    /// Returns [`CartSyncError::Stock`] for stock conflicts and
    /// [`CartSyncError::Sync`] for other remote failures. Both are re-thrown
    /// so the caller can show transient feedback.
    #[tracing::instrument(skip(self, new), fields(product = %new.product_id))]
    pub async fn add_line(
        &self,
        new: NewLine,
        quantity: u32,
        stock_hint: Option<StockLevel>,
    ) -> Result<(), CartSyncError> {
        if quantity == 0 {
            debug!(product = %new.product_id, "add requested with zero quantity; nothing to do");
            return Ok(());
        }

        let _in_flight = self.begin_op();

        let before = self.cache.read();
        let existing = before.line(&new.product_id);
        let held = existing.map_or(0, |line| line.quantity);

        // the pre-flight limit is the tightest level known: the caller's
        // hint and whatever the line already learned from the server
        let known = match (
            stock_hint.map(StockLevel::available),
            existing.and_then(|line| line.available_stock),
        ) {
            (Some(hint), Some(stored)) => Some(hint.min(stored)),
            (hint, stored) => hint.or(stored),
        };

        if let Some(available) = known {
            if available == 0 {
                return Err(CartSyncError::Stock {
                    message: format!("{} is out of stock", new.name),
                    available: Some(0),
                });
            }

            if held.saturating_add(quantity) > available {
                return Err(CartSyncError::Stock {
                    message: format!(
                        "only {available} available; you already have {held} in your cart"
                    ),
                    available: Some(available),
                });
            }
        }

        let product = new.product_id.clone();

        let mut line = CartLine::new(new.product_id, new.name, new.unit_price, quantity);
        line.image_url = new.image_url;
        line.slug = new.slug;
        line.available_stock = stock_hint.map(StockLevel::available);

        let mut cart = before.clone();
        cart.add_or_merge(line);
        self.cache.write(cart);

        match self.store.add_item(&product, quantity).await {
            Ok(line_id) => {
                let mut cart = self.cache.read();
                if let Some(line) = cart.line_mut(&product) {
                    line.server_line_id = Some(line_id);
                }
                self.cache.write(cart);

                Ok(())
            }
            Err(RemoteCartError::Stock { message, available }) => {
                // the line stays visible so the user can adjust it
                let mut cart = self.cache.read();
                if let Some(line) = cart.line_mut(&product) {
                    line.deactivate(message.clone(), available);
                }
                self.cache.write(cart);

                Err(CartSyncError::Stock { message, available })
            }
            Err(err) => {
                self.cache.write(before);
                self.set_error(SYNC_FAILED);

                Err(CartSyncError::Sync(err))
            }
        }
    }

    /// Sets the quantity of an existing line. A quantity of zero removes the
    /// line.
    ///
    /// A known stock level below the requested quantity rejects the change
    /// locally, clamping the line to the sellable amount and deactivating it;
    /// no remote call is made. Otherwise the new quantity is applied
    /// optimistically and pushed to the server, resolving the server line id
    /// via a fresh snapshot when it is not yet known; a failed snapshot
    /// fetch is reported as a sync failure.
    ///
    /// On a non-stock remote failure the optimistic quantity is retained; the
    /// next full reconciliation recovers it.
    ///
    /// # Errors
    ///
    /// Returns [`CartSyncError::LineNotFound`] when the product has no line,
    /// [`CartSyncError::Stock`] for stock conflicts and
    /// [`CartSyncError::Sync`] for other remote failures.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        product: &ProductId,
        quantity: u32,
    ) -> Result<(), CartSyncError> {
        if quantity == 0 {
            return self.remove_line(product).await;
        }

        let _in_flight = self.begin_op();

        let mut cart = self.cache.read();
        let Some(line) = cart.line_mut(product) else {
            return Err(CartSyncError::LineNotFound(product.clone()));
        };

        if let Some(available) = line.available_stock {
            if quantity > available {
                // clamp to the sellable amount; a zero level keeps the held
                // quantity visible since no valid quantity exists
                let message = if available == 0 {
                    format!("{} is no longer available", line.name)
                } else {
                    line.quantity = available;
                    format!("only {available} available")
                };
                line.deactivate(message.clone(), Some(available));
                self.cache.write(cart);

                return Err(CartSyncError::Stock {
                    message,
                    available: Some(available),
                });
            }
        }

        line.quantity = quantity;
        line.reactivate();
        let known_id = line.server_line_id;
        self.cache.write(cart);

        let line_id = match known_id {
            Some(id) => Some(id),
            None => match self.resolve_line_id(product).await {
                Ok(id) => id,
                Err(err) => {
                    self.set_error(SYNC_FAILED);
                    return Err(CartSyncError::Sync(err));
                }
            },
        };

        let Some(line_id) = line_id else {
            debug!(product = %product, "no server-side line; skipping remote update");
            return Ok(());
        };

        match self.store.update_item(line_id, quantity).await {
            Ok(()) => Ok(()),
            Err(RemoteCartError::Stock { message, available }) => {
                // the requested quantity stays visible so the user can see
                // what failed
                let mut cart = self.cache.read();
                if let Some(line) = cart.line_mut(product) {
                    line.deactivate(message.clone(), available);
                }
                self.cache.write(cart);

                Err(CartSyncError::Stock { message, available })
            }
            Err(err) => {
                self.set_error(SYNC_FAILED);

                Err(CartSyncError::Sync(err))
            }
        }
    }

    /// Removes the line for the given product. Removing an absent product is
    /// a no-op.
    ///
    /// The local removal is one-way: a failed remote removal raises a global
    /// error but never resurrects the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartSyncError::Sync`] when the remote removal, or the
    /// snapshot fetch resolving the server line id, fails.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, product: &ProductId) -> Result<(), CartSyncError> {
        let _in_flight = self.begin_op();

        let mut cart = self.cache.read();
        let Some(removed) = cart.remove(product) else {
            debug!(product = %product, "remove requested for a product not in the cart");
            return Ok(());
        };
        self.cache.write(cart);

        let line_id = match removed.server_line_id {
            Some(id) => Some(id),
            None => match self.resolve_line_id(product).await {
                Ok(id) => id,
                Err(err) => {
                    self.set_error(SYNC_FAILED);
                    return Err(CartSyncError::Sync(err));
                }
            },
        };

        let Some(line_id) = line_id else {
            return Ok(());
        };

        if let Err(err) = self.store.remove_item(line_id).await {
            self.set_error(SYNC_FAILED);
            return Err(CartSyncError::Sync(err));
        }

        Ok(())
    }

    /// Empties the cart locally and remotely.
    ///
    /// The local cart stays empty even when the remote clear fails; the next
    /// full reconciliation re-syncs if the clear did not take server-side.
    ///
    /// # Errors
    ///
    /// Returns [`CartSyncError::Sync`] when the remote clear fails.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), CartSyncError> {
        let _in_flight = self.begin_op();

        self.cache.write(Cart::new());

        if let Err(err) = self.store.clear().await {
            self.set_error(SYNC_FAILED);
            return Err(CartSyncError::Sync(err));
        }

        Ok(())
    }

    /// Resolves a line's stock error by adjusting the line into a valid
    /// state rather than just hiding the message.
    ///
    /// With a known positive stock level the line is clamped to it; with a
    /// confirmed-zero level the line is removed; with an unknown level the
    /// error is cleared and the line reactivated as-is, to be re-validated by
    /// the next full reconciliation. A line without a stock error is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying quantity update or removal.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_line_error(&self, product: &ProductId) -> Result<(), CartSyncError> {
        let cart = self.cache.read();
        let Some(line) = cart.line(product) else {
            return Ok(());
        };

        if line.is_active && line.stock_error.is_none() {
            return Ok(());
        }

        match line.available_stock {
            Some(0) => self.remove_line(product).await,
            Some(available) => self.update_quantity(product, available).await,
            None => {
                let mut cart = cart;
                if let Some(line) = cart.line_mut(product) {
                    // stock is re-validated on the next full reconciliation
                    line.reactivate();
                }
                self.cache.write(cart);

                Ok(())
            }
        }
    }

    /// Returns a clone of the current cart.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.cache.read()
    }

    /// Subtotal over checkout-eligible lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.cache.read().subtotal()
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.cache.read().total_items()
    }

    /// The checkout-eligible lines.
    #[must_use]
    pub fn active_lines(&self) -> Vec<CartLine> {
        self.cache.read().active_lines().cloned().collect()
    }

    /// The current global advisory message, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dismisses the global advisory message.
    pub fn clear_error(&self) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether any engine operation is currently in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    async fn resolve_line_id(
        &self,
        product: &ProductId,
    ) -> Result<Option<LineId>, RemoteCartError> {
        let snapshot = self.store.get().await?;

        Ok(snapshot
            .lines
            .iter()
            .find(|line| &line.product_id == product)
            .map(|line| line.id))
    }

    fn begin_op(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            counter: &self.in_flight,
        }
    }

    fn set_error(&self, message: &str) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_owned());
    }
}

struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
