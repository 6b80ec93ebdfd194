//! Local Cart Cache
//!
//! In-memory holder of the current best-known cart, with a durable mirror so
//! the cart survives process restarts without network access. Pure data
//! holder: no remote calls happen here.

use std::sync::{PoisonError, RwLock};

use tracing::warn;

use crate::cart::Cart;

pub mod mirror;

pub use mirror::{CartMirror, JsonFileMirror, MemoryMirror, MirrorError};

/// The single mutable shared resource of the engine.
///
/// Reads and writes are atomic with respect to each other: no reader ever
/// observes a partially written cart. Mirror persistence is best-effort; a
/// failing mirror is logged and never blocks a write.
#[derive(Debug)]
pub struct LocalCartCache {
    state: RwLock<Cart>,
    mirror: Box<dyn CartMirror>,
}

impl LocalCartCache {
    /// Creates a cache seeded from the mirror if it holds a cart, else empty.
    ///
    /// An unreadable mirror is logged and treated as absent.
    pub fn new(mirror: Box<dyn CartMirror>) -> Self {
        let seeded = match mirror.load() {
            Ok(Some(cart)) => cart,
            Ok(None) => Cart::new(),
            Err(err) => {
                warn!(error = %err, "failed to load cart mirror; starting empty");
                Cart::new()
            }
        };

        Self {
            state: RwLock::new(seeded),
            mirror,
        }
    }

    /// Creates a cache with no durable mirror.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryMirror::new()))
    }

    /// Returns a clone of the current cart.
    #[must_use]
    pub fn read(&self) -> Cart {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the cart wholesale and persists the mirror.
    pub fn write(&self, cart: Cart) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = cart;

        if let Err(err) = self.mirror.store(&guard) {
            warn!(error = %err, "failed to persist cart mirror");
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::{cart::CartLine, products::ProductId};

    use super::*;

    fn sample_cart() -> Cart {
        let mut cart = Cart::new();
        cart.add_or_merge(CartLine::new(
            ProductId::from("sofa-1"),
            "Corner Sofa",
            Decimal::new(499_00, 2),
            2,
        ));
        cart
    }

    #[test]
    fn cold_start_without_mirror_contents_is_empty() {
        let cache = LocalCartCache::in_memory();

        assert!(cache.read().is_empty());
    }

    #[test]
    fn cold_start_seeds_from_mirror() -> TestResult {
        let mirror = MemoryMirror::new();
        mirror.store(&sample_cart())?;

        let cache = LocalCartCache::new(Box::new(mirror));

        assert_eq!(cache.read(), sample_cart());

        Ok(())
    }

    #[test]
    fn write_replaces_state_and_persists() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cart.json");

        let cache = LocalCartCache::new(Box::new(JsonFileMirror::new(&path)));
        cache.write(sample_cart());

        assert_eq!(cache.read(), sample_cart());

        // a second cache over the same mirror sees the persisted cart
        let restarted = LocalCartCache::new(Box::new(JsonFileMirror::new(&path)));
        assert_eq!(restarted.read(), sample_cart());

        Ok(())
    }

    #[test]
    fn write_is_wholesale_replacement() {
        let cache = LocalCartCache::in_memory();
        cache.write(sample_cart());

        cache.write(Cart::new());

        assert!(cache.read().is_empty());
    }
}
