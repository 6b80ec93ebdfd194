//! Trolley prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cache::{CartMirror, JsonFileMirror, LocalCartCache, MemoryMirror, MirrorError},
    cart::{Cart, CartError, CartLine, LineId},
    engine::{
        CartSyncEngine, NewLine,
        scheduler::{DEFAULT_RECONCILE_INTERVAL, ReconcileScheduler},
    },
    errors::{CartSyncError, RemoteCartError},
    products::ProductId,
    stock::StockLevel,
    store::{RemoteCart, RemoteCartLine, RemoteCartStore, StockOracle},
};
