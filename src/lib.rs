//! Trolley
//!
//! Trolley is a client-side shopping-cart synchronization engine. It keeps a
//! locally usable cart while an authoritative server-side cart exists,
//! applying user mutations optimistically, reconciling quantity and stock
//! changes against the remote store, and guaranteeing the cart never silently
//! presents a state the backend would reject at checkout.

pub mod cache;
pub mod cart;
pub mod engine;
pub mod errors;
pub mod prelude;
pub mod products;
pub mod stock;
pub mod store;
