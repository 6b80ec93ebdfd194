//! Sync engine errors.

use thiserror::Error;

use crate::{
    products::ProductId,
    stock::{is_stock_message, parse_available_stock},
};

/// Errors the remote cart store may return.
///
/// The store contract prefers the structured [`RemoteCartError::Stock`]
/// variant; [`RemoteCartError::classify`] exists for transports that can only
/// deliver a human-readable message string.
#[derive(Debug, Error)]
pub enum RemoteCartError {
    /// Quantity or availability conflict on a single line.
    #[error("{message}")]
    Stock {
        /// Human-readable explanation.
        message: String,
        /// Stock level, when the remote included one.
        available: Option<u32>,
    },

    /// Network or IO failure reaching the remote.
    #[error("transport error: {0}")]
    Transport(String),

    /// The ambient session is missing or no longer valid.
    #[error("not authorized")]
    Unauthorized,

    /// The remote reported a fault.
    #[error("server error: {0}")]
    Server(String),
}

impl RemoteCartError {
    /// Classifies a bare error message, sniffing stock phrasing and
    /// extracting the advertised stock level where possible.
    ///
    /// Fallback only: adapters whose transport carries structured errors
    /// should construct the variants directly.
    #[must_use]
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();

        if is_stock_message(&message) {
            let available = parse_available_stock(&message);
            Self::Stock { message, available }
        } else {
            Self::Server(message)
        }
    }
}

/// Errors surfaced by the synchronization engine.
///
/// Nothing here is fatal: every failure leaves the cart in an
/// invariant-respecting state.
#[derive(Debug, Error)]
pub enum CartSyncError {
    /// Stock conflict contained at the line level; recoverable in place via
    /// `resolve_line_error`.
    #[error("{message}")]
    Stock {
        /// Human-readable explanation, mirrored onto the affected line.
        message: String,
        /// Stock level, when one was derivable.
        available: Option<u32>,
    },

    /// A remote mutation failed for a non-stock reason; a global advisory was
    /// raised.
    #[error("failed to sync cart with server")]
    Sync(#[source] RemoteCartError),

    /// The remote snapshot fetch failed; the local cache was left untouched.
    #[error("failed to load cart from server")]
    Load(#[source] RemoteCartError),

    /// The requested product has no line in the cart.
    #[error("no cart line for product {0}")]
    LineNotFound(ProductId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_detects_stock_phrasing_with_level() {
        let err = RemoteCartError::classify("Only 3 available");

        assert!(
            matches!(
                err,
                RemoteCartError::Stock {
                    available: Some(3),
                    ..
                }
            ),
            "expected Stock with available 3, got {err:?}"
        );
    }

    #[test]
    fn classify_detects_stock_phrasing_without_level() {
        let err = RemoteCartError::classify("item is out of stock");

        assert!(
            matches!(err, RemoteCartError::Stock { available: None, .. }),
            "expected Stock without level, got {err:?}"
        );
    }

    #[test]
    fn classify_treats_other_messages_as_server_faults() {
        let err = RemoteCartError::classify("internal server error");

        assert!(
            matches!(err, RemoteCartError::Server(_)),
            "expected Server, got {err:?}"
        );
    }

    #[test]
    fn sync_error_preserves_its_source() {
        let err = CartSyncError::Sync(RemoteCartError::Transport("connection reset".into()));

        assert_eq!(err.to_string(), "failed to sync cart with server");
        assert!(
            matches!(err, CartSyncError::Sync(RemoteCartError::Transport(_))),
            "expected Transport source"
        );
    }
}
