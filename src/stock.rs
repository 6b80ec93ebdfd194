//! Stock

use serde::{Deserialize, Serialize};

use crate::cart::CartLine;

/// Availability of a product as last reported by the stock oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// Whether the product is purchasable at all.
    pub in_stock: bool,

    /// Units remaining. Meaningless when `in_stock` is false.
    pub quantity: u32,
}

impl StockLevel {
    /// A level with the given number of purchasable units.
    #[must_use]
    pub const fn of(quantity: u32) -> Self {
        Self {
            in_stock: quantity > 0,
            quantity,
        }
    }

    /// A confirmed-unavailable level.
    #[must_use]
    pub const fn out_of_stock() -> Self {
        Self {
            in_stock: false,
            quantity: 0,
        }
    }

    /// Units actually purchasable: zero whenever `in_stock` is false.
    #[must_use]
    pub const fn available(self) -> u32 {
        if self.in_stock { self.quantity } else { 0 }
    }
}

/// Applies an oracle report to a line, enforcing the stock invariants: a line
/// with zero available stock, or a quantity above the available stock, is
/// deactivated with a stock error; otherwise the line is (re)activated.
///
/// Returns `true` when the line was deactivated.
pub fn apply_stock(line: &mut CartLine, stock: StockLevel) -> bool {
    let available = stock.available();
    line.available_stock = Some(available);

    if available == 0 {
        let message = format!("{} is no longer available", line.name);
        line.deactivate(message, Some(0));
        true
    } else if line.quantity > available {
        let message = format!("only {available} available");
        line.deactivate(message, Some(available));
        true
    } else {
        line.reactivate();
        false
    }
}

/// Whether a human-readable remote error message describes a stock or
/// availability condition.
///
/// Fallback for transports that cannot emit a structured stock error; see
/// [`crate::errors::RemoteCartError::classify`].
#[must_use]
pub fn is_stock_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();

    ["available", "stock", "sold out", "inventory"]
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// Extracts the advertised stock from a human-readable message: the nearest
/// integer before the first occurrence of the word "available" (e.g.
/// "only 4 available" => 4).
#[must_use]
pub fn parse_available_stock(message: &str) -> Option<u32> {
    let mut last_number = None;

    for token in message.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.is_empty() {
            continue;
        }

        if let Ok(number) = token.parse::<u32>() {
            last_number = Some(number);
        } else if token.eq_ignore_ascii_case("available") {
            return last_number;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::{cart::CartLine, products::ProductId};

    use super::*;

    fn line(quantity: u32) -> CartLine {
        CartLine::new(
            ProductId::from("lamp-2"),
            "Arc Lamp",
            Decimal::new(25_00, 2),
            quantity,
        )
    }

    #[test]
    fn zero_stock_deactivates_with_error() {
        let mut l = line(1);

        let deactivated = apply_stock(&mut l, StockLevel::out_of_stock());

        assert!(deactivated);
        assert!(!l.is_active);
        assert_eq!(l.available_stock, Some(0));
        assert!(l.stock_error.is_some());
    }

    #[test]
    fn quantity_above_stock_deactivates_naming_the_limit() {
        let mut l = line(5);

        let deactivated = apply_stock(&mut l, StockLevel::of(2));

        assert!(deactivated);
        assert!(!l.is_active);
        assert_eq!(l.available_stock, Some(2));
        assert!(l.stock_error.as_deref().is_some_and(|m| m.contains("2")));
    }

    #[test]
    fn quantity_within_stock_reactivates() {
        let mut l = line(2);
        l.deactivate("stale error", Some(1));

        let deactivated = apply_stock(&mut l, StockLevel::of(3));

        assert!(!deactivated);
        assert!(l.is_active);
        assert_eq!(l.stock_error, None);
        assert_eq!(l.available_stock, Some(3));
    }

    #[test]
    fn out_of_stock_reports_zero_even_with_quantity() {
        let level = StockLevel {
            in_stock: false,
            quantity: 7,
        };

        assert_eq!(level.available(), 0);
    }

    #[test]
    fn stock_messages_are_recognised() {
        assert!(is_stock_message("Only 3 available"));
        assert!(is_stock_message("insufficient stock for this item"));
        assert!(is_stock_message("Item is sold out"));
        assert!(!is_stock_message("internal server error"));
        assert!(!is_stock_message("request timed out"));
    }

    #[test]
    fn parses_number_preceding_available() {
        assert_eq!(parse_available_stock("Only 4 available"), Some(4));
        assert_eq!(
            parse_available_stock("only 2 available, you requested 5"),
            Some(2)
        );
        assert_eq!(parse_available_stock("12 units available."), Some(12));
    }

    #[test]
    fn parse_returns_none_without_a_preceding_number() {
        assert_eq!(parse_available_stock("no longer available"), None);
        assert_eq!(parse_available_stock("out of stock"), None);
        assert_eq!(parse_available_stock("available in 3 days"), None);
    }
}
