//! Shared primitive types used across the engine.

use rust_decimal::{Decimal, RoundingStrategy};

/// Store-assigned identifier of a reclamation row.
pub type ReclamationId = i64;

/// Identifier of a user account in the account directory.
pub type UserId = i64;

/// Identifier of the booking (rental transaction) under dispute.
pub type BookingId = i64;

/// Identifier of a listed property.
pub type PropertyId = i64;

/// On-chain address a settlement transfer is sent to.
pub type WalletAddress = String;

/// Monetary amount. Always carried at 2-decimal precision once rounded.
pub type Money = Decimal;

/// Round to cents, half-up. Every amount is passed through this before it is
/// compared, summed into a pool check, or handed to the settlement executor.
pub fn round_money(amount: Money) -> Money {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Fraction expressed in basis points (1/100 of a percent) as a decimal.
pub fn bps_fraction(bps: u32) -> Decimal {
    Decimal::from(bps) / Decimal::from(10_000u32)
}
