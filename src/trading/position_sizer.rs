//! Balance-proportional position sizing.
//!
//! The remote order's notional is expressed as a fraction of the remote
//! account's available balance; the same fraction (scaled by the copy
//! percentage) of our balance becomes the target notional, which is then
//! bounded by the configured min/max bet sizes.

use std::fmt;

use rust_decimal::Decimal;

use crate::models::RemoteOrder;

/// Why the sizer produced the size it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingReason {
    Ok,
    /// Target below the minimum bet; the order is not placed
    BelowMin,
    /// Target above the maximum bet; placed at the maximum
    ClampedToMax,
    /// A balance is zero or negative; no fraction can be computed
    InsufficientBalance,
}

impl SizingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingReason::Ok => "OK",
            SizingReason::BelowMin => "BELOW_MIN",
            SizingReason::ClampedToMax => "CLAMPED_TO_MAX",
            SizingReason::InsufficientBalance => "INSUFFICIENT_BALANCE",
        }
    }

    /// Whether an order should be submitted for this decision.
    pub fn places_order(&self) -> bool {
        matches!(self, SizingReason::Ok | SizingReason::ClampedToMax)
    }
}

impl fmt::Display for SizingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the sizer. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingDecision {
    /// Unbounded target notional
    pub target_size: Decimal,
    /// Size to place; zero when no order is placed
    pub bounded_size: Decimal,
    pub reason: SizingReason,
}

impl SizingDecision {
    fn insufficient() -> Self {
        Self {
            target_size: Decimal::ZERO,
            bounded_size: Decimal::ZERO,
            reason: SizingReason::InsufficientBalance,
        }
    }
}

/// Size a replicated order.
///
/// `copy_percentage` is in percent (100 = same balance fraction as the remote).
/// A zero or negative balance on either side is `InsufficientBalance`, so an
/// empty local account records that reason rather than `BelowMin`.
/// Arithmetic overflow can only come from an enormous target, so it clamps to
/// `max_size`.
pub fn size_position(
    remote_order: &RemoteOrder,
    remote_balance: Decimal,
    local_balance: Decimal,
    copy_percentage: Decimal,
    min_size: Decimal,
    max_size: Decimal,
) -> SizingDecision {
    if remote_balance <= Decimal::ZERO || local_balance <= Decimal::ZERO {
        return SizingDecision::insufficient();
    }

    let target = remote_order
        .notional()
        .and_then(|notional| notional.checked_div(remote_balance))
        .and_then(|fraction| fraction.checked_mul(copy_percentage))
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|fraction| fraction.checked_mul(local_balance));

    let Some(target_size) = target else {
        return SizingDecision {
            target_size: Decimal::MAX,
            bounded_size: max_size,
            reason: SizingReason::ClampedToMax,
        };
    };

    if target_size < min_size {
        SizingDecision {
            target_size,
            bounded_size: Decimal::ZERO,
            reason: SizingReason::BelowMin,
        }
    } else if target_size > max_size {
        SizingDecision {
            target_size,
            bounded_size: max_size,
            reason: SizingReason::ClampedToMax,
        }
    } else {
        SizingDecision {
            target_size,
            bounded_size: target_size,
            reason: SizingReason::Ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSide;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn remote(size: Decimal, price: Decimal) -> RemoteOrder {
        RemoteOrder {
            id: "r1".to_string(),
            market_id: "0xabc".to_string(),
            asset_id: "1".to_string(),
            outcome: "Yes".to_string(),
            side: OrderSide::Buy,
            size,
            price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_same_fraction_of_local_balance() {
        // $500 of a $5000 balance is 10%; 10% of $1000 is $100
        let d = size_position(
            &remote(dec!(100), dec!(5)),
            dec!(5000),
            dec!(1000),
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::Ok);
        assert_eq!(d.target_size, dec!(100));
        assert_eq!(d.bounded_size, dec!(100));
    }

    #[test]
    fn test_copy_percentage_scales_target() {
        let d = size_position(
            &remote(dec!(100), dec!(5)),
            dec!(5000),
            dec!(1000),
            dec!(50),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::Ok);
        assert_eq!(d.bounded_size, dec!(50));
    }

    #[test]
    fn test_below_min_is_not_placed() {
        // $2.50 of $5000 = 0.05%; 0.05% of $1000 = $0.50
        let d = size_position(
            &remote(dec!(5), dec!(0.5)),
            dec!(5000),
            dec!(1000),
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::BelowMin);
        assert_eq!(d.target_size, dec!(0.5));
        assert_eq!(d.bounded_size, Decimal::ZERO);
        assert!(!d.reason.places_order());
    }

    #[test]
    fn test_clamped_to_max_still_placed() {
        // $2500 of $5000 = 50%; 50% of $10000 = $5000
        let d = size_position(
            &remote(dec!(500), dec!(5)),
            dec!(5000),
            dec!(10000),
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::ClampedToMax);
        assert_eq!(d.target_size, dec!(5000));
        assert_eq!(d.bounded_size, dec!(1000));
        assert!(d.reason.places_order());
    }

    #[test]
    fn test_zero_remote_balance() {
        let d = size_position(
            &remote(dec!(100), dec!(5)),
            Decimal::ZERO,
            dec!(1000),
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::InsufficientBalance);
        assert_eq!(d.bounded_size, Decimal::ZERO);
    }

    #[test]
    fn test_negative_balances() {
        let d = size_position(
            &remote(dec!(100), dec!(5)),
            dec!(-10),
            dec!(1000),
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::InsufficientBalance);

        let d = size_position(
            &remote(dec!(100), dec!(5)),
            dec!(5000),
            Decimal::ZERO,
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::InsufficientBalance);
    }

    #[test]
    fn test_empty_local_balance_reason() {
        // Would size to zero, which is reported as a balance problem, not dust
        let d = size_position(
            &remote(dec!(100), dec!(5)),
            dec!(5000),
            Decimal::ZERO,
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason.as_str(), "INSUFFICIENT_BALANCE");
        assert!(!d.reason.places_order());
    }

    #[test]
    fn test_overflow_clamps() {
        let d = size_position(
            &remote(Decimal::MAX, Decimal::MAX),
            dec!(0.0001),
            dec!(1000),
            dec!(100),
            dec!(1),
            dec!(1000),
        );
        assert_eq!(d.reason, SizingReason::ClampedToMax);
        assert_eq!(d.bounded_size, dec!(1000));
    }

    #[test]
    fn test_placed_sizes_stay_within_bounds() {
        let min = dec!(2);
        let max = dec!(250);
        let sizes = [dec!(0.01), dec!(1), dec!(37), dec!(400), dec!(12000)];
        let prices = [dec!(0.01), dec!(0.33), dec!(0.5), dec!(0.99)];
        let remote_balances = [dec!(0.5), dec!(100), dec!(5000), dec!(1000000)];
        let local_balances = [dec!(1), dec!(250), dec!(80000)];
        let percentages = [dec!(0.1), dec!(50), dec!(100), dec!(1000)];

        for size in sizes {
            for price in prices {
                for rb in remote_balances {
                    for lb in local_balances {
                        for pct in percentages {
                            let d = size_position(&remote(size, price), rb, lb, pct, min, max);
                            if d.reason.places_order() {
                                assert!(d.bounded_size >= min && d.bounded_size <= max, "{:?}", d);
                            } else {
                                assert_eq!(d.bounded_size, Decimal::ZERO);
                            }
                        }
                    }
                }
            }
        }
    }
}
