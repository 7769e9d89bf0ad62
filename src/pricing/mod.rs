use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::AppError;
use crate::models::pricing::{CommissionSplit, PriceBreakdown, Voucher, VoucherKind};

/// RM 5 base fare covers the first 4 km of travel.
const TRAVEL_BASE_FEE_CENTS: i64 = 500;
const TRAVEL_BASE_DISTANCE_KM: i64 = 4;
/// RM 1 per km beyond the base distance.
const TRAVEL_PER_KM_CENTS: i64 = 100;
/// Flat RM 2 platform fee per booking.
const PLATFORM_FEE_CENTS: i64 = 200;
/// Platform takes 12% of the service subtotal. Fees are never commissioned.
const COMMISSION_RATE_PERCENT: i64 = 12;
/// 10 loyalty points per RM of service subtotal, accrued on completion.
const POINTS_PER_RM: i64 = 10;

/// All money is RM at exactly 2 decimal places; intermediate rounding is
/// round-half-up.
fn round_rm(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub fn platform_fee() -> Decimal {
    Decimal::new(PLATFORM_FEE_CENTS, 2)
}

pub fn commission_rate() -> Decimal {
    Decimal::new(COMMISSION_RATE_PERCENT, 2)
}

/// Tiered travel fee: base fare up to the base distance, then a linear
/// per-km charge. Continuous at the tier boundary and non-decreasing in
/// distance.
pub fn travel_fee(distance_km: f64) -> Decimal {
    let distance = Decimal::from_f64(distance_km.max(0.0)).unwrap_or_default();
    let base_fee = Decimal::new(TRAVEL_BASE_FEE_CENTS, 2);
    let base_distance = Decimal::from(TRAVEL_BASE_DISTANCE_KM);

    let fee = if distance <= base_distance {
        base_fee
    } else {
        base_fee + Decimal::new(TRAVEL_PER_KM_CENTS, 2) * (distance - base_distance)
    };

    round_rm(fee)
}

/// Exact split of the service subtotal. The commission is rounded first and
/// the provider earns the remainder, so the two always sum back to the
/// subtotal.
pub fn commission_split(subtotal: Decimal, rate: Decimal) -> CommissionSplit {
    let commission = round_rm(subtotal * rate);
    CommissionSplit {
        commission,
        provider_earning: subtotal - commission,
    }
}

fn voucher_discount(voucher: &Voucher, subtotal: Decimal) -> Result<Decimal, AppError> {
    if voucher.consumed {
        return Err(AppError::DiscountIneligible(
            "voucher already used".to_string(),
        ));
    }
    // Eligibility is always judged against the pre-credit subtotal.
    if subtotal < voucher.min_spend {
        return Err(AppError::DiscountIneligible(format!(
            "minimum spend RM {} not met",
            voucher.min_spend
        )));
    }

    let discount = match voucher.kind {
        VoucherKind::Fixed => voucher.value.min(subtotal),
        VoucherKind::Percentage => {
            let raw = subtotal * voucher.value / Decimal::from(100);
            match voucher.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
    };

    Ok(round_rm(discount))
}

fn assemble(
    subtotal: Decimal,
    distance_km: f64,
    discount_applied: Decimal,
    credit_balance: Decimal,
) -> PriceBreakdown {
    let travel_fee = travel_fee(distance_km);
    let platform_fee = platform_fee();

    let pre_discount_total = subtotal + travel_fee + platform_fee;
    let remaining = (pre_discount_total - discount_applied).max(Decimal::ZERO);
    let credit_applied = round_rm(credit_balance.max(Decimal::ZERO)).min(remaining);
    let total = remaining - credit_applied;

    let split = commission_split(subtotal, commission_rate());

    PriceBreakdown {
        subtotal,
        travel_fee,
        platform_fee,
        commission: split.commission,
        provider_earning: split.provider_earning,
        discount_applied,
        credit_applied,
        total,
    }
}

/// Compute the authoritative price of a job.
///
/// The voucher discount is taken against the pre-credit total first; stored
/// credit then covers at most the remaining payable. The total never goes
/// negative: credit silently clamps instead of erroring.
pub fn price_quote(
    subtotal: Decimal,
    distance_km: f64,
    voucher: Option<&Voucher>,
    credit_balance: Decimal,
) -> Result<PriceBreakdown, AppError> {
    let subtotal = round_rm(subtotal);
    let discount_applied = match voucher {
        Some(v) => voucher_discount(v, subtotal)?,
        None => Decimal::ZERO,
    };

    Ok(assemble(subtotal, distance_km, discount_applied, credit_balance))
}

/// Quote for booking creation: an ineligible voucher is dropped from the
/// price rather than failing the confirmation.
pub fn price_or_drop_voucher(
    subtotal: Decimal,
    distance_km: f64,
    voucher: Option<&Voucher>,
    credit_balance: Decimal,
) -> PriceBreakdown {
    let subtotal = round_rm(subtotal);
    let discount_applied = match voucher.map(|v| voucher_discount(v, subtotal)).transpose() {
        Ok(discount) => discount.unwrap_or(Decimal::ZERO),
        Err(err) => {
            tracing::warn!(error = %err, "voucher dropped from quote");
            Decimal::ZERO
        }
    };

    assemble(subtotal, distance_km, discount_applied, credit_balance)
}

/// Loyalty accrual for a completed booking: floor of 10 points per RM of
/// service subtotal. Fees never earn points.
pub fn loyalty_points(subtotal: Decimal) -> i64 {
    (subtotal * Decimal::from(POINTS_PER_RM))
        .floor()
        .to_i64()
        .unwrap_or(0)
        .max(0)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{commission_split, loyalty_points, price_quote, travel_fee};
    use crate::error::AppError;
    use crate::models::pricing::{Voucher, VoucherKind};

    fn rm(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    fn percentage_voucher(value: i64, min_spend_cents: i64) -> Voucher {
        Voucher {
            id: Uuid::from_u128(7),
            kind: VoucherKind::Percentage,
            value: Decimal::from(value),
            min_spend: rm(min_spend_cents),
            max_discount: None,
            consumed: false,
        }
    }

    #[test]
    fn travel_fee_is_flat_inside_base_distance() {
        assert_eq!(travel_fee(0.0), rm(500));
        assert_eq!(travel_fee(2.5), rm(500));
        assert_eq!(travel_fee(4.0), rm(500));
    }

    #[test]
    fn travel_fee_is_continuous_at_the_boundary() {
        assert_eq!(travel_fee(4.0), rm(500));
        assert_eq!(travel_fee(4.01), rm(501));
        assert_eq!(travel_fee(10.0), rm(1100));
    }

    #[test]
    fn travel_fee_is_monotonic() {
        let distances = [0.0, 1.0, 3.9, 4.0, 4.1, 7.3, 12.0, 25.0];
        for pair in distances.windows(2) {
            assert!(travel_fee(pair[0]) <= travel_fee(pair[1]));
        }
    }

    #[test]
    fn commission_and_earning_always_sum_to_subtotal() {
        for cents in [1, 99, 1000, 9_999, 12_345, 100_000] {
            let subtotal = rm(cents);
            let split = commission_split(subtotal, super::commission_rate());
            assert_eq!(split.commission + split.provider_earning, subtotal);
        }
    }

    #[test]
    fn commission_rounds_half_up() {
        // 99.99 * 0.12 = 11.9988 -> 12.00, earning is the remainder.
        let split = commission_split(rm(9_999), super::commission_rate());
        assert_eq!(split.commission, rm(1_200));
        assert_eq!(split.provider_earning, rm(8_799));
    }

    #[test]
    fn voucher_applies_before_credit_and_credit_clamps_to_zero() {
        // subtotal 100 + travel 5 + platform 2 = 107; 10% voucher takes 10;
        // 97 remain; a 200 credit balance clamps to 97 and the total is 0.
        let breakdown = price_quote(
            rm(10_000),
            2.0,
            Some(&percentage_voucher(10, 0)),
            rm(20_000),
        )
        .unwrap();

        assert_eq!(breakdown.travel_fee, rm(500));
        assert_eq!(breakdown.platform_fee, rm(200));
        assert_eq!(breakdown.discount_applied, rm(1_000));
        assert_eq!(breakdown.credit_applied, rm(9_700));
        assert_eq!(breakdown.total, Decimal::ZERO);
    }

    #[test]
    fn breakdown_identity_holds() {
        let breakdown = price_quote(
            rm(8_050),
            6.4,
            Some(&percentage_voucher(10, 0)),
            rm(1_500),
        )
        .unwrap();

        assert_eq!(
            breakdown.total,
            breakdown.subtotal + breakdown.travel_fee + breakdown.platform_fee
                - breakdown.discount_applied
                - breakdown.credit_applied
        );
        assert_eq!(
            breakdown.commission + breakdown.provider_earning,
            breakdown.subtotal
        );
    }

    #[test]
    fn quote_is_idempotent() {
        let voucher = percentage_voucher(15, 5_000);
        let a = price_quote(rm(7_500), 5.5, Some(&voucher), rm(2_000)).unwrap();
        let b = price_quote(rm(7_500), 5.5, Some(&voucher), rm(2_000)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn voucher_below_minimum_spend_is_rejected() {
        let result = price_quote(rm(10_000), 2.0, Some(&percentage_voucher(10, 15_000)), rm(0));
        assert!(matches!(result, Err(AppError::DiscountIneligible(_))));
    }

    #[test]
    fn consumed_voucher_is_rejected() {
        let mut voucher = percentage_voucher(10, 0);
        voucher.consumed = true;
        let result = price_quote(rm(10_000), 2.0, Some(&voucher), rm(0));
        assert!(matches!(result, Err(AppError::DiscountIneligible(_))));
    }

    #[test]
    fn percentage_discount_respects_max_cap() {
        let mut voucher = percentage_voucher(50, 0);
        voucher.max_discount = Some(rm(2_000));
        let breakdown = price_quote(rm(10_000), 1.0, Some(&voucher), rm(0)).unwrap();
        assert_eq!(breakdown.discount_applied, rm(2_000));
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let voucher = Voucher {
            id: Uuid::from_u128(8),
            kind: VoucherKind::Fixed,
            value: rm(5_000),
            min_spend: Decimal::ZERO,
            max_discount: None,
            consumed: false,
        };
        let breakdown = price_quote(rm(3_000), 0.5, Some(&voucher), rm(0)).unwrap();
        assert_eq!(breakdown.discount_applied, rm(3_000));
        // travel 5 + platform 2 remain payable.
        assert_eq!(breakdown.total, rm(700));
    }

    #[test]
    fn ineligible_voucher_is_dropped_at_booking_time() {
        let voucher = percentage_voucher(10, 15_000);
        let breakdown = super::price_or_drop_voucher(rm(10_000), 2.0, Some(&voucher), rm(0));
        assert_eq!(breakdown.discount_applied, Decimal::ZERO);
        assert_eq!(breakdown.total, rm(10_700));
    }

    #[test]
    fn points_accrue_per_rm_of_subtotal_only() {
        assert_eq!(loyalty_points(rm(10_000)), 1_000);
        assert_eq!(loyalty_points(rm(4_550)), 455);
        assert_eq!(loyalty_points(rm(99)), 9);
        assert_eq!(loyalty_points(Decimal::ZERO), 0);
    }
}
