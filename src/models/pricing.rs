use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VoucherKind {
    Fixed,
    Percentage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Uuid,
    pub kind: VoucherKind,
    /// Fixed: RM amount. Percentage: percent of the service subtotal.
    pub value: Decimal,
    pub min_spend: Decimal,
    pub max_discount: Option<Decimal>,
    pub consumed: bool,
}

/// The authoritative price of a job. Frozen once the booking is confirmed;
/// a re-quote before confirmation replaces the whole breakdown.
///
/// Invariants: `total = subtotal + travel_fee + platform_fee -
/// discount_applied - credit_applied` and `commission + provider_earning =
/// subtotal`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub travel_fee: Decimal,
    pub platform_fee: Decimal,
    pub commission: Decimal,
    pub provider_earning: Decimal,
    pub discount_applied: Decimal,
    pub credit_applied: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub commission: Decimal,
    pub provider_earning: Decimal,
}
