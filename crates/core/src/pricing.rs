//! Order pricing.
//!
//! Pricing is a pure function of the priced lines and an optional coupon
//! code. Engines carry only an immutable [`PricingPolicy`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::EnrichedItem;
use crate::domain::product::ProductId;

pub const BASE_DELIVERY_FEE_RULE: &str = "BASE_DELIVERY_FEE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingLineInput {
    pub product_id: Option<ProductId>,
    pub unit_price: Decimal,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub applied_rules: Vec<String>,
    pub lines: Vec<PricedLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRule {
    pub code: String,
    pub rate: Decimal,
    pub rule_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub delivery_fee: Decimal,
    pub coupons: Vec<CouponRule>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            delivery_fee: Decimal::new(4000, 2),
            coupons: vec![CouponRule {
                code: "TACO10".to_string(),
                rate: Decimal::new(10, 2),
                rule_name: "COUPON_TACO10_10_PERCENT".to_string(),
            }],
        }
    }
}

impl PricingPolicy {
    pub fn with_delivery_fee(mut self, delivery_fee: Decimal) -> Self {
        self.delivery_fee = delivery_fee;
        self
    }

    fn matching_coupons<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a CouponRule> {
        self.coupons.iter().filter(move |rule| rule.code.eq_ignore_ascii_case(code))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("at least one line item is required")]
    NoLines,
    #[error("line {index} is invalid: {reason}")]
    InvalidLine { index: usize, reason: String },
    #[error("{0} is too large to price")]
    Overflow(&'static str),
}

pub trait PricingEngine: Send + Sync {
    fn calculate(
        &self,
        lines: &[PricingLineInput],
        coupon_code: Option<&str>,
    ) -> Result<PriceBreakdown, PricingError>;
}

#[derive(Clone, Debug, Default)]
pub struct FlatFeePricingEngine {
    policy: PricingPolicy,
}

impl FlatFeePricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }
}

impl PricingEngine for FlatFeePricingEngine {
    fn calculate(
        &self,
        lines: &[PricingLineInput],
        coupon_code: Option<&str>,
    ) -> Result<PriceBreakdown, PricingError> {
        calculate(&self.policy, lines, coupon_code)
    }
}

impl From<&EnrichedItem> for PricingLineInput {
    fn from(item: &EnrichedItem) -> Self {
        Self { product_id: Some(item.product_id), unit_price: item.unit_price, quantity: item.quantity }
    }
}

pub fn calculate(
    policy: &PricingPolicy,
    lines: &[PricingLineInput],
    coupon_code: Option<&str>,
) -> Result<PriceBreakdown, PricingError> {
    if lines.is_empty() {
        return Err(PricingError::NoLines);
    }

    let priced = lines
        .iter()
        .enumerate()
        .map(|(index, line)| price_line(index, line))
        .collect::<Result<Vec<_>, _>>()?;

    let subtotal = priced
        .iter()
        .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.line_total))
        .ok_or(PricingError::Overflow("subtotal"))?;
    let delivery_fee = policy.delivery_fee;
    let mut applied_rules = vec![BASE_DELIVERY_FEE_RULE.to_string()];

    let mut discount = Decimal::ZERO;
    if let Some(code) = coupon_code.map(str::trim).filter(|code| !code.is_empty()) {
        for rule in policy.matching_coupons(code) {
            let coupon_discount =
                subtotal.checked_mul(rule.rate).ok_or(PricingError::Overflow("discount"))?;
            discount = discount
                .checked_add(round_money(coupon_discount))
                .ok_or(PricingError::Overflow("discount"))?;
            applied_rules.push(rule.rule_name.clone());
        }
    }
    // Stacked coupons never push the order below free.
    let discount = discount.min(subtotal);

    let total = subtotal
        .checked_add(delivery_fee)
        .and_then(|gross| gross.checked_sub(discount))
        .ok_or(PricingError::Overflow("total"))?;

    Ok(PriceBreakdown {
        subtotal,
        delivery_fee,
        discount,
        total,
        applied_rules,
        lines: priced,
    })
}

fn price_line(index: usize, line: &PricingLineInput) -> Result<PricedLine, PricingError> {
    if line.quantity == 0 {
        return Err(PricingError::InvalidLine {
            index,
            reason: "quantity must be greater than zero".to_string(),
        });
    }
    if line.unit_price.is_sign_negative() {
        return Err(PricingError::InvalidLine {
            index,
            reason: format!("unit price {} is negative", line.unit_price),
        });
    }

    let line_total =
        line.unit_price.checked_mul(Decimal::from(line.quantity)).ok_or_else(|| {
            PricingError::InvalidLine {
                index,
                reason: format!("line total for unit price {} is too large", line.unit_price),
            }
        })?;

    Ok(PricedLine {
        product_id: line.product_id,
        quantity: line.quantity,
        unit_price: line.unit_price,
        line_total,
    })
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        calculate, CouponRule, FlatFeePricingEngine, PricingEngine, PricingError,
        PricingLineInput, PricingPolicy, BASE_DELIVERY_FEE_RULE,
    };
    use crate::domain::product::ProductId;

    fn line(product_id: i64, cents: i64, quantity: u32) -> PricingLineInput {
        PricingLineInput {
            product_id: Some(ProductId(product_id)),
            unit_price: Decimal::new(cents, 2),
            quantity,
        }
    }

    fn reference_lines() -> Vec<PricingLineInput> {
        vec![line(1, 2000, 2), line(3, 1800, 1)]
    }

    #[test]
    fn prices_reference_order_without_coupon() {
        let result = calculate(&PricingPolicy::default(), &reference_lines(), None).expect("price");

        assert_eq!(result.subtotal, Decimal::new(5800, 2));
        assert_eq!(result.delivery_fee, Decimal::new(4000, 2));
        assert_eq!(result.discount, Decimal::ZERO);
        assert_eq!(result.total, Decimal::new(9800, 2));
        assert_eq!(result.applied_rules, vec![BASE_DELIVERY_FEE_RULE.to_string()]);
    }

    #[test]
    fn taco10_applies_ten_percent_in_any_case() {
        for code in ["TACO10", "taco10", "Taco10", " taco10 "] {
            let result =
                calculate(&PricingPolicy::default(), &reference_lines(), Some(code)).expect("price");

            assert_eq!(result.discount, Decimal::new(580, 2), "code {code:?}");
            assert_eq!(result.total, Decimal::new(9220, 2), "code {code:?}");
            assert_eq!(
                result.applied_rules,
                vec![BASE_DELIVERY_FEE_RULE.to_string(), "COUPON_TACO10_10_PERCENT".to_string()]
            );
        }
    }

    #[test]
    fn unknown_coupon_is_ignored() {
        let result =
            calculate(&PricingPolicy::default(), &reference_lines(), Some("FREEFOOD")).expect("price");

        assert_eq!(result.discount, Decimal::ZERO);
        assert_eq!(result.total, Decimal::new(9800, 2));
        assert_eq!(result.applied_rules.len(), 1);
    }

    #[test]
    fn total_identity_holds_across_line_sets() {
        let policy = PricingPolicy::default();
        let cases = [
            vec![line(1, 1, 1)],
            vec![line(1, 2205, 3), line(2, 999, 7)],
            vec![line(1, 0, 4)],
            vec![line(1, 12345, 9), line(2, 5, 1), line(3, 1999, 12)],
        ];

        for lines in &cases {
            for coupon in [None, Some("TACO10")] {
                let result = calculate(&policy, lines, coupon).expect("price");
                assert_eq!(result.total, result.subtotal + result.delivery_fee - result.discount);
                let line_sum: Decimal = result.lines.iter().map(|l| l.line_total).sum();
                assert_eq!(line_sum, result.subtotal);
                assert!(result.discount.scale() <= 2);
            }
        }
    }

    #[test]
    fn discount_rounds_to_cents() {
        let result =
            calculate(&PricingPolicy::default(), &[line(1, 2205, 1)], Some("TACO10")).expect("price");

        assert_eq!(result.discount, Decimal::new(221, 2));
        assert_eq!(result.total, Decimal::new(5984, 2));
    }

    #[test]
    fn empty_lines_fail_validation() {
        let error = calculate(&PricingPolicy::default(), &[], None).expect_err("empty");
        assert_eq!(error, PricingError::NoLines);
    }

    #[test]
    fn zero_quantity_and_negative_price_are_rejected() {
        let zero = calculate(&PricingPolicy::default(), &[line(1, 2000, 0)], None);
        assert!(matches!(zero, Err(PricingError::InvalidLine { index: 0, .. })));

        let negative =
            calculate(&PricingPolicy::default(), &[line(1, 2000, 1), line(2, -1, 1)], None);
        assert!(matches!(negative, Err(PricingError::InvalidLine { index: 1, .. })));
    }

    #[test]
    fn oversized_amounts_fail_instead_of_overflowing() {
        let huge = Decimal::from_str_exact("50000000000000000000000000000").expect("decimal");
        let policy = PricingPolicy::default();

        let line_overflow = calculate(
            &policy,
            &[PricingLineInput { product_id: None, unit_price: huge, quantity: 2 }],
            None,
        );
        assert!(matches!(line_overflow, Err(PricingError::InvalidLine { index: 0, .. })));

        let single = PricingLineInput { product_id: None, unit_price: huge, quantity: 1 };
        let sum_overflow = calculate(&policy, &[single.clone(), single.clone()], None);
        assert_eq!(sum_overflow, Err(PricingError::Overflow("subtotal")));

        let fee_overflow = calculate(&policy.clone().with_delivery_fee(huge), &[single], None);
        assert_eq!(fee_overflow, Err(PricingError::Overflow("total")));
    }

    #[test]
    fn engine_is_idempotent() {
        let engine = FlatFeePricingEngine::default();
        let first = engine.calculate(&reference_lines(), Some("TACO10")).expect("first");
        let second = engine.calculate(&reference_lines(), Some("TACO10")).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn custom_policy_changes_fee_and_coupons() {
        let policy = PricingPolicy {
            delivery_fee: Decimal::new(2500, 2),
            coupons: vec![CouponRule {
                code: "HALF".to_string(),
                rate: Decimal::new(50, 2),
                rule_name: "COUPON_HALF_50_PERCENT".to_string(),
            }],
        };
        let engine = FlatFeePricingEngine::new(policy);

        let result = engine.calculate(&reference_lines(), Some("half")).expect("price");
        assert_eq!(result.discount, Decimal::new(2900, 2));
        assert_eq!(result.total, Decimal::new(5400, 2));

        let ignored = engine.calculate(&reference_lines(), Some("TACO10")).expect("price");
        assert_eq!(ignored.discount, Decimal::ZERO);
    }
}
