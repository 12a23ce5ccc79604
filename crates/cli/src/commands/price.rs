use std::str::FromStr;

use rust_decimal::Decimal;
use tacoexpress_core::pricing::{FlatFeePricingEngine, PricingEngine, PricingLineInput, PricingPolicy};

use crate::commands::CommandResult;

/// Prices `UNIT_PRICExQTY` lines offline. Uses the default pricing policy
/// unless a delivery fee override is given, so no config or secret is needed.
pub fn run(items: &[String], coupon: Option<&str>, delivery_fee: Option<&str>) -> CommandResult {
    let lines = match items.iter().map(|item| parse_item(item)).collect::<Result<Vec<_>, _>>() {
        Ok(lines) => lines,
        Err(message) => return CommandResult::failure("price", "invalid_input", message, 6),
    };

    let mut policy = PricingPolicy::default();
    if let Some(raw_fee) = delivery_fee {
        match Decimal::from_str(raw_fee.trim()) {
            Ok(fee) if !fee.is_sign_negative() => policy = policy.with_delivery_fee(fee),
            _ => {
                return CommandResult::failure(
                    "price",
                    "invalid_input",
                    format!("delivery fee `{raw_fee}` must be a non-negative decimal"),
                    6,
                );
            }
        }
    }

    match FlatFeePricingEngine::new(policy).calculate(&lines, coupon) {
        Ok(breakdown) => CommandResult::success(
            "price",
            format!(
                "subtotal={} delivery_fee={} discount={} total={} applied_rules={}",
                breakdown.subtotal,
                breakdown.delivery_fee,
                breakdown.discount,
                breakdown.total,
                breakdown.applied_rules.join(",")
            ),
        ),
        Err(error) => CommandResult::failure("price", "invalid_input", error.to_string(), 6),
    }
}

fn parse_item(raw: &str) -> Result<PricingLineInput, String> {
    let (price, quantity) = raw
        .trim()
        .rsplit_once(['x', 'X'])
        .ok_or_else(|| format!("item `{raw}` must look like UNIT_PRICExQTY, e.g. 20.00x2"))?;

    let unit_price = Decimal::from_str(price.trim())
        .map_err(|error| format!("item `{raw}` has an invalid unit price: {error}"))?;
    let quantity = quantity
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("item `{raw}` has an invalid quantity: {error}"))?;

    Ok(PricingLineInput { product_id: None, unit_price, quantity })
}
