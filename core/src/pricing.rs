// core/src/pricing.rs

//! Amount computation for a payment intent.
//!
//! Order is fixed: gross, then coupon discount (integer truncation), then the
//! admin fee on the discounted subtotal (floor). All arithmetic is checked.

use crate::error::{BoxofficeError, BoxofficeResult};
use serde::Serialize;

const BPS_DENOMINATOR: i64 = 10_000;

/// Platform-wide admin fee, in basis points of the discounted subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
  pub admin_fee_bps: u32,
}

impl FeePolicy {
  pub const fn from_bps(admin_fee_bps: u32) -> Self {
    Self { admin_fee_bps }
  }

  pub fn admin_fee(&self, subtotal: i64) -> BoxofficeResult<i64> {
    subtotal
      .checked_mul(i64::from(self.admin_fee_bps))
      .map(|scaled| scaled / BPS_DENOMINATOR)
      .ok_or_else(overflow)
  }
}

impl Default for FeePolicy {
  /// 1.5%
  fn default() -> Self {
    Self::from_bps(150)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
  pub unit_price: i64,
  pub quantity: u32,
  pub gross: i64,
  pub discount: i64,
  pub subtotal: i64,
  pub admin_fee: i64,
  pub total: i64,
}

impl PriceBreakdown {
  /// Per-unit price reported on the invoice line item (truncated).
  pub fn line_unit_price(&self) -> i64 {
    self.subtotal / i64::from(self.quantity.max(1))
  }
}

/// Largest number of ticket units a single invoice may carry.
pub const MAX_UNITS_PER_PAYMENT: u32 = 100;

pub fn quote(
  unit_price: i64,
  quantity: u32,
  discount_percent: Option<i32>,
  fees: &FeePolicy,
) -> BoxofficeResult<PriceBreakdown> {
  if quantity == 0 {
    return Err(BoxofficeError::MalformedInput("quantity must be at least 1".to_string()));
  }
  if quantity > MAX_UNITS_PER_PAYMENT {
    return Err(BoxofficeError::MalformedInput(format!(
      "quantity {} exceeds the limit of {} per payment",
      quantity, MAX_UNITS_PER_PAYMENT
    )));
  }
  if unit_price < 0 {
    return Err(BoxofficeError::InvalidState(format!("ticket has a negative price ({})", unit_price)));
  }

  let gross = unit_price.checked_mul(i64::from(quantity)).ok_or_else(overflow)?;

  let subtotal = match discount_percent {
    Some(percent) => {
      if !(0..=100).contains(&percent) {
        return Err(BoxofficeError::InvalidState(format!(
          "coupon discount {}% is outside 0..=100",
          percent
        )));
      }
      gross
        .checked_mul(i64::from(100 - percent))
        .map(|scaled| scaled / 100)
        .ok_or_else(overflow)?
    }
    None => gross,
  };

  let admin_fee = fees.admin_fee(subtotal)?;
  let total = subtotal.checked_add(admin_fee).ok_or_else(overflow)?;

  Ok(PriceBreakdown {
    unit_price,
    quantity,
    gross,
    discount: gross - subtotal,
    subtotal,
    admin_fee,
    total,
  })
}

fn overflow() -> BoxofficeError {
  BoxofficeError::MalformedInput("order amount overflows".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn discount_is_applied_before_the_admin_fee() {
    let quote = quote(10_000, 3, Some(10), &FeePolicy::default()).unwrap();
    assert_eq!(quote.gross, 30_000);
    assert_eq!(quote.subtotal, 27_000);
    assert_eq!(quote.discount, 3_000);
    assert_eq!(quote.admin_fee, 405);
    assert_eq!(quote.total, 27_405);
    assert_eq!(quote.line_unit_price(), 9_000);
  }

  #[test]
  fn no_coupon_means_no_discount() {
    let quote = quote(25_000, 2, None, &FeePolicy::default()).unwrap();
    assert_eq!(quote.subtotal, 50_000);
    assert_eq!(quote.discount, 0);
    assert_eq!(quote.admin_fee, 750);
    assert_eq!(quote.total, 50_750);
  }

  #[test]
  fn fractional_amounts_truncate() {
    // 999 * 3 = 2997; 33% off -> 2997 * 67 / 100 = 2007.99 -> 2007
    let quote = quote(999, 3, Some(33), &FeePolicy::default()).unwrap();
    assert_eq!(quote.subtotal, 2_007);
    // 2007 * 1.5% = 30.105 -> 30
    assert_eq!(quote.admin_fee, 30);
    assert_eq!(quote.line_unit_price(), 669);
  }

  #[test]
  fn full_discount_is_free() {
    let quote = quote(10_000, 1, Some(100), &FeePolicy::default()).unwrap();
    assert_eq!(quote.subtotal, 0);
    assert_eq!(quote.total, 0);
  }

  #[test]
  fn rejects_zero_quantity_and_bad_discount() {
    assert!(matches!(
      quote(10_000, 0, None, &FeePolicy::default()),
      Err(BoxofficeError::MalformedInput(_))
    ));
    assert!(matches!(
      quote(10_000, 1, Some(120), &FeePolicy::default()),
      Err(BoxofficeError::InvalidState(_))
    ));
  }

  #[test]
  fn quantity_above_the_unit_cap_is_rejected() {
    assert!(quote(10_000, MAX_UNITS_PER_PAYMENT, None, &FeePolicy::default()).is_ok());
    assert!(matches!(
      quote(10_000, MAX_UNITS_PER_PAYMENT + 1, None, &FeePolicy::default()),
      Err(BoxofficeError::MalformedInput(_))
    ));
  }

  #[test]
  fn overflow_is_an_error_not_a_wrap() {
    assert!(quote(i64::MAX, 2, None, &FeePolicy::default()).is_err());
  }
}
