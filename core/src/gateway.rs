// core/src/gateway.rs

//! Outbound payment-provider seams and the typed inbound callback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("request timed out")]
  Timeout,

  #[error("provider rejected the request with status {status}: {body}")]
  Rejected { status: u16, body: String },

  #[error("transport failure: {0}")]
  Transport(String),

  #[error("unexpected provider response: {0}")]
  UnexpectedResponse(String),
}

// --- Invoices ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payer {
  pub given_names: String,
  pub email: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mobile_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
  pub name: String,
  pub quantity: u32,
  #[serde(deserialize_with = "whole_amount")]
  pub price: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
}

impl InvoiceItem {
  pub fn line_total(&self) -> i64 {
    self.price.saturating_mul(i64::from(self.quantity))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFee {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(deserialize_with = "whole_amount")]
  pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRequest {
  pub external_id: String,
  pub amount: i64,
  pub currency: String,
  pub description: String,
  #[serde(rename = "customer")]
  pub payer: Payer,
  pub payer_email: String,
  pub items: Vec<InvoiceItem>,
  pub fees: Vec<InvoiceFee>,
  pub invoice_duration: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub success_redirect_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure_redirect_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Invoice {
  pub id: String,
  pub external_id: String,
  pub invoice_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError>;
}

// --- Payouts ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutRequest {
  /// Sent as a header; fresh per attempt.
  #[serde(skip)]
  pub idempotency_key: String,
  /// Deterministic per payment, so redelivery cannot pay twice.
  pub reference_id: String,
  pub channel_code: String,
  pub channel_properties: ChannelProperties,
  pub amount: i64,
  pub currency: String,
  pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelProperties {
  pub account_number: String,
  pub account_holder_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayoutReceipt {
  pub id: String,
  pub reference_id: String,
  pub status: String,
  pub channel_code: String,
}

#[async_trait]
pub trait PayoutChannel: Send + Sync {
  async fn create_payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, GatewayError>;
}

// --- Callback ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
  Pending,
  Paid,
  Settled,
  Expired,
  #[serde(other)]
  Unknown,
}

/// Invoice callback body, decoded once at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceCallback {
  pub id: String,
  pub external_id: String,
  pub status: InvoiceStatus,
  #[serde(deserialize_with = "whole_amount")]
  pub amount: i64,
  #[serde(default)]
  pub payer_email: Option<String>,
  #[serde(default)]
  pub payment_method: Option<String>,
  #[serde(default)]
  pub payment_channel: Option<String>,
  #[serde(default)]
  pub currency: Option<String>,
  #[serde(default)]
  pub paid_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub items: Vec<InvoiceItem>,
  #[serde(default)]
  pub fees: Vec<InvoiceFee>,
}

impl InvoiceCallback {
  pub fn is_paid(&self) -> bool {
    matches!(self.status, InvoiceStatus::Paid | InvoiceStatus::Settled)
  }

  /// Sum of the fee lines; `None` when a fee is negative or the sum overflows.
  pub fn total_fees(&self) -> Option<i64> {
    self.fees.iter().try_fold(0i64, |total, fee| {
      if fee.value < 0 {
        return None;
      }
      total.checked_add(fee.value)
    })
  }

  /// Sum of `price * quantity` over the items; `None` on a negative price or overflow.
  pub fn total_line_items(&self) -> Option<i64> {
    self.items.iter().try_fold(0i64, |total, item| {
      if item.price < 0 {
        return None;
      }
      total.checked_add(item.price.checked_mul(i64::from(item.quantity))?)
    })
  }

  /// Most specific description of how the buyer paid.
  pub fn method(&self) -> String {
    self
      .payment_channel
      .clone()
      .or_else(|| self.payment_method.clone())
      .unwrap_or_else(|| "UNKNOWN".to_string())
  }
}

/// Providers send amounts as JSON numbers that may carry a `.0`.
fn whole_amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
  D: Deserializer<'de>,
{
  let value = serde_json::Number::deserialize(deserializer)?;
  if let Some(whole) = value.as_i64() {
    return Ok(whole);
  }
  match value.as_f64() {
    Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => Ok(float as i64),
    _ => Err(serde::de::Error::custom(format!("amount {} is not a whole number", value))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn decodes_a_paid_callback() {
    let payload = json!({
      "id": "inv_123",
      "external_id": "INV-1700000000-abc",
      "user_id": "merchant",
      "status": "PAID",
      "amount": 27405.0,
      "payer_email": "buyer@example.com",
      "payment_method": "BANK_TRANSFER",
      "payment_channel": "BCA",
      "currency": "IDR",
      "paid_at": "2024-05-01T10:00:00.000Z",
      "items": [{ "name": "Gig - VIP", "quantity": 3, "price": 9000, "category": "music" }],
      "fees": [{ "type": "ADMIN", "value": 405 }]
    });

    let callback: InvoiceCallback = serde_json::from_value(payload).unwrap();
    assert!(callback.is_paid());
    assert_eq!(callback.amount, 27_405);
    assert_eq!(callback.items[0].line_total(), 27_000);
    assert_eq!(callback.total_fees(), Some(405));
    assert_eq!(callback.total_line_items(), Some(27_000));
    assert_eq!(callback.method(), "BCA");
  }

  #[test]
  fn unknown_statuses_are_not_paid() {
    let payload = json!({
      "id": "inv_123",
      "external_id": "INV-1-abc",
      "status": "SOMETHING_NEW",
      "amount": 1
    });
    let callback: InvoiceCallback = serde_json::from_value(payload).unwrap();
    assert_eq!(callback.status, InvoiceStatus::Unknown);
    assert!(!callback.is_paid());
  }

  #[test]
  fn negative_or_overflowing_fees_have_no_total() {
    let negative = json!({
      "id": "x", "external_id": "y", "status": "PAID", "amount": 10,
      "fees": [{ "type": "ADMIN", "value": 150 }, { "type": "REBATE", "value": -1000000 }]
    });
    let callback: InvoiceCallback = serde_json::from_value(negative).unwrap();
    assert_eq!(callback.total_fees(), None);

    let overflowing = json!({
      "id": "x", "external_id": "y", "status": "PAID", "amount": 10,
      "fees": [{ "type": "A", "value": i64::MAX }, { "type": "B", "value": i64::MAX }]
    });
    let callback: InvoiceCallback = serde_json::from_value(overflowing).unwrap();
    assert_eq!(callback.total_fees(), None);
  }

  #[test]
  fn overflowing_line_items_have_no_total() {
    let payload = json!({
      "id": "x", "external_id": "y", "status": "PAID", "amount": 10,
      "items": [{ "name": "Gig", "quantity": 4, "price": i64::MAX / 2 }]
    });
    let callback: InvoiceCallback = serde_json::from_value(payload).unwrap();
    assert_eq!(callback.total_line_items(), None);
  }

  #[test]
  fn fractional_amounts_are_rejected() {
    let payload = json!({ "id": "x", "external_id": "y", "status": "PAID", "amount": 10.5 });
    assert!(serde_json::from_value::<InvoiceCallback>(payload).is_err());
  }

  #[test]
  fn missing_status_is_rejected() {
    let payload = json!({ "id": "x", "external_id": "y", "amount": 10 });
    assert!(serde_json::from_value::<InvoiceCallback>(payload).is_err());
  }
}
