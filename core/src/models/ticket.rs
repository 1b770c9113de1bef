// core/src/models/ticket.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A ticket tier of an event ("VIP", "Regular", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
  pub id: Uuid,
  pub event_id: Uuid,
  #[serde(rename = "type")]
  pub kind: String,
  pub unit_price: i64,
  /// Total units that may ever be sold; `None` means unlimited.
  pub quantity_limit: Option<i32>,
}
