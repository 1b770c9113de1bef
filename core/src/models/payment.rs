// core/src/models/payment.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One successful gateway callback. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
  pub id: Uuid,
  pub amount: i64,
  pub method: String,
  pub status: String,
  /// The invoice external id (`INV-<unix_ts>-<token>`); unique per payment.
  pub transaction_id: String,
  pub user_id: Uuid,
  pub coupon_id: Option<Uuid>,
}
