// core/src/models/purchase.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One redeemable ticket unit. Buying N tickets creates N purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
  pub id: Uuid,
  pub ticket_id: Uuid,
  pub user_id: Uuid,
  pub payment_id: Uuid,
  pub total: i64,
  pub is_used: bool,
}
