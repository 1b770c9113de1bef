// core/src/models/payout.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an organizer's share of ticket sales is disbursed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
  pub user_id: Uuid,
  /// Payout channel identifier, e.g. `ID_BCA`.
  pub channel_code: String,
  pub account_number: String,
  pub account_holder_name: String,
}
