// core/src/models/event.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub id: Uuid,
  pub title: String,
  /// The organizer: the only user allowed to redeem this event's tickets.
  pub organizer_id: Uuid,
}
