// core/src/models/coupon.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
  pub id: Uuid,
  pub name: String,
  pub code: Option<String>,
  /// 0..=100
  pub discount_percent: i32,
  /// Maximum number of users that may claim this coupon.
  pub usage_limit: i32,
  pub valid_at: DateTime<Utc>,
  pub expired_at: DateTime<Utc>,
}

impl Coupon {
  /// Usable inside `[valid_at, expired_at)`.
  pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.valid_at && now < self.expired_at
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    now >= self.expired_at
  }
}

/// A user's claim on a coupon, keyed by `(user_id, coupon_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCoupon {
  pub user_id: Uuid,
  pub coupon_id: Uuid,
  pub is_used: bool,
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, TimeZone};

  fn window() -> Coupon {
    Coupon {
      id: Uuid::new_v4(),
      name: "Launch".to_string(),
      code: Some("LAUNCH".to_string()),
      discount_percent: 10,
      usage_limit: 5,
      valid_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
      expired_at: Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap(),
    }
  }

  #[test]
  fn active_from_the_first_instant_of_the_window() {
    let coupon = window();
    assert!(!coupon.is_active_at(coupon.valid_at - Duration::milliseconds(1)));
    assert!(coupon.is_active_at(coupon.valid_at));
    assert!(!coupon.is_expired_at(coupon.valid_at));
  }

  #[test]
  fn expiry_instant_is_already_expired() {
    let coupon = window();
    let last_moment = coupon.expired_at - Duration::milliseconds(1);
    assert!(coupon.is_active_at(last_moment));
    assert!(!coupon.is_expired_at(last_moment));

    assert!(!coupon.is_active_at(coupon.expired_at));
    assert!(coupon.is_expired_at(coupon.expired_at));
  }

  #[test]
  fn not_yet_valid_is_not_expired() {
    let coupon = window();
    let before = coupon.valid_at - Duration::days(1);
    assert!(!coupon.is_active_at(before));
    assert!(!coupon.is_expired_at(before));
  }
}
