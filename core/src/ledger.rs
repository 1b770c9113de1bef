// core/src/ledger.rs

//! The relational-store collaborator the pipelines read from and write to.
//!
//! Lookups return `Ok(None)` for missing rows; the flows decide whether absence is
//! an error. The three mutating operations are atomic units of work on the
//! implementor's side:
//!
//! * [`Ledger::fulfill`] records a payment, its purchases and the coupon
//!   consumption together, or nothing at all. It is the idempotency guard for
//!   replayed callbacks, keyed on `Payment::transaction_id`.
//! * [`Ledger::redeem_purchase`] is a compare-and-set on `is_used`.
//! * [`Ledger::claim_coupon`] counts and inserts claims under a lock on the coupon.

use crate::models::{Coupon, Event, Payment, PayoutAccount, Purchase, Ticket, User, UserCoupon};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("storage failure: {0}")]
  Storage(#[from] anyhow::Error),

  #[error("transaction {0} has already been recorded")]
  DuplicateTransaction(String),

  #[error("coupon usage limit reached")]
  CouponLimitReached,

  #[error("coupon already claimed by this user")]
  CouponAlreadyClaimed,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Everything one paid callback writes.
#[derive(Debug, Clone)]
pub struct FulfillmentOrder {
  pub payment: Payment,
  pub purchases: Vec<Purchase>,
  /// `(user_id, coupon_id)` of the claim to mark used.
  pub coupon_claim: Option<(Uuid, Uuid)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentReceipt {
  Recorded {
    payment: Payment,
    purchases: Vec<Purchase>,
    /// False when the claim was missing or already used at commit time.
    coupon_consumed: bool,
  },
  /// A payment with the same transaction id already exists; nothing was written.
  Replayed { payment: Payment },
}

#[async_trait]
pub trait Ledger: Send + Sync {
  async fn find_user(&self, user_id: Uuid) -> LedgerResult<Option<User>>;

  async fn find_user_by_email(&self, email: &str) -> LedgerResult<Option<User>>;

  async fn find_ticket(&self, ticket_id: Uuid) -> LedgerResult<Option<Ticket>>;

  async fn find_event(&self, event_id: Uuid) -> LedgerResult<Option<Event>>;

  /// Names of the categories the event is filed under, in a stable order.
  async fn event_category_names(&self, event_id: Uuid) -> LedgerResult<Vec<String>>;

  async fn find_coupon(&self, coupon_id: Uuid) -> LedgerResult<Option<Coupon>>;

  async fn find_coupon_by_code(&self, code: &str) -> LedgerResult<Option<Coupon>>;

  async fn find_user_coupon(&self, user_id: Uuid, coupon_id: Uuid) -> LedgerResult<Option<UserCoupon>>;

  /// Inserts an unused claim. Fails with `CouponLimitReached` when the coupon
  /// already has `usage_limit` claims and `CouponAlreadyClaimed` when this user
  /// holds one.
  async fn claim_coupon(&self, user_id: Uuid, coupon: &Coupon) -> LedgerResult<UserCoupon>;

  /// Purchase units already sold for a ticket tier.
  async fn count_ticket_purchases(&self, ticket_id: Uuid) -> LedgerResult<i64>;

  async fn find_payment_by_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Payment>>;

  async fn fulfill(&self, order: FulfillmentOrder) -> LedgerResult<FulfillmentReceipt>;

  async fn find_purchase(&self, purchase_id: Uuid) -> LedgerResult<Option<Purchase>>;

  /// Flips `is_used` to true. Returns false if the purchase was already used
  /// (or does not exist); exactly one concurrent caller can observe true.
  async fn redeem_purchase(&self, purchase_id: Uuid) -> LedgerResult<bool>;

  async fn payout_account(&self, organizer_id: Uuid) -> LedgerResult<Option<PayoutAccount>>;
}
