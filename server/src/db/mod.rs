// server/src/db/mod.rs

//! Postgres implementation of the `Ledger` the fulfillment flows run against.

use crate::errors::AppError;
use async_trait::async_trait;
use boxoffice::models::{Coupon, Event, Payment, PayoutAccount, Purchase, Ticket, User, UserCoupon};
use boxoffice::{FulfillmentOrder, FulfillmentReceipt, Ledger, LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

fn storage(err: sqlx::Error) -> LedgerError {
  LedgerError::Storage(err.into())
}

// --- Row types ---

#[derive(Debug, FromRow)]
struct UserRow {
  id: Uuid,
  name: String,
  email: String,
  phone_number: String,
}

impl From<UserRow> for User {
  fn from(row: UserRow) -> Self {
    User {
      id: row.id,
      name: row.name,
      email: row.email,
      phone_number: row.phone_number,
    }
  }
}

#[derive(Debug, FromRow)]
struct EventRow {
  id: Uuid,
  title: String,
  organizer_id: Uuid,
}

impl From<EventRow> for Event {
  fn from(row: EventRow) -> Self {
    Event {
      id: row.id,
      title: row.title,
      organizer_id: row.organizer_id,
    }
  }
}

#[derive(Debug, FromRow)]
struct TicketRow {
  id: Uuid,
  event_id: Uuid,
  #[sqlx(rename = "type")]
  kind: String,
  unit_price: i64,
  quantity_limit: Option<i32>,
}

impl From<TicketRow> for Ticket {
  fn from(row: TicketRow) -> Self {
    Ticket {
      id: row.id,
      event_id: row.event_id,
      kind: row.kind,
      unit_price: row.unit_price,
      quantity_limit: row.quantity_limit,
    }
  }
}

#[derive(Debug, FromRow)]
struct CouponRow {
  id: Uuid,
  name: String,
  code: Option<String>,
  discount_percent: i32,
  usage_limit: i32,
  valid_at: DateTime<Utc>,
  expired_at: DateTime<Utc>,
}

impl From<CouponRow> for Coupon {
  fn from(row: CouponRow) -> Self {
    Coupon {
      id: row.id,
      name: row.name,
      code: row.code,
      discount_percent: row.discount_percent,
      usage_limit: row.usage_limit,
      valid_at: row.valid_at,
      expired_at: row.expired_at,
    }
  }
}

#[derive(Debug, FromRow)]
struct UserCouponRow {
  user_id: Uuid,
  coupon_id: Uuid,
  is_used: bool,
}

impl From<UserCouponRow> for UserCoupon {
  fn from(row: UserCouponRow) -> Self {
    UserCoupon {
      user_id: row.user_id,
      coupon_id: row.coupon_id,
      is_used: row.is_used,
    }
  }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
  id: Uuid,
  amount: i64,
  method: String,
  status: String,
  transaction_id: String,
  user_id: Uuid,
  coupon_id: Option<Uuid>,
}

impl From<PaymentRow> for Payment {
  fn from(row: PaymentRow) -> Self {
    Payment {
      id: row.id,
      amount: row.amount,
      method: row.method,
      status: row.status,
      transaction_id: row.transaction_id,
      user_id: row.user_id,
      coupon_id: row.coupon_id,
    }
  }
}

#[derive(Debug, FromRow)]
struct PurchaseRow {
  id: Uuid,
  ticket_id: Uuid,
  user_id: Uuid,
  payment_id: Uuid,
  total: i64,
  is_used: bool,
}

impl From<PurchaseRow> for Purchase {
  fn from(row: PurchaseRow) -> Self {
    Purchase {
      id: row.id,
      ticket_id: row.ticket_id,
      user_id: row.user_id,
      payment_id: row.payment_id,
      total: row.total,
      is_used: row.is_used,
    }
  }
}

#[derive(Debug, FromRow)]
struct PayoutAccountRow {
  user_id: Uuid,
  channel_code: String,
  account_number: String,
  account_holder_name: String,
}

impl From<PayoutAccountRow> for PayoutAccount {
  fn from(row: PayoutAccountRow) -> Self {
    PayoutAccount {
      user_id: row.user_id,
      channel_code: row.channel_code,
      account_number: row.account_number,
      account_holder_name: row.account_holder_name,
    }
  }
}

const PAYMENT_COLUMNS: &str = "id, amount, method, status, transaction_id, user_id, coupon_id";
const PURCHASE_COLUMNS: &str = "id, ticket_id, user_id, payment_id, total, is_used";

// --- Ledger ---

#[derive(Clone)]
pub struct PgLedger {
  pool: PgPool,
}

impl PgLedger {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn migrate(&self) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(sqlx::Error::from)?;
    Ok(())
  }
}

#[async_trait]
impl Ledger for PgLedger {
  async fn find_user(&self, user_id: Uuid) -> LedgerResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>("SELECT id, name, email, phone_number FROM users WHERE id = $1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage)?;
    Ok(row.map(User::from))
  }

  async fn find_user_by_email(&self, email: &str) -> LedgerResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>("SELECT id, name, email, phone_number FROM users WHERE email = $1")
      .bind(email)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage)?;
    Ok(row.map(User::from))
  }

  async fn find_ticket(&self, ticket_id: Uuid) -> LedgerResult<Option<Ticket>> {
    let row = sqlx::query_as::<_, TicketRow>(
      "SELECT id, event_id, type, unit_price, quantity_limit FROM tickets WHERE id = $1",
    )
    .bind(ticket_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    Ok(row.map(Ticket::from))
  }

  async fn find_event(&self, event_id: Uuid) -> LedgerResult<Option<Event>> {
    let row = sqlx::query_as::<_, EventRow>("SELECT id, title, organizer_id FROM events WHERE id = $1")
      .bind(event_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage)?;
    Ok(row.map(Event::from))
  }

  async fn event_category_names(&self, event_id: Uuid) -> LedgerResult<Vec<String>> {
    sqlx::query_scalar::<_, String>(
      r#"
      SELECT c.name
      FROM categories c
      JOIN event_categories ec ON ec.category_id = c.id
      WHERE ec.event_id = $1
      ORDER BY c.name
      "#,
    )
    .bind(event_id)
    .fetch_all(&self.pool)
    .await
    .map_err(storage)
  }

  async fn find_coupon(&self, coupon_id: Uuid) -> LedgerResult<Option<Coupon>> {
    let row = sqlx::query_as::<_, CouponRow>(
      "SELECT id, name, code, discount_percent, usage_limit, valid_at, expired_at FROM coupons WHERE id = $1",
    )
    .bind(coupon_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    Ok(row.map(Coupon::from))
  }

  async fn find_coupon_by_code(&self, code: &str) -> LedgerResult<Option<Coupon>> {
    let row = sqlx::query_as::<_, CouponRow>(
      "SELECT id, name, code, discount_percent, usage_limit, valid_at, expired_at FROM coupons WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    Ok(row.map(Coupon::from))
  }

  async fn find_user_coupon(&self, user_id: Uuid, coupon_id: Uuid) -> LedgerResult<Option<UserCoupon>> {
    let row = sqlx::query_as::<_, UserCouponRow>(
      "SELECT user_id, coupon_id, is_used FROM user_coupons WHERE user_id = $1 AND coupon_id = $2",
    )
    .bind(user_id)
    .bind(coupon_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    Ok(row.map(UserCoupon::from))
  }

  #[instrument(name = "pg::claim_coupon", skip(self, coupon), fields(coupon_id = %coupon.id), err(Display))]
  async fn claim_coupon(&self, user_id: Uuid, coupon: &Coupon) -> LedgerResult<UserCoupon> {
    let mut tx = self.pool.begin().await.map_err(storage)?;

    // Serialises concurrent claims on the same coupon until commit.
    let usage_limit = sqlx::query_scalar::<_, i32>("SELECT usage_limit FROM coupons WHERE id = $1 FOR UPDATE")
      .bind(coupon.id)
      .fetch_optional(&mut *tx)
      .await
      .map_err(storage)?
      .ok_or_else(|| LedgerError::Storage(anyhow::anyhow!("coupon {} disappeared during claim", coupon.id)))?;

    let claims = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_coupons WHERE coupon_id = $1")
      .bind(coupon.id)
      .fetch_one(&mut *tx)
      .await
      .map_err(storage)?;
    if claims >= i64::from(usage_limit) {
      debug!(claims, usage_limit, "Coupon limit reached.");
      return Err(LedgerError::CouponLimitReached);
    }

    let row = sqlx::query_as::<_, UserCouponRow>(
      r#"
      INSERT INTO user_coupons (user_id, coupon_id, is_used)
      VALUES ($1, $2, FALSE)
      ON CONFLICT (user_id, coupon_id) DO NOTHING
      RETURNING user_id, coupon_id, is_used
      "#,
    )
    .bind(user_id)
    .bind(coupon.id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(storage)?
    .ok_or(LedgerError::CouponAlreadyClaimed)?;

    tx.commit().await.map_err(storage)?;
    Ok(row.into())
  }

  async fn count_ticket_purchases(&self, ticket_id: Uuid) -> LedgerResult<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM purchases WHERE ticket_id = $1")
      .bind(ticket_id)
      .fetch_one(&self.pool)
      .await
      .map_err(storage)
  }

  async fn find_payment_by_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Payment>> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
      "SELECT {} FROM payments WHERE transaction_id = $1",
      PAYMENT_COLUMNS
    ))
    .bind(transaction_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    Ok(row.map(Payment::from))
  }

  #[instrument(
    name = "pg::fulfill",
    skip_all,
    fields(transaction_id = %order.payment.transaction_id, units = order.purchases.len()),
    err(Display)
  )]
  async fn fulfill(&self, order: FulfillmentOrder) -> LedgerResult<FulfillmentReceipt> {
    let FulfillmentOrder {
      payment,
      purchases,
      coupon_claim,
    } = order;
    let mut tx = self.pool.begin().await.map_err(storage)?;

    // A concurrent delivery of the same transaction blocks here until the
    // first commits, then inserts nothing.
    let inserted = sqlx::query_as::<_, PaymentRow>(&format!(
      r#"
      INSERT INTO payments (id, amount, method, status, transaction_id, user_id, coupon_id)
      VALUES ($1, $2, $3, $4, $5, $6, $7)
      ON CONFLICT (transaction_id) DO NOTHING
      RETURNING {}
      "#,
      PAYMENT_COLUMNS
    ))
    .bind(payment.id)
    .bind(payment.amount)
    .bind(&payment.method)
    .bind(&payment.status)
    .bind(&payment.transaction_id)
    .bind(payment.user_id)
    .bind(payment.coupon_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(storage)?;

    let Some(recorded) = inserted else {
      tx.rollback().await.map_err(storage)?;
      return match self.find_payment_by_transaction(&payment.transaction_id).await? {
        Some(existing) => {
          info!(payment_id = %existing.id, "Transaction already recorded; nothing written.");
          Ok(FulfillmentReceipt::Replayed { payment: existing })
        }
        None => Err(LedgerError::DuplicateTransaction(payment.transaction_id)),
      };
    };

    let mut stored = Vec::with_capacity(purchases.len());
    for purchase in &purchases {
      let row = sqlx::query_as::<_, PurchaseRow>(&format!(
        r#"
        INSERT INTO purchases (id, ticket_id, user_id, payment_id, total, is_used)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        RETURNING {}
        "#,
        PURCHASE_COLUMNS
      ))
      .bind(purchase.id)
      .bind(purchase.ticket_id)
      .bind(purchase.user_id)
      .bind(recorded.id)
      .bind(purchase.total)
      .fetch_one(&mut *tx)
      .await
      .map_err(storage)?;
      stored.push(Purchase::from(row));
    }

    let coupon_consumed = match coupon_claim {
      Some((user_id, coupon_id)) => {
        let updated = sqlx::query(
          "UPDATE user_coupons SET is_used = TRUE WHERE user_id = $1 AND coupon_id = $2 AND is_used = FALSE",
        )
        .bind(user_id)
        .bind(coupon_id)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        if updated.rows_affected() == 0 {
          warn!(%user_id, %coupon_id, "Coupon claim missing or already used at fulfillment.");
        }
        updated.rows_affected() == 1
      }
      None => false,
    };

    tx.commit().await.map_err(storage)?;
    Ok(FulfillmentReceipt::Recorded {
      payment: recorded.into(),
      purchases: stored,
      coupon_consumed,
    })
  }

  async fn find_purchase(&self, purchase_id: Uuid) -> LedgerResult<Option<Purchase>> {
    let row = sqlx::query_as::<_, PurchaseRow>(&format!("SELECT {} FROM purchases WHERE id = $1", PURCHASE_COLUMNS))
      .bind(purchase_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(storage)?;
    Ok(row.map(Purchase::from))
  }

  async fn redeem_purchase(&self, purchase_id: Uuid) -> LedgerResult<bool> {
    let result = sqlx::query("UPDATE purchases SET is_used = TRUE WHERE id = $1 AND is_used = FALSE")
      .bind(purchase_id)
      .execute(&self.pool)
      .await
      .map_err(storage)?;
    Ok(result.rows_affected() == 1)
  }

  async fn payout_account(&self, organizer_id: Uuid) -> LedgerResult<Option<PayoutAccount>> {
    let row = sqlx::query_as::<_, PayoutAccountRow>(
      "SELECT user_id, channel_code, account_number, account_holder_name FROM payout_accounts WHERE user_id = $1",
    )
    .bind(organizer_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(storage)?;
    Ok(row.map(PayoutAccount::from))
  }
}
