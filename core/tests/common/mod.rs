// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use async_trait::async_trait;
use boxoffice::gateway::{InvoiceFee, InvoiceItem};
use boxoffice::models::{Coupon, Event, Payment, PayoutAccount, Purchase, Ticket, User, UserCoupon};
use boxoffice::{
  ContextData, DeskServices, DeskSettings, FulfillmentOrder, FulfillmentReceipt, GatewayError, Invoice,
  InvoiceCallback, InvoiceRequest, InvoiceStatus, Ledger, LedgerError, LedgerResult, PaymentGateway, PayoutChannel,
  PayoutReceipt, PayoutRequest, PipelineControl, PipelineError, TicketDesk,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{
  atomic::{AtomicBool, AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration-test-secret";

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  // RUST_LOG=off keeps benchmark output readable.
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::DEBUG.as_str()));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Engine test context and error ---

#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Engine error: {0}")]
  Engine(String),

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<PipelineError> for TestError {
  fn from(e: PipelineError) -> Self {
    TestError::Engine(format!("{:?}", e))
  }
}

pub static HANDLER_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  HANDLER_EXEC_COUNTER.store(0, Ordering::SeqCst);
}

pub fn create_simple_handler(
  step_name: &'static str,
  message_to_append: &'static str,
) -> boxoffice::pipeline::Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    let step_name_owned = step_name.to_string();
    Box::pin(async move {
      HANDLER_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.message.push_str(message_to_append);
      guard.steps_executed.push(step_name_owned.clone());
      if let Some(stop_step) = &guard.should_stop_at {
        if stop_step == step_name_owned.as_str() {
          return Ok(PipelineControl::Stop);
        }
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn create_failing_handler(
  step_name: &'static str,
  error_message: &'static str,
) -> boxoffice::pipeline::Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    let step_name_owned = step_name.to_string();
    let error_message_owned = error_message.to_string();
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name_owned.clone());
      Err(TestError::Handler(error_message_owned))
    })
  })
}

// --- In-memory ledger ---

#[derive(Default, Clone)]
pub struct LedgerState {
  pub users: HashMap<Uuid, User>,
  pub events: HashMap<Uuid, Event>,
  pub event_categories: HashMap<Uuid, Vec<String>>,
  pub tickets: HashMap<Uuid, Ticket>,
  pub coupons: HashMap<Uuid, Coupon>,
  pub user_coupons: HashMap<(Uuid, Uuid), UserCoupon>,
  pub payments: Vec<Payment>,
  pub purchases: Vec<Purchase>,
  pub payout_accounts: HashMap<Uuid, PayoutAccount>,
}

/// One mutex around the whole state: every operation is trivially atomic.
#[derive(Default)]
pub struct MemoryLedger {
  pub state: Mutex<LedgerState>,
  /// Makes the next `fulfill` fail after staging its writes.
  pub fail_next_fulfillment: AtomicBool,
  pub fail_payout_account_lookup: AtomicBool,
}

impl MemoryLedger {
  pub fn payments(&self) -> Vec<Payment> {
    self.state.lock().payments.clone()
  }

  pub fn purchases(&self) -> Vec<Purchase> {
    self.state.lock().purchases.clone()
  }

  pub fn user_coupon(&self, user_id: Uuid, coupon_id: Uuid) -> Option<UserCoupon> {
    self.state.lock().user_coupons.get(&(user_id, coupon_id)).cloned()
  }

  pub fn purchase(&self, purchase_id: Uuid) -> Option<Purchase> {
    self.state.lock().purchases.iter().find(|p| p.id == purchase_id).cloned()
  }
}

#[async_trait]
impl Ledger for MemoryLedger {
  async fn find_user(&self, user_id: Uuid) -> LedgerResult<Option<User>> {
    Ok(self.state.lock().users.get(&user_id).cloned())
  }

  async fn find_user_by_email(&self, email: &str) -> LedgerResult<Option<User>> {
    Ok(self.state.lock().users.values().find(|u| u.email == email).cloned())
  }

  async fn find_ticket(&self, ticket_id: Uuid) -> LedgerResult<Option<Ticket>> {
    Ok(self.state.lock().tickets.get(&ticket_id).cloned())
  }

  async fn find_event(&self, event_id: Uuid) -> LedgerResult<Option<Event>> {
    Ok(self.state.lock().events.get(&event_id).cloned())
  }

  async fn event_category_names(&self, event_id: Uuid) -> LedgerResult<Vec<String>> {
    Ok(self.state.lock().event_categories.get(&event_id).cloned().unwrap_or_default())
  }

  async fn find_coupon(&self, coupon_id: Uuid) -> LedgerResult<Option<Coupon>> {
    Ok(self.state.lock().coupons.get(&coupon_id).cloned())
  }

  async fn find_coupon_by_code(&self, code: &str) -> LedgerResult<Option<Coupon>> {
    Ok(
      self
        .state
        .lock()
        .coupons
        .values()
        .find(|c| c.code.as_deref() == Some(code))
        .cloned(),
    )
  }

  async fn find_user_coupon(&self, user_id: Uuid, coupon_id: Uuid) -> LedgerResult<Option<UserCoupon>> {
    Ok(self.state.lock().user_coupons.get(&(user_id, coupon_id)).cloned())
  }

  async fn claim_coupon(&self, user_id: Uuid, coupon: &Coupon) -> LedgerResult<UserCoupon> {
    let mut state = self.state.lock();
    let claims = state.user_coupons.keys().filter(|(_, c)| *c == coupon.id).count();
    if claims as i64 >= i64::from(coupon.usage_limit) {
      return Err(LedgerError::CouponLimitReached);
    }
    if state.user_coupons.contains_key(&(user_id, coupon.id)) {
      return Err(LedgerError::CouponAlreadyClaimed);
    }
    let claim = UserCoupon {
      user_id,
      coupon_id: coupon.id,
      is_used: false,
    };
    state.user_coupons.insert((user_id, coupon.id), claim.clone());
    Ok(claim)
  }

  async fn count_ticket_purchases(&self, ticket_id: Uuid) -> LedgerResult<i64> {
    Ok(self.state.lock().purchases.iter().filter(|p| p.ticket_id == ticket_id).count() as i64)
  }

  async fn find_payment_by_transaction(&self, transaction_id: &str) -> LedgerResult<Option<Payment>> {
    Ok(
      self
        .state
        .lock()
        .payments
        .iter()
        .find(|p| p.transaction_id == transaction_id)
        .cloned(),
    )
  }

  async fn fulfill(&self, order: FulfillmentOrder) -> LedgerResult<FulfillmentReceipt> {
    let mut state = self.state.lock();
    if let Some(existing) = state
      .payments
      .iter()
      .find(|p| p.transaction_id == order.payment.transaction_id)
    {
      return Ok(FulfillmentReceipt::Replayed {
        payment: existing.clone(),
      });
    }

    // Stage on a copy; only a successful unit of work replaces the state.
    let mut staged = state.clone();
    staged.payments.push(order.payment.clone());
    staged.purchases.extend(order.purchases.iter().cloned());
    if self.fail_next_fulfillment.swap(false, Ordering::SeqCst) {
      return Err(LedgerError::Storage(anyhow::anyhow!("injected failure while inserting purchases")));
    }

    let coupon_consumed = match order.coupon_claim {
      Some(key) => match staged.user_coupons.get_mut(&key) {
        Some(claim) if !claim.is_used => {
          claim.is_used = true;
          true
        }
        _ => false,
      },
      None => false,
    };

    *state = staged;
    Ok(FulfillmentReceipt::Recorded {
      payment: order.payment,
      purchases: order.purchases,
      coupon_consumed,
    })
  }

  async fn find_purchase(&self, purchase_id: Uuid) -> LedgerResult<Option<Purchase>> {
    Ok(self.purchase(purchase_id))
  }

  async fn redeem_purchase(&self, purchase_id: Uuid) -> LedgerResult<bool> {
    let mut state = self.state.lock();
    match state.purchases.iter_mut().find(|p| p.id == purchase_id) {
      Some(purchase) if !purchase.is_used => {
        purchase.is_used = true;
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn payout_account(&self, organizer_id: Uuid) -> LedgerResult<Option<PayoutAccount>> {
    if self.fail_payout_account_lookup.load(Ordering::SeqCst) {
      return Err(LedgerError::Storage(anyhow::anyhow!("payout accounts unavailable")));
    }
    Ok(self.state.lock().payout_accounts.get(&organizer_id).cloned())
  }
}

// --- Scripted gateway and payout channel ---

#[derive(Default)]
pub struct ScriptedGateway {
  pub requests: Mutex<Vec<InvoiceRequest>>,
  pub reject: AtomicBool,
}

impl ScriptedGateway {
  pub fn last_request(&self) -> Option<InvoiceRequest> {
    self.requests.lock().last().cloned()
  }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
  async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
    self.requests.lock().push(request.clone());
    if self.reject.load(Ordering::SeqCst) {
      return Err(GatewayError::Rejected {
        status: 400,
        body: "{\"error_code\":\"API_VALIDATION_ERROR\"}".to_string(),
      });
    }
    let id = format!("inv_{}", Uuid::new_v4().simple());
    Ok(Invoice {
      invoice_url: format!("https://checkout.example.test/web/{}", id),
      id,
      external_id: request.external_id,
    })
  }
}

#[derive(Default)]
pub struct ScriptedPayouts {
  pub requests: Mutex<Vec<PayoutRequest>>,
  pub fail: AtomicBool,
}

#[async_trait]
impl PayoutChannel for ScriptedPayouts {
  async fn create_payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, GatewayError> {
    self.requests.lock().push(request.clone());
    if self.fail.load(Ordering::SeqCst) {
      return Err(GatewayError::Timeout);
    }
    Ok(PayoutReceipt {
      id: format!("disb_{}", Uuid::new_v4().simple()),
      reference_id: request.reference_id,
      status: "ACCEPTED".to_string(),
      channel_code: request.channel_code,
    })
  }
}

// --- Fixture ---

pub struct Fixture {
  pub ledger: Arc<MemoryLedger>,
  pub gateway: Arc<ScriptedGateway>,
  pub payouts: Arc<ScriptedPayouts>,
  pub desk: TicketDesk,
  pub buyer: User,
  pub organizer: User,
  pub event: Event,
  pub ticket: Ticket,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_settings(DeskSettings::default())
  }

  pub fn with_settings(settings: DeskSettings) -> Self {
    setup_tracing();
    let ledger = Arc::new(MemoryLedger::default());
    let gateway = Arc::new(ScriptedGateway::default());
    let payouts = Arc::new(ScriptedPayouts::default());

    let services = DeskServices::new(ledger.clone(), gateway.clone(), payouts.clone(), TEST_SECRET, settings);
    let desk = TicketDesk::new(services);

    let buyer = user("Bima", "bima@example.com");
    let organizer = user("Sari", "sari@example.com");
    let event = Event {
      id: Uuid::new_v4(),
      title: "Jazz Night".to_string(),
      organizer_id: organizer.id,
    };
    let ticket = Ticket {
      id: Uuid::new_v4(),
      event_id: event.id,
      kind: "VIP".to_string(),
      unit_price: 10_000,
      quantity_limit: None,
    };

    {
      let mut state = ledger.state.lock();
      state.users.insert(buyer.id, buyer.clone());
      state.users.insert(organizer.id, organizer.clone());
      state.events.insert(event.id, event.clone());
      state
        .event_categories
        .insert(event.id, vec!["Music".to_string(), "Jazz".to_string()]);
      state.tickets.insert(ticket.id, ticket.clone());
      state.payout_accounts.insert(
        organizer.id,
        PayoutAccount {
          user_id: organizer.id,
          channel_code: "ID_BCA".to_string(),
          account_number: "1234567890".to_string(),
          account_holder_name: "Sari".to_string(),
        },
      );
    }

    Self {
      ledger,
      gateway,
      payouts,
      desk,
      buyer,
      organizer,
      event,
      ticket,
    }
  }

  pub fn add_user(&self, name: &str, email: &str) -> User {
    let u = user(name, email);
    self.ledger.state.lock().users.insert(u.id, u.clone());
    u
  }

  pub fn add_coupon(&self, code: &str, discount_percent: i32, usage_limit: i32) -> Coupon {
    let now = Utc::now();
    self.add_coupon_window(code, discount_percent, usage_limit, now - Duration::days(1), now + Duration::days(1))
  }

  pub fn add_coupon_window(
    &self,
    code: &str,
    discount_percent: i32,
    usage_limit: i32,
    valid_at: DateTime<Utc>,
    expired_at: DateTime<Utc>,
  ) -> Coupon {
    let coupon = Coupon {
      id: Uuid::new_v4(),
      name: format!("{} promo", code),
      code: Some(code.to_string()),
      discount_percent,
      usage_limit,
      valid_at,
      expired_at,
    };
    self.ledger.state.lock().coupons.insert(coupon.id, coupon.clone());
    coupon
  }

  /// Inserts a claim row directly, bypassing the claim flow.
  pub fn give_coupon(&self, user_id: Uuid, coupon_id: Uuid, is_used: bool) {
    self.ledger.state.lock().user_coupons.insert(
      (user_id, coupon_id),
      UserCoupon {
        user_id,
        coupon_id,
        is_used,
      },
    );
  }

  pub fn set_quantity_limit(&mut self, limit: Option<i32>) {
    self.ticket.quantity_limit = limit;
    self.ledger.state.lock().tickets.insert(self.ticket.id, self.ticket.clone());
  }

  /// The callback the gateway would send once `request`'s invoice is paid.
  pub fn callback_for(&self, request: &InvoiceRequest, status: InvoiceStatus) -> InvoiceCallback {
    InvoiceCallback {
      id: format!("inv_{}", Uuid::new_v4().simple()),
      external_id: request.external_id.clone(),
      status,
      amount: request.amount,
      payer_email: Some(request.payer_email.clone()),
      payment_method: Some("BANK_TRANSFER".to_string()),
      payment_channel: Some("BCA".to_string()),
      currency: Some(request.currency.clone()),
      paid_at: Some(Utc::now()),
      items: request.items.clone(),
      fees: request.fees.clone(),
    }
  }

  /// A paid callback carrying a freshly encoded reference, without going through the intent flow.
  pub fn paid_callback(&self, quantity: u32, coupon_id: Option<Uuid>) -> InvoiceCallback {
    let external_id = self
      .desk
      .services()
      .codec
      .external_id(Utc::now(), self.ticket.id, coupon_id)
      .expect("encode external id");
    let subtotal = self.ticket.unit_price * i64::from(quantity);
    InvoiceCallback {
      id: format!("inv_{}", Uuid::new_v4().simple()),
      external_id,
      status: InvoiceStatus::Paid,
      amount: subtotal + 150,
      payer_email: Some(self.buyer.email.clone()),
      payment_method: Some("EWALLET".to_string()),
      payment_channel: Some("OVO".to_string()),
      currency: Some("IDR".to_string()),
      paid_at: Some(Utc::now()),
      items: vec![InvoiceItem {
        name: format!("{} - {}", self.event.title, self.ticket.kind),
        quantity,
        price: self.ticket.unit_price,
        category: Some("Music,Jazz".to_string()),
      }],
      fees: vec![InvoiceFee {
        kind: "ADMIN".to_string(),
        value: 150,
      }],
    }
  }
}

pub fn user(name: &str, email: &str) -> User {
  User {
    id: Uuid::new_v4(),
    name: name.to_string(),
    email: email.to_string(),
    phone_number: "+628123456789".to_string(),
  }
}
