// core/src/flows/contexts.rs

//! Data each flow runs on. Steps receive these wrapped in `ContextData` and
//! fill in the `Option` fields as they go.

use crate::codec::ExternalReference;
use crate::desk::{CallbackOutcome, DeskServices, IntentRequest, PayoutOutcome, RedemptionOutcome};
use crate::gateway::{Invoice, InvoiceCallback};
use crate::models::{Coupon, Event, Payment, Purchase, Ticket, User, UserCoupon};
use crate::pricing::PriceBreakdown;
use crate::redemption::RedemptionToken;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct IntentCtxData {
  pub services: DeskServices,
  pub user_id: Uuid,
  pub ticket_id: Uuid,
  pub quantity: u32,
  pub coupon_id: Option<Uuid>,
  pub now: DateTime<Utc>,
  pub buyer: Option<User>,
  pub ticket: Option<Ticket>,
  pub event: Option<Event>,
  pub category_names: Vec<String>,
  pub coupon: Option<Coupon>,
  pub quote: Option<PriceBreakdown>,
  pub external_id: Option<String>,
  pub invoice: Option<Invoice>,
}

impl IntentCtxData {
  pub fn new(services: DeskServices, request: IntentRequest, now: DateTime<Utc>) -> Self {
    Self {
      services,
      user_id: request.user_id,
      ticket_id: request.ticket_id,
      quantity: request.quantity,
      coupon_id: request.coupon_id,
      now,
      buyer: None,
      ticket: None,
      event: None,
      category_names: Vec::new(),
      coupon: None,
      quote: None,
      external_id: None,
      invoice: None,
    }
  }
}

pub struct CallbackCtxData {
  pub services: DeskServices,
  pub callback: InvoiceCallback,
  pub presented_token: Option<String>,
  /// Set once the callback token check passed; failures after this point are acknowledged.
  pub token_verified: bool,
  pub payer: Option<User>,
  pub reference: Option<ExternalReference>,
  pub ticket: Option<Ticket>,
  pub event: Option<Event>,
  /// Callback amount net of gateway fees, known once the amounts check out.
  pub net_amount: Option<i64>,
  pub payment: Option<Payment>,
  pub purchases: Vec<Purchase>,
  pub coupon_consumed: bool,
  pub payout: Option<PayoutOutcome>,
  pub outcome: Option<CallbackOutcome>,
}

impl CallbackCtxData {
  pub fn new(services: DeskServices, callback: InvoiceCallback, presented_token: Option<String>) -> Self {
    Self {
      services,
      callback,
      presented_token,
      token_verified: false,
      payer: None,
      reference: None,
      ticket: None,
      event: None,
      net_amount: None,
      payment: None,
      purchases: Vec::new(),
      coupon_consumed: false,
      payout: None,
      outcome: None,
    }
  }
}

pub struct RedemptionIssueCtxData {
  pub services: DeskServices,
  pub purchase_id: Uuid,
  pub user_id: Uuid,
  pub purchase: Option<Purchase>,
  pub ticket: Option<Ticket>,
  pub token: Option<RedemptionToken>,
}

impl RedemptionIssueCtxData {
  pub fn new(services: DeskServices, purchase_id: Uuid, user_id: Uuid) -> Self {
    Self {
      services,
      purchase_id,
      user_id,
      purchase: None,
      ticket: None,
      token: None,
    }
  }
}

pub struct RedemptionValidateCtxData {
  pub services: DeskServices,
  pub raw_token: String,
  pub user_id: Uuid,
  pub token: Option<RedemptionToken>,
  pub purchase: Option<Purchase>,
  pub ticket: Option<Ticket>,
  pub event: Option<Event>,
  pub outcome: Option<RedemptionOutcome>,
}

impl RedemptionValidateCtxData {
  pub fn new(services: DeskServices, raw_token: String, user_id: Uuid) -> Self {
    Self {
      services,
      raw_token,
      user_id,
      token: None,
      purchase: None,
      ticket: None,
      event: None,
      outcome: None,
    }
  }
}

pub struct CouponClaimCtxData {
  pub services: DeskServices,
  pub user_id: Uuid,
  pub code: String,
  pub now: DateTime<Utc>,
  pub coupon: Option<Coupon>,
  pub claim: Option<UserCoupon>,
}

impl CouponClaimCtxData {
  pub fn new(services: DeskServices, user_id: Uuid, code: String, now: DateTime<Utc>) -> Self {
    Self {
      services,
      user_id,
      code,
      now,
      coupon: None,
      claim: None,
    }
  }
}
