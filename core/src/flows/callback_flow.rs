// core/src/flows/callback_flow.rs

//! Payment callback: turn one paid invoice notification into a payment, one
//! purchase per ticket unit, a consumed coupon claim and an organizer payout.
//!
//! `Received -> Validated -> Fulfilled`, or `Received -> Rejected` with no
//! mutation. The ledger write is a single unit of work; the payout runs after it
//! commits and can fail without touching what was recorded.

use super::contexts::CallbackCtxData;
use crate::desk::{CallbackOutcome, PayoutOutcome};
use crate::error::{BoxofficeError, BoxofficeResult};
use crate::gateway::{ChannelProperties, InvoiceCallback, InvoiceStatus, PayoutRequest};
use crate::ledger::{FulfillmentOrder, FulfillmentReceipt};
use crate::models::{Payment, Purchase};
use crate::pricing::MAX_UNITS_PER_PAYMENT;
use crate::pipeline::{skip_when, ContextData, Pipeline, PipelineControl, Registry};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

pub fn register_callback_flow(registry: &Registry<BoxofficeError>) {
  let mut p = Pipeline::<CallbackCtxData, BoxofficeError>::new(
    "payment_callback",
    &[
      ("verify_callback_token", false, None),
      ("check_payment_status", false, None),
      ("verify_amounts", false, None),
      ("resolve_payer", false, None),
      ("decode_external_reference", false, None),
      ("guard_duplicate_delivery", false, None),
      ("fulfill_purchases", false, None),
      ("disburse_to_organizer", true, skip_when(|ctx: &CallbackCtxData| ctx.payment.is_none())),
      ("report_outcome", false, None),
    ],
  );

  p.on_step("verify_callback_token", verify_callback_token);
  p.on_step("check_payment_status", check_payment_status);
  p.on_step("verify_amounts", verify_amounts);
  p.on_step("resolve_payer", resolve_payer);
  p.on_step("decode_external_reference", decode_external_reference);
  p.on_step("guard_duplicate_delivery", guard_duplicate_delivery);
  p.on_step("fulfill_purchases", fulfill_purchases);
  p.on_step("disburse_to_organizer", disburse_to_organizer);
  p.on_step("report_outcome", report_outcome);

  registry.register_pipeline(p);
}

async fn verify_callback_token(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  if let Some(expected) = guard.services.settings.callback_token.as_deref() {
    let presented = guard.presented_token.as_deref().unwrap_or_default();
    let matches: bool = expected.as_bytes().ct_eq(presented.as_bytes()).into();
    if !matches {
      warn!("Callback token missing or invalid.");
      return Err(BoxofficeError::Forbidden("invalid callback token".to_string()));
    }
  }
  guard.token_verified = true;
  Ok(PipelineControl::Continue)
}

async fn check_payment_status(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  if guard.callback.is_paid() {
    return Ok(PipelineControl::Continue);
  }

  let status = status_label(guard.callback.status).to_string();
  info!(status = %status, "Callback is not a final payment; acknowledging without changes.");
  guard.outcome = Some(CallbackOutcome::Ignored { status });
  Ok(PipelineControl::Stop)
}

/// The charged amount must be the line items plus fees, give or take the
/// per-unit rounding remainder the invoice prices were floored by.
async fn verify_amounts(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  let net_amount = settle(&guard.callback).map_err(|reason| {
    warn!(amount = guard.callback.amount, reason = %reason, "Callback amounts rejected.");
    BoxofficeError::MalformedInput(reason)
  })?;
  guard.net_amount = Some(net_amount);
  Ok(PipelineControl::Continue)
}

fn settle(callback: &InvoiceCallback) -> Result<i64, String> {
  let amount = callback.amount;
  if amount < 0 {
    return Err(format!("callback amount {} is negative", amount));
  }
  let fees = callback
    .total_fees()
    .ok_or_else(|| "callback fees are negative or overflow".to_string())?;

  let units = callback
    .items
    .iter()
    .try_fold(0u64, |total, item| total.checked_add(u64::from(item.quantity)))
    .ok_or_else(|| "callback unit count overflows".to_string())?;
  if units == 0 {
    return Err("callback carries no ticket units".to_string());
  }
  if units > u64::from(MAX_UNITS_PER_PAYMENT) {
    return Err(format!(
      "callback carries {} ticket units, the limit is {}",
      units, MAX_UNITS_PER_PAYMENT
    ));
  }

  let charged = callback
    .total_line_items()
    .and_then(|lines| lines.checked_add(fees))
    .ok_or_else(|| "callback line items are negative or overflow".to_string())?;
  let remainder = amount - charged;
  if remainder < 0 || remainder as u64 >= units {
    return Err(format!(
      "callback amount {} does not match items and fees totalling {}",
      amount, charged
    ));
  }

  Ok((amount - fees).clamp(0, amount))
}

async fn resolve_payer(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, email) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.callback.payer_email.clone())
  };
  let email = email
    .filter(|e| !e.trim().is_empty())
    .ok_or_else(|| BoxofficeError::MalformedInput("callback carries no payer email".to_string()))?;

  let payer = services
    .ledger
    .find_user_by_email(&email)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("user", &email))?;

  info!(payer = %payer.id, "Payer resolved.");
  ctx_data.write().payer = Some(payer);
  Ok(PipelineControl::Continue)
}

async fn decode_external_reference(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, external_id) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.callback.external_id.clone())
  };

  let reference = services.codec.decode_external_id(&external_id).map_err(|e| {
    error!(error = %e, "External reference could not be attributed.");
    BoxofficeError::from(e)
  })?;

  let ticket = services
    .ledger
    .find_ticket(reference.ticket_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("ticket", reference.ticket_id))?;
  let event = services
    .ledger
    .find_event(ticket.event_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("event", ticket.event_id))?;

  info!(ticket = %ticket.id, coupon = ?reference.coupon_id, "External reference decoded.");
  let mut guard = ctx_data.write();
  guard.reference = Some(reference);
  guard.ticket = Some(ticket);
  guard.event = Some(event);
  Ok(PipelineControl::Continue)
}

async fn guard_duplicate_delivery(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, external_id) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.callback.external_id.clone())
  };

  match services.ledger.find_payment_by_transaction(&external_id).await? {
    Some(existing) => {
      info!(payment = %existing.id, "Callback already fulfilled; acknowledging replay.");
      ctx_data.write().outcome = Some(CallbackOutcome::Duplicate { payment_id: existing.id });
      Ok(PipelineControl::Stop)
    }
    None => Ok(PipelineControl::Continue),
  }
}

async fn fulfill_purchases(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, order) = {
    let guard = ctx_data.read();
    (guard.services.clone(), fulfillment_order(&guard)?)
  };
  let units = order.purchases.len();

  let receipt = services.ledger.fulfill(order).await.map_err(|e| {
    error!(error = %e, "Fulfillment rolled back.");
    BoxofficeError::Fulfillment(e)
  })?;

  let mut guard = ctx_data.write();
  match receipt {
    FulfillmentReceipt::Recorded {
      payment,
      purchases,
      coupon_consumed,
    } => {
      if guard.reference.and_then(|r| r.coupon_id).is_some() && !coupon_consumed {
        warn!(payment = %payment.id, "Coupon claim was missing or already used at fulfillment.");
      }
      info!(payment = %payment.id, units, coupon_consumed, "Payment and purchases recorded.");
      guard.payment = Some(payment);
      guard.purchases = purchases;
      guard.coupon_consumed = coupon_consumed;
      Ok(PipelineControl::Continue)
    }
    FulfillmentReceipt::Replayed { payment } => {
      info!(payment = %payment.id, "Concurrent delivery already recorded this payment.");
      guard.outcome = Some(CallbackOutcome::Duplicate { payment_id: payment.id });
      Ok(PipelineControl::Stop)
    }
  }
}

fn fulfillment_order(ctx: &CallbackCtxData) -> BoxofficeResult<FulfillmentOrder> {
  let payer = ctx.payer.as_ref().ok_or_else(|| missing("payer"))?;
  let reference = ctx.reference.ok_or_else(|| missing("external reference"))?;
  let callback = &ctx.callback;

  let payment = Payment {
    id: Uuid::new_v4(),
    amount: callback.amount,
    method: callback.method(),
    status: status_label(callback.status).to_string(),
    transaction_id: callback.external_id.clone(),
    user_id: payer.id,
    coupon_id: reference.coupon_id,
  };

  let (payment_id, payer_id, ticket_id) = (payment.id, payer.id, reference.ticket_id);
  let purchases = callback
    .items
    .iter()
    .filter(|item| item.quantity > 0)
    .flat_map(|item| {
      let unit_total = item.line_total() / i64::from(item.quantity);
      (0..item.quantity).map(move |_| Purchase {
        id: Uuid::new_v4(),
        ticket_id,
        user_id: payer_id,
        payment_id,
        total: unit_total,
        is_used: false,
      })
    })
    .collect();

  Ok(FulfillmentOrder {
    coupon_claim: reference.coupon_id.map(|coupon_id| (payer.id, coupon_id)),
    payment,
    purchases,
  })
}

/// Pays the organizer what is left of the invoice after gateway fees.
///
/// The reference id is derived from the payment so a repeated request cannot
/// pay twice; the idempotency key is fresh per attempt.
async fn disburse_to_organizer(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, payment_id, amount, organizer_id, description) = {
    let guard = ctx_data.read();
    let payment = guard.payment.as_ref().ok_or_else(|| missing("payment"))?;
    let event = guard.event.as_ref().ok_or_else(|| missing("event"))?;
    (
      guard.services.clone(),
      payment.id,
      guard.net_amount.ok_or_else(|| missing("verified amounts"))?,
      event.organizer_id,
      format!("Ticket sales for {}", event.title),
    )
  };

  if amount <= 0 {
    info!(amount, "Nothing left to disburse after fees.");
    ctx_data.write().payout = Some(PayoutOutcome::Skipped {
      reason: "no amount left after fees".to_string(),
    });
    return Ok(PipelineControl::Continue);
  }

  let account = match services.ledger.payout_account(organizer_id).await {
    Ok(Some(account)) => account,
    Ok(None) => {
      warn!(organizer = %organizer_id, "Organizer has no payout account.");
      ctx_data.write().payout = Some(PayoutOutcome::Skipped {
        reason: "organizer has no payout account".to_string(),
      });
      return Ok(PipelineControl::Continue);
    }
    Err(e) => {
      ctx_data.write().payout = Some(PayoutOutcome::Failed { reason: e.to_string() });
      return Err(e.into());
    }
  };

  let request = PayoutRequest {
    idempotency_key: Uuid::new_v4().to_string(),
    reference_id: payout_reference(payment_id),
    channel_code: account.channel_code,
    channel_properties: ChannelProperties {
      account_number: account.account_number,
      account_holder_name: account.account_holder_name,
    },
    amount,
    currency: services.settings.currency.clone(),
    description,
  };
  let reference_id = request.reference_id.clone();

  match services.payouts.create_payout(request).await {
    Ok(receipt) => {
      info!(payout = %receipt.id, reference = %reference_id, amount, "Payout requested.");
      ctx_data.write().payout = Some(PayoutOutcome::Requested {
        payout_id: receipt.id,
        reference_id,
        amount,
      });
      Ok(PipelineControl::Continue)
    }
    Err(e) => {
      ctx_data.write().payout = Some(PayoutOutcome::Failed { reason: e.to_string() });
      Err(BoxofficeError::Upstream(e))
    }
  }
}

async fn report_outcome(ctx_data: ContextData<CallbackCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  let outcome = fulfilled_outcome(&guard).ok_or_else(|| missing("payment"))?;
  guard.outcome = Some(outcome);
  Ok(PipelineControl::Continue)
}

fn fulfilled_outcome(ctx: &CallbackCtxData) -> Option<CallbackOutcome> {
  let payment = ctx.payment.as_ref()?;
  Some(CallbackOutcome::Fulfilled {
    payment_id: payment.id,
    purchase_ids: ctx.purchases.iter().map(|p| p.id).collect(),
    coupon_consumed: ctx.coupon_consumed,
    payout: ctx.payout.clone().unwrap_or(PayoutOutcome::Skipped {
      reason: "payout not attempted".to_string(),
    }),
  })
}

pub fn payout_reference(payment_id: Uuid) -> String {
  format!("PAYOUT-{}", payment_id)
}

fn status_label(status: InvoiceStatus) -> &'static str {
  match status {
    InvoiceStatus::Pending => "PENDING",
    InvoiceStatus::Paid => "PAID",
    InvoiceStatus::Settled => "SETTLED",
    InvoiceStatus::Expired => "EXPIRED",
    InvoiceStatus::Unknown => "UNKNOWN",
  }
}

fn missing(what: &str) -> BoxofficeError {
  BoxofficeError::InvalidState(format!("callback flow reached a step without {}", what))
}
