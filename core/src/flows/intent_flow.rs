// core/src/flows/intent_flow.rs

//! Payment intent: price an order and open a hosted invoice for it.
//!
//! Nothing is persisted here. The only side effect is the outbound invoice
//! call, so a failure at any step leaves no local state behind.

use super::contexts::IntentCtxData;
use crate::error::{BoxofficeError, BoxofficeResult};
use crate::gateway::{InvoiceFee, InvoiceItem, InvoiceRequest, Payer};
use crate::pipeline::{skip_when, ContextData, Pipeline, PipelineControl, Registry};
use crate::pricing;
use tracing::{info, warn};

pub const ADMIN_FEE_LINE: &str = "ADMIN";

pub fn register_intent_flow(registry: &Registry<BoxofficeError>) {
  let mut p = Pipeline::<IntentCtxData, BoxofficeError>::new(
    "payment_intent",
    &[
      ("validate_order_input", false, None),
      ("load_ticket_and_buyer", false, None),
      ("check_ticket_allocation", false, skip_when(|ctx: &IntentCtxData| {
        ctx.ticket.as_ref().map_or(true, |t| t.quantity_limit.is_none())
      })),
      ("apply_coupon", false, skip_when(|ctx: &IntentCtxData| ctx.coupon_id.is_none())),
      ("price_order", false, None),
      ("build_external_reference", false, None),
      ("create_gateway_invoice", false, None),
    ],
  );

  p.on_step("validate_order_input", validate_order_input);
  p.on_step("load_ticket_and_buyer", load_ticket_and_buyer);
  p.on_step("check_ticket_allocation", check_ticket_allocation);
  p.on_step("apply_coupon", apply_coupon);
  p.on_step("price_order", price_order);
  p.on_step("build_external_reference", build_external_reference);
  p.on_step("create_gateway_invoice", create_gateway_invoice);

  registry.register_pipeline(p);
}

async fn validate_order_input(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let quantity = ctx_data.read().quantity;
  if quantity == 0 {
    warn!("Intent rejected: quantity must be at least 1.");
    return Err(BoxofficeError::MalformedInput("quantity must be at least 1".to_string()));
  }
  if quantity > pricing::MAX_UNITS_PER_PAYMENT {
    warn!(quantity, "Intent rejected: quantity above the per-payment cap.");
    return Err(BoxofficeError::MalformedInput(format!(
      "quantity may not exceed {}",
      pricing::MAX_UNITS_PER_PAYMENT
    )));
  }
  Ok(PipelineControl::Continue)
}

async fn load_ticket_and_buyer(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, ticket_id, user_id) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.ticket_id, guard.user_id)
  };
  let ledger = &services.ledger;

  let ticket = ledger
    .find_ticket(ticket_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("ticket", ticket_id))?;
  let buyer = ledger
    .find_user(user_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("user", user_id))?;
  let event = ledger
    .find_event(ticket.event_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("event", ticket.event_id))?;
  let category_names = ledger.event_category_names(event.id).await?;

  info!(ticket = %ticket.id, event = %event.id, unit_price = ticket.unit_price, "Ticket and buyer loaded.");

  let mut guard = ctx_data.write();
  guard.ticket = Some(ticket);
  guard.buyer = Some(buyer);
  guard.event = Some(event);
  guard.category_names = category_names;
  Ok(PipelineControl::Continue)
}

async fn check_ticket_allocation(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, ticket_id, limit, quantity) = {
    let guard = ctx_data.read();
    let ticket = guard.ticket.as_ref().ok_or_else(|| missing("ticket"))?;
    (guard.services.clone(), ticket.id, ticket.quantity_limit, guard.quantity)
  };
  let Some(limit) = limit else {
    return Ok(PipelineControl::Continue);
  };

  let sold = services.ledger.count_ticket_purchases(ticket_id).await?;
  let remaining = (i64::from(limit) - sold).max(0);
  if i64::from(quantity) > remaining {
    warn!(ticket = %ticket_id, sold, limit, requested = quantity, "Ticket allocation exhausted.");
    return Err(BoxofficeError::TicketSoldOut { ticket_id, remaining });
  }
  Ok(PipelineControl::Continue)
}

async fn apply_coupon(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, coupon_id, user_id, now) = {
    let guard = ctx_data.read();
    let coupon_id = guard.coupon_id.ok_or_else(|| missing("coupon id"))?;
    (guard.services.clone(), coupon_id, guard.user_id, guard.now)
  };
  let ledger = &services.ledger;

  let coupon = ledger
    .find_coupon(coupon_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("coupon", coupon_id))?;
  if !coupon.is_active_at(now) {
    warn!(coupon = %coupon.id, valid_at = %coupon.valid_at, expired_at = %coupon.expired_at, "Coupon outside its validity window.");
    return Err(BoxofficeError::InvalidState("coupon is not currently valid".to_string()));
  }

  let claim = ledger
    .find_user_coupon(user_id, coupon_id)
    .await?
    .ok_or(BoxofficeError::CouponUnclaimed)?;
  if claim.is_used {
    return Err(BoxofficeError::CouponAlreadyUsed);
  }

  info!(coupon = %coupon.id, discount_percent = coupon.discount_percent, "Coupon applied.");
  ctx_data.write().coupon = Some(coupon);
  Ok(PipelineControl::Continue)
}

async fn price_order(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  let unit_price = guard.ticket.as_ref().ok_or_else(|| missing("ticket"))?.unit_price;
  let discount = guard.coupon.as_ref().map(|c| c.discount_percent);
  let quote = pricing::quote(unit_price, guard.quantity, discount, &guard.services.settings.fee_policy)?;

  info!(
    gross = quote.gross,
    discount = quote.discount,
    admin_fee = quote.admin_fee,
    total = quote.total,
    "Order priced."
  );
  guard.quote = Some(quote);
  Ok(PipelineControl::Continue)
}

async fn build_external_reference(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  let external_id = guard
    .services
    .codec
    .external_id(guard.now, guard.ticket_id, guard.coupon_id)?;
  guard.external_id = Some(external_id);
  Ok(PipelineControl::Continue)
}

async fn create_gateway_invoice(ctx_data: ContextData<IntentCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, request) = {
    let guard = ctx_data.read();
    (guard.services.clone(), invoice_request(&guard)?)
  };

  let invoice = services.gateway.create_invoice(request).await.map_err(|e| {
    warn!(error = %e, "Gateway refused to create the invoice.");
    BoxofficeError::Upstream(e)
  })?;

  info!(invoice = %invoice.id, external_id = %invoice.external_id, "Invoice created.");
  ctx_data.write().invoice = Some(invoice);
  Ok(PipelineControl::Continue)
}

fn invoice_request(ctx: &IntentCtxData) -> BoxofficeResult<InvoiceRequest> {
  let ticket = ctx.ticket.as_ref().ok_or_else(|| missing("ticket"))?;
  let event = ctx.event.as_ref().ok_or_else(|| missing("event"))?;
  let buyer = ctx.buyer.as_ref().ok_or_else(|| missing("buyer"))?;
  let quote = ctx.quote.ok_or_else(|| missing("quote"))?;
  let external_id = ctx.external_id.clone().ok_or_else(|| missing("external id"))?;
  let settings = &ctx.services.settings;

  let item_name = format!("{} - {}", event.title, ticket.kind);
  let category = if ctx.category_names.is_empty() {
    None
  } else {
    Some(ctx.category_names.join(","))
  };

  let mut fees = Vec::new();
  if quote.admin_fee > 0 {
    fees.push(InvoiceFee {
      kind: ADMIN_FEE_LINE.to_string(),
      value: quote.admin_fee,
    });
  }

  Ok(InvoiceRequest {
    external_id,
    amount: quote.total,
    currency: settings.currency.clone(),
    description: format!("{} x{}", item_name, quote.quantity),
    payer: Payer {
      given_names: buyer.name.clone(),
      email: buyer.email.clone(),
      mobile_number: Some(buyer.phone_number.clone()).filter(|n| !n.is_empty()),
    },
    payer_email: buyer.email.clone(),
    items: vec![InvoiceItem {
      name: item_name,
      quantity: quote.quantity,
      price: quote.line_unit_price(),
      category,
    }],
    fees,
    invoice_duration: settings.invoice_duration_secs,
    success_redirect_url: settings.success_redirect_url.clone(),
    failure_redirect_url: settings.failure_redirect_url.clone(),
  })
}

fn missing(what: &str) -> BoxofficeError {
  BoxofficeError::InvalidState(format!("intent flow reached a step without {}", what))
}
