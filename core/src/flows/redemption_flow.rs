// core/src/flows/redemption_flow.rs

//! Redemption tokens: issued to the ticket holder, redeemed by the event organizer.
//!
//! A purchase goes `Unused -> Used` exactly once, through the ledger's
//! compare-and-set in `redeem_purchase`.

use super::contexts::{RedemptionIssueCtxData, RedemptionValidateCtxData};
use crate::desk::RedemptionOutcome;
use crate::error::{BoxofficeError, BoxofficeResult};
use crate::pipeline::{ContextData, Pipeline, PipelineControl, Registry};
use crate::redemption::RedemptionToken;
use chrono::Utc;
use tracing::{info, warn};

pub fn register_redemption_flows(registry: &Registry<BoxofficeError>) {
  let mut issue = Pipeline::<RedemptionIssueCtxData, BoxofficeError>::new(
    "redemption_issue",
    &[
      ("load_purchase", false, None),
      ("authorize_holder", false, None),
      ("ensure_unused", false, None),
      ("sign_token", false, None),
    ],
  );
  issue.on_step("load_purchase", load_purchase_for_issue);
  issue.on_step("authorize_holder", authorize_holder);
  issue.on_step("ensure_unused", ensure_unused);
  issue.on_step("sign_token", sign_token);
  registry.register_pipeline(issue);

  let mut validate = Pipeline::<RedemptionValidateCtxData, BoxofficeError>::new(
    "redemption_validate",
    &[
      ("parse_token", false, None),
      ("load_purchase", false, None),
      ("verify_signature", false, None),
      ("authorize_organizer", false, None),
      ("redeem_purchase", false, None),
    ],
  );
  validate.on_step("parse_token", parse_token);
  validate.on_step("load_purchase", load_purchase_for_validation);
  validate.on_step("verify_signature", verify_signature);
  validate.on_step("authorize_organizer", authorize_organizer);
  validate.on_step("redeem_purchase", redeem_purchase);
  registry.register_pipeline(validate);
}

// --- Issue ---

async fn load_purchase_for_issue(ctx_data: ContextData<RedemptionIssueCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, purchase_id) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.purchase_id)
  };

  let purchase = services
    .ledger
    .find_purchase(purchase_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("purchase", purchase_id))?;
  let ticket = services
    .ledger
    .find_ticket(purchase.ticket_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("ticket", purchase.ticket_id))?;

  let mut guard = ctx_data.write();
  guard.purchase = Some(purchase);
  guard.ticket = Some(ticket);
  Ok(PipelineControl::Continue)
}

async fn authorize_holder(ctx_data: ContextData<RedemptionIssueCtxData>) -> BoxofficeResult<PipelineControl> {
  let guard = ctx_data.read();
  let purchase = guard.purchase.as_ref().ok_or_else(|| missing("purchase"))?;
  if purchase.user_id != guard.user_id {
    warn!(purchase = %purchase.id, requester = %guard.user_id, "Redemption token requested by a non-holder.");
    return Err(BoxofficeError::Forbidden("purchase belongs to another user".to_string()));
  }
  Ok(PipelineControl::Continue)
}

async fn ensure_unused(ctx_data: ContextData<RedemptionIssueCtxData>) -> BoxofficeResult<PipelineControl> {
  let guard = ctx_data.read();
  let purchase = guard.purchase.as_ref().ok_or_else(|| missing("purchase"))?;
  if purchase.is_used {
    return Err(BoxofficeError::Forbidden("ticket has already been used".to_string()));
  }
  Ok(PipelineControl::Continue)
}

async fn sign_token(ctx_data: ContextData<RedemptionIssueCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  let purchase = guard.purchase.as_ref().ok_or_else(|| missing("purchase"))?;
  let event_id = guard.ticket.as_ref().ok_or_else(|| missing("ticket"))?.event_id;
  let token = guard.services.signer.issue(purchase, event_id);

  info!(purchase = %token.purchase_id, "Redemption token issued.");
  guard.token = Some(token);
  Ok(PipelineControl::Continue)
}

// --- Validate ---

async fn parse_token(ctx_data: ContextData<RedemptionValidateCtxData>) -> BoxofficeResult<PipelineControl> {
  let mut guard = ctx_data.write();
  let token: RedemptionToken = guard.raw_token.parse()?;
  guard.token = Some(token);
  Ok(PipelineControl::Continue)
}

async fn load_purchase_for_validation(
  ctx_data: ContextData<RedemptionValidateCtxData>,
) -> BoxofficeResult<PipelineControl> {
  let (services, purchase_id) = {
    let guard = ctx_data.read();
    let token = guard.token.as_ref().ok_or_else(|| missing("token"))?;
    (guard.services.clone(), token.purchase_id)
  };
  let ledger = &services.ledger;

  let purchase = ledger
    .find_purchase(purchase_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("purchase", purchase_id))?;
  let ticket = ledger
    .find_ticket(purchase.ticket_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("ticket", purchase.ticket_id))?;
  let event = ledger
    .find_event(ticket.event_id)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("event", ticket.event_id))?;

  let mut guard = ctx_data.write();
  guard.purchase = Some(purchase);
  guard.ticket = Some(ticket);
  guard.event = Some(event);
  Ok(PipelineControl::Continue)
}

async fn verify_signature(ctx_data: ContextData<RedemptionValidateCtxData>) -> BoxofficeResult<PipelineControl> {
  let guard = ctx_data.read();
  let token = guard.token.as_ref().ok_or_else(|| missing("token"))?;
  let purchase = guard.purchase.as_ref().ok_or_else(|| missing("purchase"))?;
  let ticket = guard.ticket.as_ref().ok_or_else(|| missing("ticket"))?;

  if !guard.services.signer.verify(token, purchase) || token.event_id != ticket.event_id {
    warn!(purchase = %purchase.id, "Redemption token signature mismatch.");
    return Err(BoxofficeError::Forbidden("redemption token signature mismatch".to_string()));
  }
  Ok(PipelineControl::Continue)
}

async fn authorize_organizer(ctx_data: ContextData<RedemptionValidateCtxData>) -> BoxofficeResult<PipelineControl> {
  let guard = ctx_data.read();
  let event = guard.event.as_ref().ok_or_else(|| missing("event"))?;
  if event.organizer_id != guard.user_id {
    warn!(event = %event.id, requester = %guard.user_id, "Redemption attempted by someone other than the organizer.");
    return Err(BoxofficeError::Forbidden("only the event organizer can redeem its tickets".to_string()));
  }
  Ok(PipelineControl::Continue)
}

async fn redeem_purchase(ctx_data: ContextData<RedemptionValidateCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, purchase) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.purchase.clone().ok_or_else(|| missing("purchase"))?)
  };
  if purchase.is_used {
    return Err(BoxofficeError::TicketAlreadyUsed);
  }

  if !services.ledger.redeem_purchase(purchase.id).await? {
    warn!(purchase = %purchase.id, "Lost the redemption race; ticket already used.");
    return Err(BoxofficeError::TicketAlreadyUsed);
  }

  let mut guard = ctx_data.write();
  let ticket = guard.ticket.as_ref().ok_or_else(|| missing("ticket"))?;
  let event = guard.event.as_ref().ok_or_else(|| missing("event"))?;
  let outcome = RedemptionOutcome {
    purchase_id: purchase.id,
    ticket_id: ticket.id,
    event_id: event.id,
    event_title: event.title.clone(),
    ticket_type: ticket.kind.clone(),
    holder_id: purchase.user_id,
    redeemed_at: Utc::now(),
  };

  info!(purchase = %purchase.id, event = %event.id, "Ticket redeemed.");
  guard.outcome = Some(outcome);
  Ok(PipelineControl::Continue)
}

fn missing(what: &str) -> BoxofficeError {
  BoxofficeError::InvalidState(format!("redemption flow reached a step without {}", what))
}
