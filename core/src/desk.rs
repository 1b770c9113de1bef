// core/src/desk.rs

//! `TicketDesk`: the surface the HTTP layer calls into.
//!
//! Each operation builds a flow context, hands it to the registry, and reads the
//! result back out of the same context once the flow has run.

use crate::codec::ExternalIdCodec;
use crate::error::{BoxofficeError, BoxofficeResult, ErrorKind, PipelineError};
use crate::flows::{
  self, CallbackCtxData, CouponClaimCtxData, IntentCtxData, RedemptionIssueCtxData, RedemptionValidateCtxData,
};
use crate::gateway::{InvoiceCallback, PaymentGateway, PayoutChannel};
use crate::ledger::Ledger;
use crate::models::UserCoupon;
use crate::pipeline::{ContextData, PipelineResult, Registry};
use crate::pricing::{FeePolicy, PriceBreakdown};
use crate::redemption::RedemptionSigner;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DeskSettings {
  pub fee_policy: FeePolicy,
  pub currency: String,
  pub invoice_duration_secs: u64,
  pub success_redirect_url: Option<String>,
  pub failure_redirect_url: Option<String>,
  /// When set, callbacks must present this token.
  pub callback_token: Option<String>,
}

impl Default for DeskSettings {
  fn default() -> Self {
    Self {
      fee_policy: FeePolicy::default(),
      currency: "IDR".to_string(),
      invoice_duration_secs: 86_400,
      success_redirect_url: None,
      failure_redirect_url: None,
      callback_token: None,
    }
  }
}

/// Collaborators and secret-derived components shared by every flow.
#[derive(Clone)]
pub struct DeskServices {
  pub ledger: Arc<dyn Ledger>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub payouts: Arc<dyn PayoutChannel>,
  pub codec: Arc<ExternalIdCodec>,
  pub signer: Arc<RedemptionSigner>,
  pub settings: Arc<DeskSettings>,
}

impl DeskServices {
  /// Derives the external-id codec and the redemption signer from `secret`.
  pub fn new(
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn PaymentGateway>,
    payouts: Arc<dyn PayoutChannel>,
    secret: impl AsRef<[u8]>,
    settings: DeskSettings,
  ) -> Self {
    Self {
      ledger,
      gateway,
      payouts,
      codec: Arc::new(ExternalIdCodec::from_secret(secret.as_ref())),
      signer: Arc::new(RedemptionSigner::new(secret.as_ref())),
      settings: Arc::new(settings),
    }
  }
}

// --- Requests and outcomes ---

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntentRequest {
  pub user_id: Uuid,
  pub ticket_id: Uuid,
  pub quantity: u32,
  pub coupon_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
  pub invoice_url: String,
  pub external_id: String,
  pub price: PriceBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayoutOutcome {
  Requested {
    payout_id: String,
    reference_id: String,
    amount: i64,
  },
  Skipped {
    reason: String,
  },
  Failed {
    reason: String,
  },
}

/// What happened to one callback delivery. Always acknowledged to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
  Fulfilled {
    payment_id: Uuid,
    purchase_ids: Vec<Uuid>,
    coupon_consumed: bool,
    payout: PayoutOutcome,
  },
  Duplicate {
    payment_id: Uuid,
  },
  Ignored {
    status: String,
  },
  Failed {
    kind: ErrorKind,
    message: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionOutcome {
  pub purchase_id: Uuid,
  pub ticket_id: Uuid,
  pub event_id: Uuid,
  pub event_title: String,
  pub ticket_type: String,
  pub holder_id: Uuid,
  pub redeemed_at: DateTime<Utc>,
}

// --- Desk ---

#[derive(Clone)]
pub struct TicketDesk {
  services: DeskServices,
  registry: Arc<Registry<BoxofficeError>>,
}

impl TicketDesk {
  pub fn new(services: DeskServices) -> Self {
    let registry = Registry::new();
    flows::register_all_flows(&registry);
    Self {
      services,
      registry: Arc::new(registry),
    }
  }

  pub fn services(&self) -> &DeskServices {
    &self.services
  }

  /// Prices the order and opens a hosted invoice. Writes nothing locally.
  #[instrument(name = "desk::build_payment_intent", skip(self), fields(user_id = %request.user_id, ticket_id = %request.ticket_id), err(Display))]
  pub async fn build_payment_intent(&self, request: IntentRequest) -> BoxofficeResult<PaymentIntent> {
    let ctx = ContextData::new(IntentCtxData::new(self.services.clone(), request, Utc::now()));
    self.registry.run(ctx.clone()).await?;

    let guard = ctx.read();
    match (&guard.invoice, &guard.external_id, guard.quote) {
      (Some(invoice), Some(external_id), Some(price)) => {
        info!(external_id = %external_id, total = price.total, "Payment intent created.");
        Ok(PaymentIntent {
          invoice_url: invoice.invoice_url.clone(),
          external_id: external_id.clone(),
          price,
        })
      }
      _ => Err(incomplete("intent")),
    }
  }

  /// Runs one callback delivery to a terminal outcome.
  ///
  /// Only a rejected callback token surfaces as `Err`; every failure after the
  /// token check is reported inside `CallbackOutcome::Failed` so the gateway
  /// still receives an acknowledgement.
  #[instrument(name = "desk::process_payment_callback", skip_all, fields(invoice_id = %callback.id, external_id = %callback.external_id), err(Display))]
  pub async fn process_payment_callback(
    &self,
    callback: InvoiceCallback,
    presented_token: Option<&str>,
  ) -> BoxofficeResult<CallbackOutcome> {
    let ctx = ContextData::new(CallbackCtxData::new(
      self.services.clone(),
      callback,
      presented_token.map(str::to_string),
    ));

    let run = self.registry.run(ctx.clone()).await;

    let mut guard = ctx.write();
    match run {
      Err(e) if !guard.token_verified => Err(e),
      Err(e) => {
        error!(error = %e, kind = ?e.kind(), "Callback processing failed.");
        Ok(CallbackOutcome::Failed {
          kind: e.kind(),
          message: e.to_string(),
        })
      }
      Ok(_) => match guard.outcome.take() {
        Some(outcome) => Ok(outcome),
        None => {
          warn!("Callback flow finished without recording an outcome.");
          Ok(CallbackOutcome::Failed {
            kind: ErrorKind::Internal,
            message: incomplete("callback").to_string(),
          })
        }
      },
    }
  }

  #[instrument(name = "desk::issue_redemption_token", skip(self), err(Display))]
  pub async fn issue_redemption_token(&self, purchase_id: Uuid, user_id: Uuid) -> BoxofficeResult<String> {
    let ctx = ContextData::new(RedemptionIssueCtxData::new(self.services.clone(), purchase_id, user_id));
    self.registry.run(ctx.clone()).await?;

    let token = ctx.read().token.as_ref().map(ToString::to_string);
    token.ok_or_else(|| incomplete("redemption issue"))
  }

  #[instrument(name = "desk::validate_redemption_token", skip(self, token), err(Display))]
  pub async fn validate_redemption_token(&self, token: &str, user_id: Uuid) -> BoxofficeResult<RedemptionOutcome> {
    let ctx = ContextData::new(RedemptionValidateCtxData::new(self.services.clone(), token.to_string(), user_id));
    if self.registry.run(ctx.clone()).await? == PipelineResult::Stopped {
      return Err(incomplete("redemption validation"));
    }

    let outcome = ctx.read().outcome.clone();
    outcome.ok_or_else(|| incomplete("redemption validation"))
  }

  #[instrument(name = "desk::claim_coupon", skip(self), err(Display))]
  pub async fn claim_coupon(&self, user_id: Uuid, code: &str) -> BoxofficeResult<UserCoupon> {
    let ctx = ContextData::new(CouponClaimCtxData::new(self.services.clone(), user_id, code.to_string(), Utc::now()));
    self.registry.run(ctx.clone()).await?;

    let claim = ctx.read().claim.clone();
    claim.ok_or_else(|| incomplete("coupon claim"))
  }
}

fn incomplete(flow: &str) -> BoxofficeError {
  BoxofficeError::Pipeline(PipelineError::Internal(format!("{} flow finished without a result", flow)))
}
