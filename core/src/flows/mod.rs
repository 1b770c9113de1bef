// core/src/flows/mod.rs

//! Pipeline definitions behind each `TicketDesk` operation.

pub mod callback_flow;
pub mod contexts;
pub mod coupon_flow;
pub mod intent_flow;
pub mod redemption_flow;

pub use contexts::{CallbackCtxData, CouponClaimCtxData, IntentCtxData, RedemptionIssueCtxData, RedemptionValidateCtxData};

use crate::error::BoxofficeError;
use crate::pipeline::Registry;

/// Registers every flow with `registry`. Called once per `TicketDesk`.
pub fn register_all_flows(registry: &Registry<BoxofficeError>) {
  tracing::debug!("Registering boxoffice flows.");

  intent_flow::register_intent_flow(registry);
  callback_flow::register_callback_flow(registry);
  redemption_flow::register_redemption_flows(registry);
  coupon_flow::register_coupon_flow(registry);
}
