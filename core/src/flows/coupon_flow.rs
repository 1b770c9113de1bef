// core/src/flows/coupon_flow.rs

//! Coupon claim: record that a user holds one of a coupon's limited slots.

use super::contexts::CouponClaimCtxData;
use crate::error::{BoxofficeError, BoxofficeResult};
use crate::pipeline::{ContextData, Pipeline, PipelineControl, Registry};
use tracing::{info, warn};

pub fn register_coupon_flow(registry: &Registry<BoxofficeError>) {
  let mut p = Pipeline::<CouponClaimCtxData, BoxofficeError>::new(
    "coupon_claim",
    &[
      ("find_coupon_by_code", false, None),
      ("ensure_not_expired", false, None),
      ("record_claim", false, None),
    ],
  );

  p.on_step("find_coupon_by_code", find_coupon_by_code);
  p.on_step("ensure_not_expired", ensure_not_expired);
  p.on_step("record_claim", record_claim);

  registry.register_pipeline(p);
}

async fn find_coupon_by_code(ctx_data: ContextData<CouponClaimCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, code) = {
    let guard = ctx_data.read();
    (guard.services.clone(), guard.code.trim().to_string())
  };
  if code.is_empty() {
    return Err(BoxofficeError::MalformedInput("coupon code is empty".to_string()));
  }

  let coupon = services
    .ledger
    .find_coupon_by_code(&code)
    .await?
    .ok_or_else(|| BoxofficeError::not_found("coupon", &code))?;
  ctx_data.write().coupon = Some(coupon);
  Ok(PipelineControl::Continue)
}

async fn ensure_not_expired(ctx_data: ContextData<CouponClaimCtxData>) -> BoxofficeResult<PipelineControl> {
  let guard = ctx_data.read();
  let coupon = guard.coupon.as_ref().ok_or_else(|| missing("coupon"))?;
  if coupon.is_expired_at(guard.now) {
    warn!(coupon = %coupon.id, expired_at = %coupon.expired_at, "Claim attempted on an expired coupon.");
    return Err(BoxofficeError::InvalidState("coupon has expired".to_string()));
  }
  Ok(PipelineControl::Continue)
}

async fn record_claim(ctx_data: ContextData<CouponClaimCtxData>) -> BoxofficeResult<PipelineControl> {
  let (services, user_id, coupon) = {
    let guard = ctx_data.read();
    let coupon = guard.coupon.clone().ok_or_else(|| missing("coupon"))?;
    (guard.services.clone(), guard.user_id, coupon)
  };

  let claim = services.ledger.claim_coupon(user_id, &coupon).await?;

  info!(coupon = %coupon.id, user = %user_id, "Coupon claimed.");
  ctx_data.write().claim = Some(claim);
  Ok(PipelineControl::Continue)
}

fn missing(what: &str) -> BoxofficeError {
  BoxofficeError::InvalidState(format!("coupon flow reached a step without {}", what))
}
