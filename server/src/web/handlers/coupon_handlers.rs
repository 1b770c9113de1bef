// server/src/web/handlers/coupon_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
pub struct ClaimCouponPayload {
  pub code: String,
}

#[instrument(name = "handler::claim_coupon", skip(app_state, payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn claim_coupon_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ClaimCouponPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let claim = app_state.desk.claim_coupon(auth_user.user_id, &payload.code).await?;
  Ok(HttpResponse::Created().json(json!({
    "message": "Coupon claimed.",
    "coupon": claim,
  })))
}
