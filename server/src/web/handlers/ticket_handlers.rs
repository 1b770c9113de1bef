// server/src/web/handlers/ticket_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

/// Token the holder shows at the door, rendered into a QR code client-side.
#[instrument(name = "handler::redemption_token", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn redemption_token_handler(
  app_state: web::Data<AppState>,
  purchase_id: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let token = app_state
    .desk
    .issue_redemption_token(purchase_id.into_inner(), auth_user.user_id)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

#[derive(Deserialize)]
pub struct ValidateTicketPayload {
  pub token: String,
}

#[instrument(name = "handler::validate_ticket", skip(app_state, payload, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn validate_ticket_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ValidateTicketPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state
    .desk
    .validate_redemption_token(&payload.token, auth_user.user_id)
    .await?;
  info!(purchase_id = %outcome.purchase_id, event = %outcome.event_title, "Ticket admitted.");
  Ok(HttpResponse::Ok().json(json!({
    "message": "Ticket is valid.",
    "ticket": outcome,
  })))
}
