// server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use boxoffice::{CallbackOutcome, IntentRequest, InvoiceCallback, PaymentIntent};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

#[derive(Deserialize, Debug)]
pub struct CreatePaymentPayload {
  pub ticket_id: Uuid,
  pub quantity: u32,
  #[serde(default)]
  pub coupon_id: Option<Uuid>,
}

#[instrument(
  name = "handler::create_payment",
  skip(app_state, payload, auth_user),
  fields(user_id = %auth_user.user_id, ticket_id = %payload.ticket_id, quantity = payload.quantity)
)]
pub async fn create_payment_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreatePaymentPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let intent = app_state
    .desk
    .build_payment_intent(IntentRequest {
      user_id: auth_user.user_id,
      ticket_id: payload.ticket_id,
      quantity: payload.quantity,
      coupon_id: payload.coupon_id,
    })
    .await?;

  Ok(HttpResponse::Ok().json(intent_body(&intent)))
}

/// The external id stays server-side: it is the gateway's attribution token.
fn intent_body(intent: &PaymentIntent) -> serde_json::Value {
  json!({
    "invoice_url": intent.invoice_url,
    "subtotal": intent.price.subtotal,
    "discount": intent.price.discount,
    "admin_fee": intent.price.admin_fee,
    "total": intent.price.total,
  })
}

/// Gateway callback. Once the body parses (and the token, if configured,
/// matches) the gateway always gets a 200 so it stops redelivering; the body
/// says what happened.
#[instrument(name = "handler::payment_notification", skip_all, fields(payload_bytes = body.len()))]
pub async fn payment_notification_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let callback: InvoiceCallback = serde_json::from_slice(&body).map_err(|e| {
    warn!(error = %e, "Unparsable payment callback.");
    AppError::Validation(format!("Invalid callback payload: {}", e))
  })?;
  let presented_token = req
    .headers()
    .get(CALLBACK_TOKEN_HEADER)
    .and_then(|value| value.to_str().ok());

  let outcome = app_state.desk.process_payment_callback(callback, presented_token).await?;
  match &outcome {
    CallbackOutcome::Failed { kind, .. } => warn!(?kind, "Callback acknowledged without fulfillment."),
    other => info!(outcome = ?other, "Callback acknowledged."),
  }
  Ok(HttpResponse::Ok().json(outcome))
}

#[cfg(test)]
mod tests {
  use super::*;
  use boxoffice::PriceBreakdown;

  #[test]
  fn intent_body_does_not_expose_the_external_id() {
    let intent = PaymentIntent {
      invoice_url: "https://checkout.example/inv_1".to_string(),
      external_id: "INV-1700000000-secret".to_string(),
      price: PriceBreakdown {
        unit_price: 10_000,
        quantity: 3,
        gross: 30_000,
        discount: 3_000,
        subtotal: 27_000,
        admin_fee: 405,
        total: 27_405,
      },
    };

    let body = intent_body(&intent);

    assert!(body.get("external_id").is_none());
    assert!(!body.to_string().contains("INV-1700000000-secret"));
    assert_eq!(body["invoice_url"], "https://checkout.example/inv_1");
    assert_eq!(body["total"], 27_405);
  }
}
