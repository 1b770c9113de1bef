// server/src/web/routes.rs

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;
use crate::web::handlers::{coupon_handlers, payment_handlers, ticket_handlers};

async fn health_check_handler(app_state: web::Data<AppState>) -> HttpResponse {
  match sqlx::query("SELECT 1").execute(&app_state.db_pool).await {
    Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok", "database": "ok" })),
    Err(e) => {
      tracing::warn!(error = %e, "Health check could not reach the database.");
      HttpResponse::ServiceUnavailable().json(json!({ "status": "degraded", "database": "unreachable" }))
    }
  }
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/payments")
          .route("", web::post().to(payment_handlers::create_payment_handler))
          .route(
            "/notification",
            web::post().to(payment_handlers::payment_notification_handler),
          ),
      )
      .route("/coupons/claim", web::post().to(coupon_handlers::claim_coupon_handler))
      .route(
        "/purchases/{purchase_id}/redemption",
        web::get().to(ticket_handlers::redemption_token_handler),
      )
      .route("/tickets/validate", web::post().to(ticket_handlers::validate_ticket_handler)),
  );
}
