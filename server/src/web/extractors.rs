// server/src/web/extractors.rs

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

/// Caller identity taken from a verified `Authorization: Bearer` token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
      return ready(Err(AppError::Internal("application state is not configured".to_string())));
    };
    let header_value = req.headers().get(header::AUTHORIZATION).and_then(|h| h.to_str().ok());

    let result = state
      .tokens
      .verify_header(header_value)
      .map(|claims| AuthenticatedUser { user_id: claims.user_id })
      .map_err(|e| {
        warn!(path = %req.path(), "Rejected unauthenticated request.");
        e
      });
    ready(result)
  }
}
