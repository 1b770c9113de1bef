// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use boxoffice::{BoxofficeError, ErrorKind};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error(transparent)]
  Desk(#[from] BoxofficeError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Short machine-readable label for the response body.
  fn label(&self) -> &'static str {
    match self {
      AppError::Validation(_) => "validation_error",
      AppError::Auth(_) => "unauthorized",
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => "internal_error",
      AppError::Desk(err) => match err.kind() {
        ErrorKind::NotFound => "not_found",
        ErrorKind::InvalidState => "invalid_state",
        ErrorKind::Forbidden => "forbidden",
        ErrorKind::MalformedInput => "malformed_input",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Upstream => "upstream_error",
        ErrorKind::Internal => "internal_error",
      },
    }
  }

  /// Caller mistakes are described; everything on our side stays opaque.
  fn public_message(&self) -> String {
    match self {
      AppError::Validation(m) | AppError::Auth(m) => m.clone(),
      AppError::Desk(err) => match err.kind() {
        ErrorKind::Upstream => "The payment provider could not complete the request.".to_string(),
        ErrorKind::Internal => "An internal error occurred.".to_string(),
        _ => err.to_string(),
      },
      _ => "An internal error occurred.".to_string(),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Desk(err) => match err {
        BoxofficeError::CouponLimitReached
        | BoxofficeError::CouponAlreadyClaimed
        | BoxofficeError::TicketAlreadyUsed
        | BoxofficeError::TicketSoldOut { .. } => StatusCode::CONFLICT,
        other => match other.kind() {
          ErrorKind::NotFound => StatusCode::NOT_FOUND,
          ErrorKind::InvalidState | ErrorKind::MalformedInput => StatusCode::BAD_REQUEST,
          ErrorKind::Forbidden => StatusCode::FORBIDDEN,
          ErrorKind::Conflict => StatusCode::CONFLICT,
          ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
          ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
      },
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Rejecting request");
    }
    HttpResponse::build(status).json(json!({
      "error": self.label(),
      "message": self.public_message(),
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
