// core/src/error.rs

//! Error types for the fulfillment pipelines and the step engine that runs them.

use crate::codec::CodecError;
use crate::gateway::GatewayError;
use crate::ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the step engine itself rather than by a step handler.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Context type mismatch while dispatching (expected {expected_type})")]
  TypeMismatch { expected_type: String },

  #[error("No pipeline registered for context type {context_type}")]
  NotRegistered { context_type: String },

  #[error("Internal pipeline error: {0}")]
  Internal(String),
}

/// Coarse classification every `BoxofficeError` falls into.
///
/// The HTTP layer maps kinds to status codes; callback outcomes report the kind verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  InvalidState,
  Forbidden,
  MalformedInput,
  Upstream,
  Conflict,
  Internal,
}

#[derive(Debug, Error)]
pub enum BoxofficeError {
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("Invalid state: {0}")]
  InvalidState(String),

  #[error("Coupon has not been claimed by this user")]
  CouponUnclaimed,

  #[error("Coupon has already been used")]
  CouponAlreadyUsed,

  #[error("Coupon usage limit reached")]
  CouponLimitReached,

  #[error("Coupon has already been claimed by this user")]
  CouponAlreadyClaimed,

  #[error("Ticket has already been used")]
  TicketAlreadyUsed,

  #[error("Ticket {ticket_id} has only {remaining} units left")]
  TicketSoldOut { ticket_id: Uuid, remaining: i64 },

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Malformed input: {0}")]
  MalformedInput(String),

  #[error("Payment provider error: {0}")]
  Upstream(#[from] GatewayError),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Failed to record payment and purchases: {0}")]
  Fulfillment(#[source] LedgerError),

  #[error("Storage error: {0}")]
  Storage(#[source] LedgerError),

  #[error("Pipeline error: {0}")]
  Pipeline(#[from] PipelineError),
}

impl BoxofficeError {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    BoxofficeError::NotFound {
      entity,
      id: id.to_string(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      BoxofficeError::NotFound { .. } => ErrorKind::NotFound,
      BoxofficeError::InvalidState(_)
      | BoxofficeError::CouponUnclaimed
      | BoxofficeError::CouponAlreadyUsed
      | BoxofficeError::CouponLimitReached
      | BoxofficeError::CouponAlreadyClaimed
      | BoxofficeError::TicketAlreadyUsed
      | BoxofficeError::TicketSoldOut { .. } => ErrorKind::InvalidState,
      BoxofficeError::Forbidden(_) => ErrorKind::Forbidden,
      BoxofficeError::MalformedInput(_) => ErrorKind::MalformedInput,
      BoxofficeError::Upstream(_) => ErrorKind::Upstream,
      BoxofficeError::Conflict(_) => ErrorKind::Conflict,
      BoxofficeError::Fulfillment(_) | BoxofficeError::Storage(_) | BoxofficeError::Pipeline(_) => {
        ErrorKind::Internal
      }
    }
  }
}

impl From<CodecError> for BoxofficeError {
  fn from(err: CodecError) -> Self {
    BoxofficeError::MalformedInput(format!("external reference rejected: {}", err))
  }
}

// Plain reads surface as Storage; the fulfillment flow wraps its own failures
// in `Fulfillment` explicitly.
impl From<LedgerError> for BoxofficeError {
  fn from(err: LedgerError) -> Self {
    match err {
      LedgerError::CouponLimitReached => BoxofficeError::CouponLimitReached,
      LedgerError::CouponAlreadyClaimed => BoxofficeError::CouponAlreadyClaimed,
      LedgerError::DuplicateTransaction(transaction_id) => {
        BoxofficeError::Conflict(format!("transaction {} already recorded", transaction_id))
      }
      other => BoxofficeError::Storage(other),
    }
  }
}

pub type BoxofficeResult<T, E = BoxofficeError> = std::result::Result<T, E>;
