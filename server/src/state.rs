// server/src/state.rs

use crate::services::TokenVerifier;
use boxoffice::TicketDesk;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub db_pool: PgPool,
  pub desk: TicketDesk,
  pub tokens: Arc<TokenVerifier>,
}
