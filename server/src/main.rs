// server/src/main.rs

mod config;
mod db;
mod errors;
mod services;
mod state;
mod web;

use crate::config::AppConfig;
use crate::db::PgLedger;
use crate::errors::AppError;
use crate::services::{TokenVerifier, XenditClient};
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use boxoffice::{DeskServices, TicketDesk};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  init_tracing();

  tracing::info!("Starting boxoffice server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(e.into());
    }
  };

  let db_pool = PgPoolOptions::new()
    .max_connections(app_config.database_max_connections)
    .connect(&app_config.database_url)
    .await
    .map_err(|e| {
      let err = AppError::from(e);
      tracing::error!(error = %err, "Failed to connect to the database.");
      err
    })?;
  tracing::info!("Successfully connected to the database.");

  let ledger = PgLedger::new(db_pool.clone());
  if app_config.run_migrations {
    ledger.migrate().await.map_err(|e| {
      tracing::error!(error = %e, "Failed to apply database migrations.");
      e
    })?;
    tracing::info!("Database migrations applied.");
  }

  let xendit = Arc::new(XenditClient::new(
    &app_config.xendit_base_url,
    &app_config.xendit_secret_key,
    app_config.gateway_timeout,
  )?);
  let services = DeskServices::new(
    Arc::new(ledger),
    xendit.clone(),
    xendit,
    app_config.app_secret.as_bytes(),
    app_config.desk_settings(),
  );
  let desk = TicketDesk::new(services);
  tracing::info!("Fulfillment pipelines registered.");

  let app_state = AppState {
    db_pool,
    desk,
    tokens: Arc::new(TokenVerifier::new(&app_config.app_secret)),
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  Ok(())
}
