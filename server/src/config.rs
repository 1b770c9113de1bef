// server/src/config.rs

use crate::errors::{AppError, Result};
use boxoffice::{DeskSettings, FeePolicy};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub database_max_connections: u32,
  pub run_migrations: bool,

  /// Keys the external-id codec, the redemption signer and bearer-token checks.
  pub app_secret: String,

  pub xendit_secret_key: String,
  pub xendit_base_url: String,
  pub xendit_callback_token: Option<String>,
  pub gateway_timeout: Duration,

  pub admin_fee_bps: u32,
  pub currency: String,
  pub invoice_duration_secs: u64,
  pub success_redirect_url: Option<String>,
  pub failure_redirect_url: Option<String>,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let optional = |var_name: &str| get_env(var_name).ok().filter(|value| !value.trim().is_empty());

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let database_max_connections = get_env("DATABASE_MAX_CONNECTIONS")
      .unwrap_or_else(|_| "10".to_string())
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", e)))?;
    let run_migrations = get_env("RUN_MIGRATIONS")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid RUN_MIGRATIONS value: {}", e)))?;

    let app_secret = get_env("APP_SECRET")?;
    if app_secret.len() < 16 {
      return Err(AppError::Config("APP_SECRET must be at least 16 characters".to_string()));
    }

    let xendit_secret_key = get_env("XENDIT_SECRET_KEY")?;
    let xendit_base_url = get_env("XENDIT_BASE_URL")
      .unwrap_or_else(|_| "https://api.xendit.co".to_string())
      .trim_end_matches('/')
      .to_string();
    let allow_unverified_callbacks = get_env("ALLOW_UNVERIFIED_CALLBACKS")
      .unwrap_or_else(|_| "false".to_string())
      .parse::<bool>()
      .map_err(|e| AppError::Config(format!("Invalid ALLOW_UNVERIFIED_CALLBACKS value: {}", e)))?;
    let xendit_callback_token = callback_token(optional("XENDIT_CALLBACK_TOKEN"), allow_unverified_callbacks)?;
    let gateway_timeout = get_env("GATEWAY_TIMEOUT_SECS")
      .unwrap_or_else(|_| "15".to_string())
      .parse::<u64>()
      .map(Duration::from_secs)
      .map_err(|e| AppError::Config(format!("Invalid GATEWAY_TIMEOUT_SECS: {}", e)))?;

    let admin_fee_bps = get_env("ADMIN_FEE_BPS")
      .unwrap_or_else(|_| "150".to_string())
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid ADMIN_FEE_BPS: {}", e)))?;
    if admin_fee_bps > 10_000 {
      return Err(AppError::Config(format!("ADMIN_FEE_BPS out of range: {}", admin_fee_bps)));
    }
    let currency = get_env("CURRENCY").unwrap_or_else(|_| "IDR".to_string());
    let invoice_duration_secs = get_env("INVOICE_DURATION_SECS")
      .unwrap_or_else(|_| "86400".to_string())
      .parse::<u64>()
      .map_err(|e| AppError::Config(format!("Invalid INVOICE_DURATION_SECS: {}", e)))?;

    tracing::info!(
      host = %server_host,
      port = server_port,
      gateway = %xendit_base_url,
      callback_token_required = xendit_callback_token.is_some(),
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      database_max_connections,
      run_migrations,
      app_secret,
      xendit_secret_key,
      xendit_base_url,
      xendit_callback_token,
      gateway_timeout,
      admin_fee_bps,
      currency,
      invoice_duration_secs,
      success_redirect_url: optional("SUCCESS_REDIRECT_URL"),
      failure_redirect_url: optional("FAILURE_REDIRECT_URL"),
    })
  }

  pub fn desk_settings(&self) -> DeskSettings {
    DeskSettings {
      fee_policy: FeePolicy::from_bps(self.admin_fee_bps),
      currency: self.currency.clone(),
      invoice_duration_secs: self.invoice_duration_secs,
      success_redirect_url: self.success_redirect_url.clone(),
      failure_redirect_url: self.failure_redirect_url.clone(),
      callback_token: self.xendit_callback_token.clone(),
    }
  }
}

/// A callback token is mandatory unless unverified callbacks were explicitly allowed.
fn callback_token(token: Option<String>, allow_unverified: bool) -> Result<Option<String>> {
  match token {
    Some(token) => Ok(Some(token)),
    None if allow_unverified => {
      tracing::warn!("XENDIT_CALLBACK_TOKEN is not set; payment callbacks will be accepted unverified.");
      Ok(None)
    }
    None => Err(AppError::Config(
      "XENDIT_CALLBACK_TOKEN is required (set ALLOW_UNVERIFIED_CALLBACKS=true to run without it)".to_string(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_callback_token_is_a_config_error() {
    assert!(matches!(callback_token(None, false), Err(AppError::Config(_))));
  }

  #[test]
  fn unverified_callbacks_need_the_explicit_flag() {
    assert_eq!(callback_token(None, true).unwrap(), None);
  }

  #[test]
  fn configured_token_is_kept_regardless_of_flag() {
    for allow in [false, true] {
      assert_eq!(
        callback_token(Some("cb-token".to_string()), allow).unwrap(),
        Some("cb-token".to_string())
      );
    }
  }
}
