// server/src/services/auth.rs

//! Bearer-token verification. Tokens are issued elsewhere; this side only checks
//! the HS256 signature and expiry and reads the `user_id` claim.

use crate::errors::AppError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  pub user_id: Uuid,
  pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
  decoding_key: DecodingKey,
  validation: Validation,
}

impl TokenVerifier {
  pub fn new(secret: &str) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp"]);
    Self {
      decoding_key: DecodingKey::from_secret(secret.as_bytes()),
      validation,
    }
  }

  #[instrument(name = "auth::verify_bearer", skip_all, err(Display))]
  pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
      debug!(error = %e, "Bearer token rejected.");
      AppError::Auth("Invalid or expired bearer token.".to_string())
    })?;
    Ok(data.claims)
  }

  /// Pulls the token out of an `Authorization: Bearer ...` header value.
  pub fn verify_header(&self, header: Option<&str>) -> Result<Claims, AppError> {
    let token = header
      .and_then(|value| value.strip_prefix("Bearer "))
      .map(str::trim)
      .filter(|token| !token.is_empty())
      .ok_or_else(|| AppError::Auth("Missing bearer token.".to_string()))?;
    self.verify(token)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, Utc};
  use jsonwebtoken::{encode, EncodingKey, Header};

  const SECRET: &str = "a-test-secret-of-sufficient-length";

  fn token(secret: &str, user_id: Uuid, expires_in: Duration) -> String {
    let claims = Claims {
      user_id,
      exp: (Utc::now() + expires_in).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
  }

  #[test]
  fn accepts_a_valid_token() {
    let user_id = Uuid::new_v4();
    let verifier = TokenVerifier::new(SECRET);

    let claims = verifier
      .verify_header(Some(&format!("Bearer {}", token(SECRET, user_id, Duration::hours(1)))))
      .unwrap();

    assert_eq!(claims.user_id, user_id);
  }

  #[test]
  fn rejects_wrong_key_expired_and_missing_tokens() {
    let verifier = TokenVerifier::new(SECRET);
    let user_id = Uuid::new_v4();

    let forged = token("another-secret-entirely-here", user_id, Duration::hours(1));
    assert!(matches!(verifier.verify(&forged), Err(AppError::Auth(_))));

    let expired = token(SECRET, user_id, Duration::hours(-2));
    assert!(matches!(verifier.verify(&expired), Err(AppError::Auth(_))));

    assert!(matches!(verifier.verify_header(None), Err(AppError::Auth(_))));
    assert!(matches!(verifier.verify_header(Some("Basic abc")), Err(AppError::Auth(_))));
    assert!(matches!(verifier.verify_header(Some("Bearer ")), Err(AppError::Auth(_))));
  }
}
