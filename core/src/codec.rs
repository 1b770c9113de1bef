// core/src/codec.rs

//! Authenticated encoding of `(ticket_id, coupon_id?)` into the opaque token that
//! rides inside an invoice external id (`INV-<unix_ts>-<token>`) and comes back
//! on the gateway callback.
//!
//! Token layout before base64url (no padding): `nonce(12) || ciphertext || tag(16)`,
//! AES-256-GCM over `ticket_id` or `ticket_id|coupon_id`. The gateway callback only
//! attests payment status, so the tag is what ties the line items to a ticket.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const INVOICE_PREFIX: &str = "INV";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
  #[error("encryption failed")]
  Encryption,

  #[error("external id '{0}' is not of the form INV-<unix_ts>-<token>")]
  MalformedExternalId(String),

  #[error("token is not valid base64url")]
  InvalidEncoding,

  #[error("token is truncated ({0} bytes)")]
  Truncated(usize),

  #[error("token failed integrity verification")]
  Authentication,

  #[error("token plaintext is invalid: {0}")]
  InvalidPlaintext(String),
}

/// Identity carried through the gateway and recovered on callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalReference {
  pub ticket_id: Uuid,
  pub coupon_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ExternalIdCodec {
  cipher: Aes256Gcm,
}

impl std::fmt::Debug for ExternalIdCodec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExternalIdCodec").finish_non_exhaustive()
  }
}

impl ExternalIdCodec {
  /// Derives the AES-256 key as SHA-256 of `secret`.
  pub fn from_secret(secret: impl AsRef<[u8]>) -> Self {
    let key_bytes = Sha256::digest(secret.as_ref());
    let key = Key::<Aes256Gcm>::from_slice(key_bytes.as_slice());
    Self {
      cipher: Aes256Gcm::new(key),
    }
  }

  /// Encrypts the reference under a fresh random nonce.
  pub fn encode(&self, ticket_id: Uuid, coupon_id: Option<Uuid>) -> Result<String, CodecError> {
    let plaintext = match coupon_id {
      Some(coupon_id) => format!("{}|{}", ticket_id, coupon_id),
      None => ticket_id.to_string(),
    };

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = self
      .cipher
      .encrypt(&nonce, plaintext.as_bytes())
      .map_err(|_| CodecError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(nonce.as_slice());
    sealed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(sealed))
  }

  pub fn decode(&self, token: &str) -> Result<ExternalReference, CodecError> {
    let sealed = URL_SAFE_NO_PAD
      .decode(token.as_bytes())
      .map_err(|_| CodecError::InvalidEncoding)?;
    if sealed.len() < NONCE_LEN + TAG_LEN {
      return Err(CodecError::Truncated(sealed.len()));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let plaintext = self
      .cipher
      .decrypt(Nonce::from_slice(nonce), ciphertext)
      .map_err(|_| CodecError::Authentication)?;
    let plaintext =
      String::from_utf8(plaintext).map_err(|_| CodecError::InvalidPlaintext("not utf-8".to_string()))?;

    let parts: Vec<&str> = plaintext.split('|').collect();
    match parts.as_slice() {
      [ticket] => Ok(ExternalReference {
        ticket_id: parse_id(ticket, "ticket")?,
        coupon_id: None,
      }),
      [ticket, coupon] => Ok(ExternalReference {
        ticket_id: parse_id(ticket, "ticket")?,
        coupon_id: Some(parse_id(coupon, "coupon")?),
      }),
      _ => Err(CodecError::InvalidPlaintext(format!("{} segments", parts.len()))),
    }
  }

  /// Builds the invoice external id `INV-<unix_ts>-<token>`.
  pub fn external_id(
    &self,
    issued_at: DateTime<Utc>,
    ticket_id: Uuid,
    coupon_id: Option<Uuid>,
  ) -> Result<String, CodecError> {
    let token = self.encode(ticket_id, coupon_id)?;
    Ok(format!("{}-{}-{}", INVOICE_PREFIX, issued_at.timestamp(), token))
  }

  /// Reverses `external_id`. The token itself may contain `-`, so only the
  /// first two hyphens are structural.
  pub fn decode_external_id(&self, external_id: &str) -> Result<ExternalReference, CodecError> {
    let mut segments = external_id.splitn(3, '-');
    match (segments.next(), segments.next(), segments.next()) {
      (Some(INVOICE_PREFIX), Some(ts), Some(token)) if ts.parse::<i64>().is_ok() && !token.is_empty() => {
        self.decode(token)
      }
      _ => Err(CodecError::MalformedExternalId(external_id.to_string())),
    }
  }
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, CodecError> {
  Uuid::parse_str(raw).map_err(|_| CodecError::InvalidPlaintext(format!("invalid {} id", what)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn codec() -> ExternalIdCodec {
    ExternalIdCodec::from_secret("unit-test-secret")
  }

  #[test]
  fn round_trips_with_and_without_coupon() {
    let codec = codec();
    let ticket_id = Uuid::new_v4();
    let coupon_id = Uuid::new_v4();

    let token = codec.encode(ticket_id, Some(coupon_id)).unwrap();
    assert_eq!(
      codec.decode(&token).unwrap(),
      ExternalReference {
        ticket_id,
        coupon_id: Some(coupon_id)
      }
    );

    let token = codec.encode(ticket_id, None).unwrap();
    assert_eq!(
      codec.decode(&token).unwrap(),
      ExternalReference {
        ticket_id,
        coupon_id: None
      }
    );
  }

  #[test]
  fn every_encode_uses_a_fresh_nonce() {
    let codec = codec();
    let ticket_id = Uuid::new_v4();
    assert_ne!(codec.encode(ticket_id, None).unwrap(), codec.encode(ticket_id, None).unwrap());
  }

  #[test]
  fn token_is_safe_inside_an_external_id() {
    let token = codec().encode(Uuid::new_v4(), Some(Uuid::new_v4())).unwrap();
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
  }

  #[test]
  fn rejects_flipped_last_byte() {
    let codec = codec();
    let token = codec.encode(Uuid::new_v4(), Some(Uuid::new_v4())).unwrap();
    let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    let tampered = URL_SAFE_NO_PAD.encode(raw);
    assert_eq!(codec.decode(&tampered), Err(CodecError::Authentication));
  }

  #[test]
  fn rejects_tokens_sealed_under_another_secret() {
    let token = ExternalIdCodec::from_secret("other").encode(Uuid::new_v4(), None).unwrap();
    assert_eq!(codec().decode(&token), Err(CodecError::Authentication));
  }

  #[test]
  fn rejects_truncated_and_garbage_tokens() {
    let codec = codec();
    assert_eq!(codec.decode("AAAA"), Err(CodecError::Truncated(3)));
    assert_eq!(codec.decode("not base64!"), Err(CodecError::InvalidEncoding));
  }

  #[test]
  fn rejects_more_than_two_plaintext_segments() {
    let codec = codec();
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let plaintext = format!("{}|{}|{}", Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut sealed = nonce.to_vec();
    sealed.extend(codec.cipher.encrypt(&nonce, plaintext.as_bytes()).unwrap());
    let token = URL_SAFE_NO_PAD.encode(sealed);
    assert!(matches!(codec.decode(&token), Err(CodecError::InvalidPlaintext(_))));
  }

  #[test]
  fn external_id_round_trip_and_shape() {
    let codec = codec();
    let ticket_id = Uuid::new_v4();
    let coupon_id = Some(Uuid::new_v4());
    let issued_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    let external_id = codec.external_id(issued_at, ticket_id, coupon_id).unwrap();
    assert!(external_id.starts_with("INV-1700000000-"));
    let decoded = codec.decode_external_id(&external_id).unwrap();
    assert_eq!(decoded.ticket_id, ticket_id);
    assert_eq!(decoded.coupon_id, coupon_id);
  }

  #[test]
  fn external_id_with_fewer_than_three_segments_is_rejected() {
    let codec = codec();
    assert!(matches!(
      codec.decode_external_id("INV-1700000000"),
      Err(CodecError::MalformedExternalId(_))
    ));
    assert!(matches!(codec.decode_external_id("garbage"), Err(CodecError::MalformedExternalId(_))));
  }
}
