// core/src/redemption.rs

//! Redemption tokens presented at the venue.
//!
//! Wire form: `purchase:<uuid>;ticket:<uuid>;event:<uuid>;signature:<hex>`, where the
//! signature is HMAC-SHA256 over `<purchase_id>:<payment_id>:<user_id>`. The
//! identifiers are plaintext, so the MAC is the only thing standing between a
//! guessed purchase id and a redeemed ticket.

use crate::error::BoxofficeError;
use crate::models::Purchase;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct RedemptionSigner {
  secret: Vec<u8>,
}

impl fmt::Debug for RedemptionSigner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RedemptionSigner").finish_non_exhaustive()
  }
}

impl RedemptionSigner {
  pub fn new(secret: impl AsRef<[u8]>) -> Self {
    Self {
      secret: secret.as_ref().to_vec(),
    }
  }

  pub fn signature(&self, purchase_id: Uuid, payment_id: Uuid, user_id: Uuid) -> String {
    let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
    mac.update(format!("{}:{}:{}", purchase_id, payment_id, user_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
  }

  pub fn issue(&self, purchase: &Purchase, event_id: Uuid) -> RedemptionToken {
    RedemptionToken {
      purchase_id: purchase.id,
      ticket_id: purchase.ticket_id,
      event_id,
      signature: self.signature(purchase.id, purchase.payment_id, purchase.user_id),
    }
  }

  /// Recomputes the MAC from the stored purchase and compares in constant time.
  pub fn verify(&self, token: &RedemptionToken, purchase: &Purchase) -> bool {
    if token.purchase_id != purchase.id || token.ticket_id != purchase.ticket_id {
      return false;
    }
    let expected = self.signature(purchase.id, purchase.payment_id, purchase.user_id);
    expected.as_bytes().ct_eq(token.signature.as_bytes()).into()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionToken {
  pub purchase_id: Uuid,
  pub ticket_id: Uuid,
  pub event_id: Uuid,
  pub signature: String,
}

impl fmt::Display for RedemptionToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "purchase:{};ticket:{};event:{};signature:{}",
      self.purchase_id, self.ticket_id, self.event_id, self.signature
    )
  }
}

impl FromStr for RedemptionToken {
  type Err = BoxofficeError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let segments: Vec<&str> = raw.trim().split(';').collect();
    let [purchase, ticket, event, signature] = segments.as_slice() else {
      return Err(malformed(format!("expected 4 segments, found {}", segments.len())));
    };

    let signature = field(signature, "signature")?;
    if signature.is_empty() {
      return Err(malformed("empty signature".to_string()));
    }

    Ok(RedemptionToken {
      purchase_id: uuid_field(purchase, "purchase")?,
      ticket_id: uuid_field(ticket, "ticket")?,
      event_id: uuid_field(event, "event")?,
      signature: signature.to_string(),
    })
  }
}

fn field<'a>(segment: &'a str, key: &str) -> Result<&'a str, BoxofficeError> {
  segment
    .strip_prefix(key)
    .and_then(|rest| rest.strip_prefix(':'))
    .ok_or_else(|| malformed(format!("missing '{}' segment", key)))
}

fn uuid_field(segment: &str, key: &str) -> Result<Uuid, BoxofficeError> {
  let value = field(segment, key)?;
  Uuid::parse_str(value).map_err(|_| malformed(format!("'{}' is not a valid id", key)))
}

fn malformed(detail: String) -> BoxofficeError {
  BoxofficeError::MalformedInput(format!("redemption token: {}", detail))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn purchase() -> Purchase {
    Purchase {
      id: Uuid::new_v4(),
      ticket_id: Uuid::new_v4(),
      user_id: Uuid::new_v4(),
      payment_id: Uuid::new_v4(),
      total: 10_000,
      is_used: false,
    }
  }

  #[test]
  fn issued_token_verifies_after_a_text_round_trip() {
    let signer = RedemptionSigner::new("unit-test-secret");
    let purchase = purchase();
    let token = signer.issue(&purchase, Uuid::new_v4());

    let parsed: RedemptionToken = token.to_string().parse().unwrap();
    assert_eq!(parsed, token);
    assert!(signer.verify(&parsed, &purchase));
  }

  #[test]
  fn any_signature_change_fails_verification() {
    let signer = RedemptionSigner::new("unit-test-secret");
    let purchase = purchase();
    let token = signer.issue(&purchase, Uuid::new_v4());

    for index in 0..token.signature.len() {
      let mut tampered = token.clone();
      let mut bytes = tampered.signature.into_bytes();
      bytes[index] = if bytes[index] == b'0' { b'1' } else { b'0' };
      tampered.signature = String::from_utf8(bytes).unwrap();
      assert!(!signer.verify(&tampered, &purchase), "index {} accepted", index);
    }
  }

  #[test]
  fn signature_is_bound_to_the_secret_and_the_purchase() {
    let purchase = purchase();
    let token = RedemptionSigner::new("other-secret").issue(&purchase, Uuid::new_v4());
    assert!(!RedemptionSigner::new("unit-test-secret").verify(&token, &purchase));

    let signer = RedemptionSigner::new("unit-test-secret");
    let mut token = signer.issue(&purchase, Uuid::new_v4());
    token.purchase_id = Uuid::new_v4();
    assert!(!signer.verify(&token, &purchase));
  }

  #[test]
  fn parsing_rejects_malformed_tokens() {
    let id = Uuid::new_v4();
    for raw in [
      "".to_string(),
      format!("purchase:{};ticket:{};event:{}", id, id, id),
      format!("purchase:{};ticket:{};event:{};signature:ab;extra:1", id, id, id),
      format!("ticket:{};purchase:{};event:{};signature:ab", id, id, id),
      format!("purchase:nope;ticket:{};event:{};signature:ab", id, id),
      format!("purchase:{};ticket:{};event:{};signature:", id, id, id),
    ] {
      assert!(
        matches!(raw.parse::<RedemptionToken>(), Err(BoxofficeError::MalformedInput(_))),
        "accepted {:?}",
        raw
      );
    }
  }
}
