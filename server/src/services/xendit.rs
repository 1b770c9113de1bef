// server/src/services/xendit.rs

//! reqwest clients for the hosted-invoice and payout endpoints.
//!
//! Both authenticate with the secret API key as the basic-auth username and an
//! empty password.

use async_trait::async_trait;
use boxoffice::{GatewayError, Invoice, InvoiceRequest, PaymentGateway, PayoutChannel, PayoutReceipt, PayoutRequest};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{info, instrument, warn};

const INVOICES_PATH: &str = "/v2/invoices";
const PAYOUTS_PATH: &str = "/v2/payouts";
const IDEMPOTENCY_HEADER: &str = "Idempotency-key";

/// Shared HTTP plumbing for both endpoints.
#[derive(Clone)]
pub struct XenditClient {
  http: Client,
  base_url: String,
  secret_key: String,
}

impl XenditClient {
  pub fn new(base_url: &str, secret_key: &str, timeout: Duration) -> Result<Self, GatewayError> {
    let http = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      secret_key: secret_key.to_string(),
    })
  }

  fn post(&self, path: &str) -> RequestBuilder {
    self
      .http
      .post(format!("{}{}", self.base_url, path))
      .basic_auth(&self.secret_key, Some(""))
  }

  async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, GatewayError> {
    let response = request.send().await.map_err(transport_error)?;
    read_response(response).await
  }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
  if err.is_timeout() {
    GatewayError::Timeout
  } else {
    GatewayError::Transport(err.to_string())
  }
}

async fn read_response<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
  let status = response.status();
  let body = response.text().await.map_err(transport_error)?;
  if !status.is_success() {
    warn!(status = status.as_u16(), "Payment provider rejected the request.");
    return Err(GatewayError::Rejected {
      status: status.as_u16(),
      body,
    });
  }
  serde_json::from_str(&body).map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))
}

#[async_trait]
impl PaymentGateway for XenditClient {
  #[instrument(name = "xendit::create_invoice", skip_all, fields(external_id = %request.external_id, amount = request.amount), err(Display))]
  async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
    let invoice: Invoice = Self::send(self.post(INVOICES_PATH).json(&request)).await?;
    info!(invoice_id = %invoice.id, "Invoice created.");
    Ok(invoice)
  }
}

#[async_trait]
impl PayoutChannel for XenditClient {
  #[instrument(name = "xendit::create_payout", skip_all, fields(reference_id = %request.reference_id, amount = request.amount), err(Display))]
  async fn create_payout(&self, request: PayoutRequest) -> Result<PayoutReceipt, GatewayError> {
    let builder = self
      .post(PAYOUTS_PATH)
      .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
      .json(&request);
    let receipt: PayoutReceipt = Self::send(builder).await?;
    info!(payout_id = %receipt.id, status = %receipt.status, "Payout requested.");
    Ok(receipt)
  }
}
