// src/lib.rs

//! Boxoffice: payment-to-ticket fulfillment for an event ticketing backend.
//!
//! The crate covers the part of a ticketing platform that touches money and
//! entry to the venue:
//!  - Pricing an order and opening a hosted invoice at the payment gateway.
//!  - Turning the gateway's paid callback into one payment and one purchase per
//!    ticket unit, consuming the coupon in the same unit of work, then paying
//!    the organizer.
//!  - Issuing signed redemption tokens and redeeming them exactly once.
//!  - Claiming limited-use coupons.
//!
//! Every operation is an async step pipeline (see [`pipeline`]) run through a
//! [`TicketDesk`]. Storage and the payment provider are traits
//! ([`Ledger`], [`PaymentGateway`], [`PayoutChannel`]) implemented by the
//! application.

pub mod codec;
pub mod desk;
pub mod error;
pub mod flows;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod redemption;

// --- Re-exports for the Public API ---

pub use crate::codec::{CodecError, ExternalIdCodec, ExternalReference};
pub use crate::desk::{
  CallbackOutcome, DeskServices, DeskSettings, IntentRequest, PaymentIntent, PayoutOutcome, RedemptionOutcome,
  TicketDesk,
};
pub use crate::error::{BoxofficeError, BoxofficeResult, ErrorKind, PipelineError};
pub use crate::gateway::{
  GatewayError, Invoice, InvoiceCallback, InvoiceRequest, InvoiceStatus, PaymentGateway, PayoutChannel,
  PayoutReceipt, PayoutRequest,
};
pub use crate::ledger::{FulfillmentOrder, FulfillmentReceipt, Ledger, LedgerError, LedgerResult};
pub use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineResult, Registry};
pub use crate::pricing::{FeePolicy, PriceBreakdown};
pub use crate::redemption::{RedemptionSigner, RedemptionToken};
