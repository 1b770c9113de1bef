// core/src/models/mod.rs

//! Entities the fulfillment pipelines read and write through the `Ledger`.
//!
//! Amounts are integers in the currency's smallest unit.

pub mod coupon;
pub mod event;
pub mod payment;
pub mod payout;
pub mod purchase;
pub mod ticket;
pub mod user;

pub use coupon::{Coupon, UserCoupon};
pub use event::Event;
pub use payment::Payment;
pub use payout::PayoutAccount;
pub use purchase::Purchase;
pub use ticket::Ticket;
pub use user::User;
