// server/src/web/handlers/mod.rs

pub mod coupon_handlers;
pub mod payment_handlers;
pub mod ticket_handlers;
