//! HTTPS client for the payment processor plus webhook signature
//! verification. Everything the rest of the system knows about the processor
//! goes through the `PaymentProcessor` trait; this crate is the only place
//! that speaks its wire format.

mod client;
mod types;
mod webhook;

pub use client::HttpProcessor;
pub use webhook::{ProcessorEvent, WebhookError, WebhookVerifier};
