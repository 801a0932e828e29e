//! Webhook fan-out for alerts and reports.
//!
//! A payload is posted to every destination concurrently. Delivery succeeds
//! overall when at least one destination accepts it; only a total failure is
//! surfaced to the caller.

pub mod payload;
pub mod webhook;

pub use payload::{AlertPayload, Payload, ReportPayload};
pub use webhook::{DryRunTransport, UreqTransport, WebhookNotifier};
