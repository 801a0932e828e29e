//! Quota data sources.
//!
//! The monitor only sees the `QuotaSource` trait. `AccountQuotaSource` reads
//! the locally stored provider credentials and fetches usage directly:
//! - Claude via the OAuth usage API
//! - Codex from the rate limits recorded in its session files

pub mod api_client;
pub mod credentials;
pub mod source;

pub use source::{AccountQuotaSource, QuotaSource};
