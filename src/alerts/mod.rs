//! Threshold alerting for quota windows.
//!
//! - `tier` classifies a utilization percentage into the highest tier reached
//! - `state` persists which tiers were already alerted per window
//! - `engine` turns a snapshot plus state into pending alerts and the next state

pub mod engine;
pub mod state;
pub mod tier;
