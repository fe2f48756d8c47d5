//! Expired unpaid appointment sweeping

pub mod expiry;
pub mod policy;

pub use expiry::{ExpirySweeper, SweepOutcome};
pub use policy::{ExpiryPolicy, PaymentWindowPolicy};
