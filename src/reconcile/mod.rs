//! # Reconciliation
//!
//! The [`Reconciler`] drives certificate issuance from two triggers: watch
//! events on routing-rule objects and a periodic reissue sweep scheduled at
//! 90% of the effective certificate TTL. [`diff::missing_hosts`] is the pure
//! core behind forced-TLS binding synthesis.

pub mod diff;
pub mod engine;

pub use diff::missing_hosts;
pub use engine::Reconciler;
