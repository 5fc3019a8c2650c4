//! Shared runtime helpers.
//!
//! Cancellation, pacing and retry primitives used by the upstream client and
//! the sync engine.

pub mod bootstrap;
pub mod rate_limit;
pub mod retry;
pub mod shutdown;
