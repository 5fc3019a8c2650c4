//! Shared storage integration tests.
//!
//! Tests the DelegationStore interface against every SQL backend.
//! Each backend test binary builds fresh stores and runs these functions.

pub mod delegation_store_tests;
