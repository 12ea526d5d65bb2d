//! Shared test utilities for facetdash-core integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file.

pub mod fake_api;
pub mod fixtures;

pub use fake_api::*;
pub use fixtures::*;
