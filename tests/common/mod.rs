// Test code is allowed to panic on failure
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Common test utilities and fixtures shared across all test targets
//!
//! This module provides reusable builders for clusters, member pods and
//! materialized services, plus a scripted service store for driving the
//! ingress polling loop under a paused clock.
//!
//! # Usage
//!
//! Include this module in your test file:
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod store;

pub use fixtures::*;
pub use store::*;
