//! # smdflow Testkit
//!
//! Test utilities for smdflow.
//!
//! This crate provides:
//! - Channel fixtures, in memory or written to temporary files
//! - Property-based test generators using proptest
//! - A join harness running channels through the whole reader stack
//!
//! ## Usage
//!
//! ```rust,ignore
//! use smdflow_testkit::prelude::*;
//!
//! #[test]
//! fn joins_two_channels() {
//!     JoinHarness::new(vec![vec![1, 2, 4], vec![1, 3, 4]]).verify();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
