//! # Tagsync Testkit
//!
//! Test utilities for tagsync.
//!
//! This crate provides:
//! - Replica fixtures over in-memory and directory persistence
//! - Property-based generators for local mutations and server change sets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tagsync_testkit::prelude::*;
//!
//! #[test]
//! fn tagging_creates_pending_insert() {
//!     let replica = TestReplica::memory();
//!     replica.dispatch(Action::add_address_tag("1ABC", "vip"));
//!     assert_eq!(replica.pending().len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use tagsync_engine::Action;
}

pub use fixtures::*;
pub use generators::*;
