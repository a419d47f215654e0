//! # Unitwork Testkit
//!
//! Test utilities for unitwork.
//!
//! This crate provides:
//! - Fixture entities covering every capability, and store helpers
//! - Property-based test generators using proptest
//! - Cross-crate integration test helpers
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use unitwork_core::entity::shared;
//! use unitwork_testkit::prelude::*;
//!
//! let store = TestStore::new();
//! let uow = store.shop_uow();
//! let user = shared(User::new("ada", "ada@example.com"));
//! uow.register_new(&user).unwrap();
//! uow.commit().unwrap();
//! assert_eq!(store.count("users"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
