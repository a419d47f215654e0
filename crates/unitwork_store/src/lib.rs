//! # unitwork store
//!
//! Relational store adapter contract and an in-memory reference store.
//!
//! This crate is the lowest layer of unitwork. Stores are **row stores**:
//! they persist column maps keyed by table and primary key, and know nothing
//! about entities, snapshots or dependency ordering.
//!
//! ## Design Principles
//!
//! - Every write happens inside a [`StoreTransaction`] obtained from
//!   [`RelationalStore::begin`]
//! - A transaction that is dropped without `commit` has no effect
//! - Writes report rows affected so callers can implement optimistic locking
//! - Stores must be `Send + Sync` so one store can back many units of work
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For tests, examples and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use unitwork_store::{CancelToken, MemoryStore, RelationalStore, Row};
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let mut tx = store.begin(&CancelToken::new()).unwrap();
//! let id = tx
//!     .create("users", Row::new(0, [("name".to_string(), json!("Ada"))].into()))
//!     .unwrap();
//! tx.commit().unwrap();
//!
//! assert_eq!(store.get("users", id).unwrap().get("name"), Some(&json!("Ada")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod cancel;
mod error;
mod memory;
mod row;
mod stats;

pub use adapter::{RelationalStore, StoreTransaction};
pub use cancel::CancelToken;
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, MemoryTransaction};
pub use row::{Columns, Predicate, Row, PRIMARY_KEY};
pub use stats::{StoreStats, StoreStatsSnapshot};
