//! # Unitwork Core
//!
//! Transactional unit of work coordination over a relational store.
//!
//! This crate provides:
//! - An entity capability model (timestamps, revisions, soft delete, validation)
//! - Snapshot based dirty checking
//! - A dependency manager that orders inserts and deletes between entity types
//! - An operation model with cancellation and bulk merging
//! - The [`UnitOfWork`] coordinator that commits everything in one store transaction
//! - Host integration hooks for deferring writes per logical transaction
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::Serialize;
//! use unitwork_core::entity::{shared, Entity};
//! use unitwork_core::{Config, UnitOfWorkManager};
//! use unitwork_store::MemoryStore;
//!
//! #[derive(Serialize)]
//! struct Author { id: u64, name: String }
//!
//! #[derive(Serialize)]
//! struct Book { id: u64, title: String }
//!
//! impl Entity for Author {
//!     fn id(&self) -> u64 { self.id }
//!     fn set_id(&mut self, id: u64) { self.id = id; }
//!     fn table_name(&self) -> &str { "authors" }
//! }
//!
//! impl Entity for Book {
//!     fn id(&self) -> u64 { self.id }
//!     fn set_id(&mut self, id: u64) { self.id = id; }
//!     fn table_name(&self) -> &str { "books" }
//! }
//!
//! let store = Arc::new(MemoryStore::new());
//! let manager = UnitOfWorkManager::new(store.clone(), Config::default());
//! manager.register_dependency::<Book, Author>();
//!
//! let author = shared(Author { id: 0, name: "Le Guin".into() });
//! let book = shared(Book { id: 0, title: "The Dispossessed".into() });
//!
//! manager
//!     .execute(|uow| {
//!         uow.register_new(&book)?;
//!         uow.register_new(&author)
//!     })
//!     .unwrap();
//!
//! assert_eq!(store.count("authors"), 1);
//! assert_eq!(store.count("books"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod stats;
mod types;

pub mod dependency;
pub mod entity;
pub mod hooks;
pub mod operation;
pub mod snapshot;
pub mod unit_of_work;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use dependency::DependencyManager;
pub use entity::{shared, Entity, EntityRef, EntityType, Shared};
pub use error::{CoreError, CoreResult};
pub use hooks::{
    AutoUnitOfWork, HookConfig, HookOutcome, HostHooks, ScopeId, TransactionBoundary, WriteKind,
};
pub use manager::UnitOfWorkManager;
pub use operation::{Operation, OperationKind};
pub use snapshot::{ChangeSet, EntitySnapshot, FieldChange, FieldChangeKind, SnapshotManager};
pub use stats::UnitOfWorkStats;
pub use types::UnitOfWorkId;
pub use unit_of_work::{UnitOfWork, WorkStatus};
