//! Brick catalog data model: entity kinds, import jobs, and the entity store seam.
//!
//! This crate defines the data model without any database dependencies.
//! `bricksberg-db` provides the SQLite-backed store, and `bricksberg-import`
//! drives the import pipeline against the [`EntityStore`] trait.

pub mod job;
pub mod store;
pub mod types;

pub use job::*;
pub use store::{EntityStore, StoreError, StoredEntity};
pub use types::*;
