//! favorites_sync - Favorites store for financial instruments
//!
//! PostgreSQL is the primary store, MongoDB the secondary one. Every
//! "favorites of user X" read reconciles both and repairs the stale side in
//! the background.
//!
//! # Modules
//!
//! - [`cache`] - In-process TTL cache
//! - [`model`] - Entities and the statements that persist them
//! - [`db`] - Connection pool, acquire retry, statements, schema
//! - [`repository`] - Cache-aside repository, transactional and batch writers
//! - [`document`] - Document store (MongoDB, in-memory)
//! - [`existence`] - Asset/user existence lookups
//! - [`sync`] - Reconciliation and background repair
//! - [`service`] - Caller-facing API
//! - [`app`] - Application context

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod existence;
pub mod logging;
pub mod model;
pub mod repository;
pub mod service;
pub mod sync;

// Convenient re-exports at crate root
pub use app::AppContext;
pub use cache::TtlCache;
pub use config::AppConfig;
pub use db::{Database, RetryPolicy, SqlValue, Statement};
pub use document::{DocumentStore, MemoryDocumentStore, MongoFavoritesStore};
pub use error::{StoreError, StoreResult};
pub use model::{Asset, AssetType, Entity, Favorites, FavoritesDeleted, TAttributes, User};
pub use repository::{BatchWriter, CachedRepository, TransactionalWriter, TxPlan};
pub use service::FavoritesService;
pub use sync::{Reconciler, RepairPool, RepairTask, Repairer};
