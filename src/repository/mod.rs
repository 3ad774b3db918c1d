//! Relational repository layer
//!
//! - [`CachedRepository`]: generic cache-aside CRUD over any [`Entity`](crate::model::Entity)
//! - [`TransactionalWriter`]: all-or-nothing statement lists with a post-commit hook
//! - [`BatchWriter`]: single-user favorites replay in one batch

pub mod batch;
pub mod cached;
pub mod transaction;

pub use batch::{BatchWriter, max_user_version};
pub use cached::CachedRepository;
pub use transaction::{CommitHook, TransactionalWriter, TxPlan};
