//! All-or-nothing relational writes
//!
//! A [`TxPlan`] is an ordered list of statements; the last one must return the
//! resulting row. The writer evicts the cache key, runs the plan in one
//! transaction and, after commit, refreshes the cache and hands the committed
//! entity to a [`CommitHook`] exactly once.

use async_trait::async_trait;
use sqlx::Connection;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::db::Statement;
use crate::error::{StoreError, StoreResult};
use crate::model::Entity;

use super::CachedRepository;

/// Ordered statements for one transaction
#[derive(Debug, Clone)]
pub struct TxPlan {
    pub name: &'static str,
    pub cache_key: String,
    pub statements: Vec<Statement>,
}

impl TxPlan {
    pub fn new(name: &'static str, cache_key: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            name,
            cache_key: cache_key.into(),
            statements,
        }
    }
}

/// Runs once per successful commit with the committed entity
#[async_trait]
pub trait CommitHook<E>: Send + Sync {
    async fn after_commit(&self, committed: E) -> StoreResult<E>;
}

pub struct TransactionalWriter<E> {
    repo: Arc<CachedRepository>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> TransactionalWriter<E> {
    pub fn new(repo: Arc<CachedRepository>) -> Self {
        Self {
            repo,
            _entity: PhantomData,
        }
    }

    pub async fn execute(&self, plan: TxPlan, hook: &dyn CommitHook<E>) -> StoreResult<E> {
        let committed = self.commit(plan).await?;
        hook.after_commit(committed).await
    }

    /// Run the plan and refresh the cache, without the hook
    pub async fn commit(&self, plan: TxPlan) -> StoreResult<E> {
        let TxPlan {
            name,
            cache_key,
            mut statements,
        } = plan;
        let Some(last) = statements.pop() else {
            return Err(StoreError::InvalidPlan(format!("{}: no statements", name)));
        };

        self.repo.cache().delete(&cache_key);

        let mut conn = self.repo.db().acquire().await?;
        let mut tx = conn.begin().await?;

        for (idx, stmt) in statements.iter().enumerate() {
            if let Err(e) = stmt.query().execute(&mut *tx).await {
                error!(tx = name, step = idx, error = %e, "Transaction step failed, rolling back");
                let _ = tx.rollback().await;
                return Err(e.into());
            }
        }

        let entity = match last.query().fetch_one(&mut *tx).await {
            Ok(row) => E::from_row(&row),
            Err(e) => Err(e.into()),
        };
        let entity = match entity {
            Ok(entity) => entity,
            Err(e) => {
                error!(tx = name, error = %e, "Transaction result failed, rolling back");
                let _ = tx.rollback().await;
                return Err(e);
            }
        };

        tx.commit().await?;
        debug!(tx = name, key = %cache_key, "Transaction committed");

        if let Err(e) = self.repo.remember(&entity) {
            warn!(tx = name, key = %cache_key, error = %e, "Committed row not cached");
        }
        Ok(entity)
    }
}
