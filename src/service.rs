//! Favorites service
//!
//! Caller-facing entry points. Writes commit to PostgreSQL first and mirror
//! to the document store afterwards; a failed mirror leaves the row pending
//! for the next reconciliation instead of failing the call.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::document::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::existence::PersonalKeyEncryptor;
use crate::model::{Asset, AssetType, Favorites, FavoritesDeleted, Keyed, User};
use crate::repository::{CachedRepository, CommitHook, TransactionalWriter, TxPlan};
use crate::sync::Reconciler;

pub struct FavoritesService {
    repo: Arc<CachedRepository>,
    writer: TransactionalWriter<Favorites>,
    documents: Arc<dyn DocumentStore>,
    reconciler: Arc<Reconciler>,
    keys: Option<Arc<dyn PersonalKeyEncryptor>>,
}

impl FavoritesService {
    pub fn new(
        repo: Arc<CachedRepository>,
        documents: Arc<dyn DocumentStore>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            writer: TransactionalWriter::new(repo.clone()),
            repo,
            documents,
            reconciler,
            keys: None,
        }
    }

    pub fn with_key_encryptor(mut self, keys: Arc<dyn PersonalKeyEncryptor>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// A live favorite, `None` when absent or soft-deleted
    pub async fn get(&self, isin: &str, upk: &str) -> StoreResult<Option<Favorites>> {
        match self.repo.get(&probe(isin, upk)).await {
            Ok(fav) if fav.is_deleted() => Ok(None),
            Ok(fav) => Ok(Some(fav)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every live favorite of a user, reconciled across both stores
    pub async fn get_for_user(&self, upk: &str) -> StoreResult<Vec<Favorites>> {
        let stmt = Favorites::for_user(upk);
        let (documents, relational) = tokio::try_join!(
            self.documents.load(upk),
            self.repo.get_by_filter::<Favorites>(&stmt)
        )?;
        debug!(
            upk = %upk,
            documents = documents.len(),
            relational = relational.len(),
            "Loaded both stores"
        );

        let winner = self.reconciler.sync(documents, relational).await?;
        Ok(winner.into_iter().filter(|f| !f.is_deleted()).collect())
    }

    /// Same as [`get_for_user`](Self::get_for_user), keyed by a raw identity
    pub async fn get_for_identity(&self, identity: &str) -> StoreResult<Vec<Favorites>> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| StoreError::Config("no personal key encryptor configured".to_string()))?;
        let upk = keys.encrypt(identity)?;
        self.get_for_user(&upk).await
    }

    /// Upsert and mirror. Returns the acknowledged row, or the pending row
    /// when the mirror failed.
    pub async fn set(&self, favorites: Favorites) -> StoreResult<Favorites> {
        let plan = TxPlan::new(
            "favorites_upsert",
            favorites.cache_key(),
            favorites.upsert_statements(),
        );
        let hook = MirrorSave {
            repo: self.repo.clone(),
            documents: self.documents.clone(),
        };
        self.writer.execute(plan, &hook).await
    }

    /// Soft delete and propagate. Fails with `NotFound` when no such row.
    pub async fn delete(&self, isin: &str, upk: &str) -> StoreResult<Favorites> {
        let target = probe(isin, upk);
        let plan = TxPlan::new(
            "favorites_delete",
            target.cache_key(),
            target.delete_statements(),
        );
        let hook = MirrorDelete {
            repo: self.repo.clone(),
            documents: self.documents.clone(),
        };
        self.writer.execute(plan, &hook).await
    }
}

/// Lookup value carrying only the `(isin, upk)` identity
fn probe(isin: &str, upk: &str) -> Favorites {
    Favorites::new(Asset::new(isin, AssetType::new("")), User::new(upk))
}

pub(crate) struct MirrorSave {
    repo: Arc<CachedRepository>,
    documents: Arc<dyn DocumentStore>,
}

#[async_trait]
impl CommitHook<Favorites> for MirrorSave {
    async fn after_commit(&self, committed: Favorites) -> StoreResult<Favorites> {
        if let Err(e) = self.documents.save(&committed).await {
            warn!(key = %committed.key(), error = %e, "Mirror save failed, row left pending");
            return Ok(committed);
        }
        match self
            .repo
            .update(&committed.acknowledged(committed.user.version))
            .await
        {
            Ok(acked) => Ok(acked),
            Err(e) => {
                warn!(key = %committed.key(), error = %e, "Acknowledge failed, row left pending");
                Ok(committed)
            }
        }
    }
}

pub(crate) struct MirrorDelete {
    repo: Arc<CachedRepository>,
    documents: Arc<dyn DocumentStore>,
}

#[async_trait]
impl CommitHook<Favorites> for MirrorDelete {
    async fn after_commit(&self, committed: Favorites) -> StoreResult<Favorites> {
        if let Err(e) = self.documents.delete(&committed).await {
            warn!(key = %committed.key(), error = %e, "Mirror delete failed, tombstone left pending");
            return Ok(committed);
        }
        let tombstone = FavoritesDeleted::from(committed);
        match self.repo.update(&tombstone).await {
            Ok(acked) => Ok(acked.into_favorites()),
            Err(e) => {
                warn!(key = %tombstone.key(), error = %e, "Tombstone acknowledge failed");
                Ok(tombstone.into_favorites())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::db::Database;
    use crate::document::MemoryDocumentStore;
    use crate::existence::mock::KnownSet;
    use crate::model::fixtures;
    use crate::model::favorites::SyncState;
    use crate::sync::reconciler::mock::RecordingScheduler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn offline_repo() -> Arc<CachedRepository> {
        Arc::new(CachedRepository::new(
            Arc::new(Database::unavailable()),
            Arc::new(TtlCache::new(Duration::from_secs(60))),
        ))
    }

    fn offline_service(documents: Arc<MemoryDocumentStore>) -> FavoritesService {
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KnownSet::of(&[])),
            Arc::new(RecordingScheduler::default()),
        ));
        FavoritesService::new(offline_repo(), documents, reconciler)
    }

    struct CountingKeys {
        calls: AtomicUsize,
    }

    impl PersonalKeyEncryptor for CountingKeys {
        fn encrypt(&self, plaintext: &str) -> StoreResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("upk-{}", plaintext.len()))
        }
    }

    #[test]
    fn test_probe_identity() {
        let p = probe("DE0005140008", "upk-1");
        assert_eq!(p.cache_key(), "favorites:DE0005140008:upk-1");
    }

    #[tokio::test]
    async fn test_reads_surface_pool_unavailable() {
        let documents = Arc::new(MemoryDocumentStore::new());
        documents
            .save(&fixtures::favorite("DE0005140008", "upk-1", 2))
            .await
            .unwrap();
        let service = offline_service(documents);

        assert!(matches!(
            service.get("DE0005140008", "upk-1").await,
            Err(StoreError::PoolUnavailable(_))
        ));
        assert!(matches!(
            service.get_for_user("upk-1").await,
            Err(StoreError::PoolUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_commit_never_reaches_document_store() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let service = offline_service(documents.clone());

        let result = service
            .set(fixtures::favorite("DE0005140008", "upk-1", 2))
            .await;
        assert!(result.unwrap_err().is_connectivity());
        assert!(documents.documents().unwrap().is_empty());

        assert!(service.delete("DE0005140008", "upk-1").await.is_err());
    }

    #[tokio::test]
    async fn test_identity_goes_through_encryptor() {
        let keys = Arc::new(CountingKeys {
            calls: AtomicUsize::new(0),
        });
        let service =
            offline_service(Arc::new(MemoryDocumentStore::new())).with_key_encryptor(keys.clone());

        assert!(service.get_for_identity("alice").await.is_err());
        assert_eq!(keys.calls.load(Ordering::SeqCst), 1);

        let bare = offline_service(Arc::new(MemoryDocumentStore::new()));
        assert!(matches!(
            bare.get_for_identity("alice").await,
            Err(StoreError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_mirror_save_keeps_row_pending_when_ack_fails() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let hook = MirrorSave {
            repo: offline_repo(),
            documents: documents.clone(),
        };
        let mut committed = fixtures::favorite("DE0005140008", "upk-1", 3);
        committed.version = None;

        let result = hook.after_commit(committed.clone()).await.unwrap();
        assert_eq!(result.state(), SyncState::PendingSync);
        assert_eq!(documents.documents().unwrap()[0].version, 3);
    }

    #[tokio::test]
    async fn test_mirror_delete_removes_document() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let live = fixtures::favorite("DE0005140008", "upk-1", 3);
        documents.save(&live).await.unwrap();

        let hook = MirrorDelete {
            repo: offline_repo(),
            documents: documents.clone(),
        };
        let mut tombstone = live.clone();
        tombstone.version = None;
        tombstone.attributes.deleted = Some(true);

        let result = hook.after_commit(tombstone).await.unwrap();
        assert_eq!(result.state(), SyncState::Tombstone);
        assert!(documents.documents().unwrap().is_empty());
    }
}
