//! Repair of the store that lost a reconciliation

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::document::DocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::existence::AssetExistenceLookup;
use crate::model::{Favorites, FavoritesDeleted};
use crate::repository::{BatchWriter, CachedRepository, max_user_version};

/// Work handed to the repair pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairTask {
    /// Relational rows are newer; push them into the document store
    ToDocument { upk: String, favorites: Vec<Favorites> },
    /// Documents are newer; replay them into the relational store
    ToRelational { upk: String, favorites: Vec<Favorites> },
}

impl RepairTask {
    pub fn upk(&self) -> &str {
        match self {
            RepairTask::ToDocument { upk, .. } | RepairTask::ToRelational { upk, .. } => upk,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RepairTask::ToDocument { .. } => "to_document",
            RepairTask::ToRelational { .. } => "to_relational",
        }
    }
}

/// Accepts repairs without waiting for them
pub trait RepairScheduler: Send + Sync {
    fn schedule(&self, task: RepairTask);
}

#[async_trait]
pub trait RepairHandler: Send + Sync {
    async fn handle(&self, task: RepairTask) -> StoreResult<()>;
}

pub struct Repairer {
    repo: Arc<CachedRepository>,
    documents: Arc<dyn DocumentStore>,
    batch: BatchWriter,
    assets: Arc<dyn AssetExistenceLookup>,
}

impl Repairer {
    pub fn new(
        repo: Arc<CachedRepository>,
        documents: Arc<dyn DocumentStore>,
        assets: Arc<dyn AssetExistenceLookup>,
    ) -> Self {
        Self {
            batch: BatchWriter::new(repo.clone()),
            repo,
            documents,
            assets,
        }
    }

    /// Acknowledge pending rows, mirror every live row, then propagate
    /// pending tombstones. Item failures are logged and the rest continue.
    pub async fn sync_to_document(&self, upk: &str, favorites: &[Favorites]) -> StoreResult<()> {
        let mut failed = 0usize;

        for fav in favorites.iter().filter(|f| !f.is_deleted()) {
            let fav = if fav.is_pending() {
                match self.repo.update(&fav.acknowledged(fav.user.version)).await {
                    Ok(acked) => acked,
                    Err(e) => {
                        warn!(upk = %upk, isin = %fav.isin(), error = %e, "Acknowledge failed");
                        failed += 1;
                        continue;
                    }
                }
            } else {
                fav.clone()
            };

            if let Err(e) = self.documents.save(&fav).await {
                warn!(upk = %upk, isin = %fav.isin(), error = %e, "Document save failed");
                failed += 1;
            }
        }

        let tombstones: Vec<FavoritesDeleted> = self
            .repo
            .get_by_filter(&FavoritesDeleted::pending_for_user(upk))
            .await?;
        for tombstone in &tombstones {
            let isin = tombstone.favorites().isin();
            match self.documents.delete(tombstone.favorites()).await {
                Ok(removed) => {
                    debug!(upk = %upk, isin = %isin, removed, "Tombstone propagated");
                    if let Err(e) = self.repo.update(tombstone).await {
                        warn!(upk = %upk, isin = %isin, error = %e, "Tombstone acknowledge failed");
                        failed += 1;
                    }
                }
                Err(e) => {
                    warn!(upk = %upk, isin = %isin, error = %e, "Document delete failed");
                    failed += 1;
                }
            }
        }

        info!(
            upk = %upk,
            mirrored = favorites.len(),
            tombstones = tombstones.len(),
            failed,
            "Document store repaired"
        );
        if failed > 0 {
            return Err(StoreError::Document(format!(
                "{} item(s) not repaired for {}",
                failed, upk
            )));
        }
        Ok(())
    }

    /// Replace the user's live rows with every document whose asset is known.
    /// A failed asset lookup aborts the repair before anything is written.
    pub async fn sync_to_relational(&self, upk: &str, favorites: &[Favorites]) -> StoreResult<()> {
        let version = max_user_version(favorites).unwrap_or_default();

        let mut replay = Vec::with_capacity(favorites.len());
        for fav in favorites {
            match self.assets.asset_exists(fav.isin()).await {
                Ok(true) => replay.push(fav.clone()),
                Ok(false) => debug!(upk = %upk, isin = %fav.isin(), "Unknown asset skipped"),
                Err(e) => {
                    warn!(upk = %upk, isin = %fav.isin(), error = %e, "Asset lookup failed");
                    return Err(e);
                }
            }
        }

        let cleared = self.batch.replace(upk, version, &replay).await?;
        info!(
            upk = %upk,
            cleared,
            replayed = replay.len(),
            version,
            "Relational store repaired"
        );
        Ok(())
    }
}

#[async_trait]
impl RepairHandler for Repairer {
    async fn handle(&self, task: RepairTask) -> StoreResult<()> {
        match task {
            RepairTask::ToDocument { upk, favorites } => {
                self.sync_to_document(&upk, &favorites).await
            }
            RepairTask::ToRelational { upk, favorites } => {
                self.sync_to_relational(&upk, &favorites).await
            }
        }
    }
}
