//! In-memory document store
//!
//! Same find-then-write semantics as the MongoDB store. Used when no MongoDB
//! URL is configured and in tests.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::{DocumentStore, FavoriteDocument};
use crate::error::{StoreError, StoreResult};
use crate::model::Favorites;

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<Vec<FavoriteDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw documents, duplicates included
    pub fn with_documents(docs: Vec<FavoriteDocument>) -> Self {
        Self {
            docs: Mutex::new(docs),
        }
    }

    pub fn documents(&self) -> StoreResult<Vec<FavoriteDocument>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Vec<FavoriteDocument>>> {
        self.docs
            .lock()
            .map_err(|_| StoreError::Document("memory store lock poisoned".to_string()))
    }
}

fn matches(doc: &FavoriteDocument, upk: &str, isin: &str) -> bool {
    doc.upk == upk && doc.isin == isin
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, upk: &str) -> StoreResult<Vec<Favorites>> {
        let docs = self.lock()?;
        Ok(docs
            .iter()
            .filter(|d| d.upk == upk)
            .cloned()
            .map(FavoriteDocument::into_favorites)
            .collect())
    }

    async fn save(&self, favorites: &Favorites) -> StoreResult<()> {
        let incoming = FavoriteDocument::from_favorites(favorites);
        let mut docs = self.lock()?;

        let mut found = false;
        for doc in docs
            .iter_mut()
            .filter(|d| matches(d, &incoming.upk, &incoming.isin))
        {
            found = true;
            if doc.version < incoming.version {
                doc.asset_type = incoming.asset_type.clone();
                doc.version = incoming.version;
            }
        }
        if !found {
            docs.push(incoming);
        }
        Ok(())
    }

    async fn delete(&self, favorites: &Favorites) -> StoreResult<u64> {
        let mut docs = self.lock()?;
        let before = docs.len();
        docs.retain(|d| !matches(d, favorites.upk(), favorites.isin()));
        Ok((before - docs.len()) as u64)
    }
}
