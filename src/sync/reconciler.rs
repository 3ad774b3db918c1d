//! Cross-store reconciliation
//!
//! Picks the authoritative list for a user by comparing the highest
//! `user.version` carried on each side, and schedules repair of the loser.
//! Ties go to the relational store.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use super::repair::{RepairScheduler, RepairTask};
use crate::error::StoreResult;
use crate::existence::UserExistenceLookup;
use crate::model::{Favorites, User};

/// Owner of the highest-versioned entry
fn max_user(favorites: &[Favorites]) -> Option<&User> {
    favorites.iter().map(|f| &f.user).max_by_key(|u| u.version)
}

pub struct Reconciler {
    users: Arc<dyn UserExistenceLookup>,
    scheduler: Arc<dyn RepairScheduler>,
}

impl Reconciler {
    pub fn new(users: Arc<dyn UserExistenceLookup>, scheduler: Arc<dyn RepairScheduler>) -> Self {
        Self { users, scheduler }
    }

    pub async fn sync(
        &self,
        documents: Vec<Favorites>,
        relational: Vec<Favorites>,
    ) -> StoreResult<Vec<Favorites>> {
        let Some(doc_user) = max_user(&documents).cloned() else {
            return Ok(relational);
        };

        let rel_user = match max_user(&relational) {
            Some(user) => user.clone(),
            None => {
                if !self.users.user_exists(&doc_user).await? {
                    debug!(upk = %doc_user.upk, "User never materialized, documents win");
                    return Ok(documents);
                }
                User::new(doc_user.upk.clone())
            }
        };

        match rel_user.version.cmp(&doc_user.version) {
            Ordering::Greater => {
                info!(
                    upk = %rel_user.upk,
                    relational = rel_user.version,
                    document = doc_user.version,
                    "Document store behind, scheduling repair"
                );
                self.scheduler.schedule(RepairTask::ToDocument {
                    upk: rel_user.upk,
                    favorites: relational.clone(),
                });
                Ok(relational)
            }
            Ordering::Less => {
                info!(
                    upk = %doc_user.upk,
                    relational = rel_user.version,
                    document = doc_user.version,
                    "Relational store behind, scheduling repair"
                );
                self.scheduler.schedule(RepairTask::ToRelational {
                    upk: doc_user.upk,
                    favorites: documents.clone(),
                });
                Ok(documents)
            }
            Ordering::Equal => Ok(relational),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::RecordingScheduler;
    use super::*;
    use crate::existence::mock::KnownSet;
    use crate::model::fixtures;

    fn reconciler(known: &[&str]) -> (Reconciler, Arc<RecordingScheduler>, Arc<KnownSet>) {
        let scheduler = Arc::new(RecordingScheduler::default());
        let users = Arc::new(KnownSet::of(known));
        (
            Reconciler::new(users.clone(), scheduler.clone()),
            scheduler,
            users,
        )
    }

    fn list(upk: &str, versions: &[i64]) -> Vec<Favorites> {
        versions
            .iter()
            .enumerate()
            .map(|(i, v)| fixtures::favorite(&format!("ISIN{:08}", i), upk, *v))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_documents_return_relational() {
        let (rec, scheduler, users) = reconciler(&["upk-1"]);
        let relational = list("upk-1", &[1, 2]);

        let winner = rec.sync(Vec::new(), relational.clone()).await.unwrap();
        assert_eq!(winner, relational);
        assert!(scheduler.tasks().is_empty());
        assert_eq!(users.calls(), 0);

        let winner = rec.sync(Vec::new(), Vec::new()).await.unwrap();
        assert!(winner.is_empty());
        assert!(scheduler.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_documents_win_without_repair() {
        let (rec, scheduler, users) = reconciler(&[]);
        let documents = list("upk-1", &[2, 7]);

        let winner = rec.sync(documents.clone(), Vec::new()).await.unwrap();
        assert_eq!(winner, documents);
        assert!(scheduler.tasks().is_empty());
        assert_eq!(users.calls(), 1);
    }

    #[tokio::test]
    async fn test_known_user_without_rows_replays_documents() {
        let (rec, scheduler, _) = reconciler(&["upk-1"]);
        let documents = list("upk-1", &[2, 7]);

        let winner = rec.sync(documents.clone(), Vec::new()).await.unwrap();
        assert_eq!(winner, documents);
        assert_eq!(
            scheduler.tasks(),
            vec![RepairTask::ToRelational {
                upk: "upk-1".into(),
                favorites: documents,
            }]
        );
    }

    #[tokio::test]
    async fn test_relational_newer_repairs_documents() {
        let (rec, scheduler, _) = reconciler(&["upk-1"]);
        let documents = list("upk-1", &[3, 1]);
        let relational = list("upk-1", &[5, 4]);

        let winner = rec.sync(documents, relational.clone()).await.unwrap();
        assert_eq!(winner, relational);
        assert_eq!(
            scheduler.tasks(),
            vec![RepairTask::ToDocument {
                upk: "upk-1".into(),
                favorites: relational,
            }]
        );
    }

    #[tokio::test]
    async fn test_documents_newer_repairs_relational() {
        let (rec, scheduler, _) = reconciler(&["upk-1"]);
        let documents = list("upk-1", &[5]);
        let relational = list("upk-1", &[3, 2]);

        let winner = rec.sync(documents.clone(), relational).await.unwrap();
        assert_eq!(winner, documents);
        assert_eq!(scheduler.tasks().len(), 1);
        assert_eq!(scheduler.tasks()[0].kind(), "to_relational");
    }

    #[tokio::test]
    async fn test_tie_goes_to_relational() {
        let (rec, scheduler, _) = reconciler(&["upk-1"]);
        let documents = list("upk-1", &[4]);
        let relational = list("upk-1", &[4, 2]);

        let winner = rec.sync(documents, relational.clone()).await.unwrap();
        assert_eq!(winner, relational);
        assert!(scheduler.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_max_is_a_true_maximum_regardless_of_order() {
        let (rec, scheduler, _) = reconciler(&["upk-1"]);
        // Highest document version sits in the middle
        let documents = list("upk-1", &[1, 6, 2]);
        let relational = list("upk-1", &[5]);

        let winner = rec.sync(documents.clone(), relational).await.unwrap();
        assert_eq!(winner, documents);
        assert_eq!(scheduler.tasks()[0].kind(), "to_relational");
    }
}
