//! Existence lookups against the outside authority
//!
//! Every lookup races a set of probes (database check, remote services). The
//! first probe answering `true` wins and the others are dropped. A race where
//! some probe errored or timed out is rerun, up to the configured number of
//! attempts.

pub mod probes;

pub use probes::{DatabaseAssetProbe, DatabaseUserProbe, RemoteProbe};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ExistenceConfig;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::model::User;

#[async_trait]
pub trait AssetExistenceLookup: Send + Sync {
    async fn asset_exists(&self, isin: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait UserExistenceLookup: Send + Sync {
    async fn user_exists(&self, user: &User) -> StoreResult<bool>;
}

/// Derives the opaque upk from a raw identity
pub trait PersonalKeyEncryptor: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> StoreResult<String>;
}

/// One source of truth consulted during a race
#[async_trait]
pub trait ExistenceProbe<K: ?Sized + Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn exists(&self, key: &K) -> StoreResult<bool>;
}

enum RaceOutcome {
    Found,
    Absent,
    /// A probe failed; `answered` is set if any other probe said `false`
    Inconclusive { answered: bool },
}

pub struct RacingLookup<K: ?Sized + Sync> {
    probes: Vec<Arc<dyn ExistenceProbe<K>>>,
    attempts: u32,
    attempt_timeout: Duration,
}

impl<K: ?Sized + Sync> RacingLookup<K> {
    pub fn new(
        probes: Vec<Arc<dyn ExistenceProbe<K>>>,
        attempts: u32,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            probes,
            attempts: attempts.max(1),
            attempt_timeout,
        }
    }

    /// `Ok(false)` once every probe said no, or once attempts are spent and
    /// at least one probe said no. `Err` when no probe ever answered.
    pub async fn exists(&self, key: &K) -> StoreResult<bool> {
        if self.probes.is_empty() {
            return Err(StoreError::Lookup("no existence probes configured".to_string()));
        }

        let mut answered = false;
        for attempt in 1..=self.attempts {
            match self.race(key).await {
                RaceOutcome::Found => return Ok(true),
                RaceOutcome::Absent => return Ok(false),
                RaceOutcome::Inconclusive { answered: a } => {
                    answered |= a;
                    debug!(attempt, attempts = self.attempts, "Existence race inconclusive");
                }
            }
        }

        if answered {
            Ok(false)
        } else {
            Err(StoreError::Lookup(format!(
                "no probe answered after {} attempts",
                self.attempts
            )))
        }
    }

    async fn race(&self, key: &K) -> RaceOutcome {
        let timeout = self.attempt_timeout;
        let mut pending: FuturesUnordered<_> = self
            .probes
            .iter()
            .map(|probe| async move {
                let result = tokio::time::timeout(timeout, probe.exists(key)).await;
                (probe.name(), result)
            })
            .collect();

        let mut failed = false;
        let mut answered = false;
        while let Some((name, result)) = pending.next().await {
            match result {
                Ok(Ok(true)) => return RaceOutcome::Found,
                Ok(Ok(false)) => answered = true,
                Ok(Err(e)) => {
                    warn!(probe = name, error = %e, "Existence probe failed");
                    failed = true;
                }
                Err(_) => {
                    warn!(
                        probe = name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Existence probe timed out"
                    );
                    failed = true;
                }
            }
        }

        if failed {
            RaceOutcome::Inconclusive { answered }
        } else {
            RaceOutcome::Absent
        }
    }
}

pub struct AssetLookup {
    race: RacingLookup<str>,
}

impl AssetLookup {
    pub fn new(race: RacingLookup<str>) -> Self {
        Self { race }
    }

    /// Database probe plus one remote probe per configured base URL
    pub fn from_config(config: &ExistenceConfig, db: Arc<Database>) -> StoreResult<Self> {
        let mut probes: Vec<Arc<dyn ExistenceProbe<str>>> =
            vec![Arc::new(DatabaseAssetProbe::new(db))];
        for url in &config.remote_asset_urls {
            probes.push(Arc::new(RemoteProbe::assets(url, timeout_of(config))?));
        }
        Ok(Self::new(RacingLookup::new(
            probes,
            config.attempts,
            timeout_of(config),
        )))
    }
}

#[async_trait]
impl AssetExistenceLookup for AssetLookup {
    async fn asset_exists(&self, isin: &str) -> StoreResult<bool> {
        self.race.exists(isin).await
    }
}

pub struct UserLookup {
    race: RacingLookup<str>,
}

impl UserLookup {
    pub fn new(race: RacingLookup<str>) -> Self {
        Self { race }
    }

    pub fn from_config(config: &ExistenceConfig, db: Arc<Database>) -> StoreResult<Self> {
        let mut probes: Vec<Arc<dyn ExistenceProbe<str>>> =
            vec![Arc::new(DatabaseUserProbe::new(db))];
        for url in &config.remote_user_urls {
            probes.push(Arc::new(RemoteProbe::users(url, timeout_of(config))?));
        }
        Ok(Self::new(RacingLookup::new(
            probes,
            config.attempts,
            timeout_of(config),
        )))
    }
}

#[async_trait]
impl UserExistenceLookup for UserLookup {
    async fn user_exists(&self, user: &User) -> StoreResult<bool> {
        self.race.exists(user.upk.as_str()).await
    }
}

fn timeout_of(config: &ExistenceConfig) -> Duration {
    Duration::from_millis(config.attempt_timeout_ms)
}


#[cfg(test)]
mod tests {
    use super::mock::StubProbe;
    use super::*;

    fn lookup(probes: Vec<Arc<StubProbe>>, attempts: u32) -> RacingLookup<str> {
        let probes = probes
            .into_iter()
            .map(|p| p as Arc<dyn ExistenceProbe<str>>)
            .collect();
        RacingLookup::new(probes, attempts, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_first_positive_wins_without_waiting() {
        let slow = Arc::new(StubProbe::answering("slow", false).delayed(Duration::from_secs(5)));
        let fast = Arc::new(StubProbe::answering("fast", true));
        let race = RacingLookup::new(
            vec![
                slow.clone() as Arc<dyn ExistenceProbe<str>>,
                fast.clone() as Arc<dyn ExistenceProbe<str>>,
            ],
            3,
            Duration::from_secs(10),
        );

        let found = tokio::time::timeout(Duration::from_secs(1), race.exists("DE0005140008"))
            .await
            .expect("race should not wait for the slow probe");
        assert!(found.unwrap());
        assert_eq!(fast.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_false_is_false_without_retry() {
        let a = Arc::new(StubProbe::answering("a", false));
        let b = Arc::new(StubProbe::answering("b", false));
        let race = lookup(vec![a.clone(), b.clone()], 3);

        assert!(!race.exists("X").await.unwrap());
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_probe_triggers_retry_up_to_attempts() {
        let no = Arc::new(StubProbe::answering("no", false));
        let down = Arc::new(StubProbe::failing("down"));
        let race = lookup(vec![no.clone(), down.clone()], 3);

        // Someone answered, so the spent budget resolves to false
        assert!(!race.exists("X").await.unwrap());
        assert_eq!(down.calls(), 3);
        assert_eq!(no.calls(), 3);
    }

    #[tokio::test]
    async fn test_early_no_survives_later_failures() {
        let flaky = Arc::new(StubProbe::scripted("flaky", vec![Some(false), None]));
        let down = Arc::new(StubProbe::failing("down"));
        let race = lookup(vec![flaky.clone(), down.clone()], 3);

        // First attempt said no, later attempts only failed
        assert!(!race.exists("X").await.unwrap());
        assert_eq!(flaky.calls(), 3);
        assert_eq!(down.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_answer_at_all_is_lookup_error() {
        let down = Arc::new(StubProbe::failing("down"));
        let race = lookup(vec![down.clone()], 2);

        let result = race.exists("X").await;
        assert!(matches!(result, Err(StoreError::Lookup(_))));
        assert_eq!(down.calls(), 2);
    }

    #[tokio::test]
    async fn test_timed_out_probe_counts_as_failure() {
        let hung = Arc::new(StubProbe::answering("hung", true).delayed(Duration::from_secs(5)));
        let race = lookup(vec![hung.clone()], 2);

        assert!(race.exists("X").await.is_err());
        assert_eq!(hung.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_probe_set_is_error() {
        let race = lookup(Vec::new(), 3);
        assert!(race.exists("X").await.is_err());
    }

    #[tokio::test]
    async fn test_user_lookup_uses_upk() {
        let yes = Arc::new(StubProbe::answering("yes", true));
        let users = UserLookup::new(lookup(vec![yes.clone()], 1));
        assert!(users.user_exists(&User::new("upk-1")).await.unwrap());
        assert_eq!(yes.calls(), 1);
    }
}
