//! Concrete existence probes

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::ExistenceProbe;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};

const ASSET_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM assets WHERE isin = $1 AND deleted IS NOT TRUE)";
const USER_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM users WHERE upk = $1 AND deleted IS NOT TRUE)";

async fn exists_in(db: &Database, sql: &'static str, key: &str) -> StoreResult<bool> {
    let mut conn = db.acquire().await?;
    let found: bool = sqlx::query_scalar(sql)
        .bind(key)
        .fetch_one(&mut *conn)
        .await?;
    Ok(found)
}

pub struct DatabaseAssetProbe {
    db: Arc<Database>,
}

impl DatabaseAssetProbe {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExistenceProbe<str> for DatabaseAssetProbe {
    fn name(&self) -> &'static str {
        "db_asset"
    }

    async fn exists(&self, isin: &str) -> StoreResult<bool> {
        exists_in(&self.db, ASSET_EXISTS, isin).await
    }
}

pub struct DatabaseUserProbe {
    db: Arc<Database>,
}

impl DatabaseUserProbe {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExistenceProbe<str> for DatabaseUserProbe {
    fn name(&self) -> &'static str {
        "db_user"
    }

    async fn exists(&self, upk: &str) -> StoreResult<bool> {
        exists_in(&self.db, USER_EXISTS, upk).await
    }
}

/// `GET {base}/{resource}/{key}`: 2xx is known, 404 is unknown, anything
/// else is an error
pub struct RemoteProbe {
    name: &'static str,
    client: reqwest::Client,
    base: Url,
    resource: &'static str,
}

impl RemoteProbe {
    pub fn assets(base: &str, timeout: Duration) -> StoreResult<Self> {
        Self::new("remote_asset", base, "assets", timeout)
    }

    pub fn users(base: &str, timeout: Duration) -> StoreResult<Self> {
        Self::new("remote_user", base, "users", timeout)
    }

    fn new(
        name: &'static str,
        base: &str,
        resource: &'static str,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let base = Url::parse(base)
            .map_err(|e| StoreError::Config(format!("invalid probe url '{}': {}", base, e)))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::Config(format!("probe url '{}' cannot be a base", base)));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name,
            client,
            base,
            resource,
        })
    }

    pub fn url_for(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(self.resource).push(key);
        }
        url
    }
}

#[async_trait]
impl ExistenceProbe<str> for RemoteProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let url = self.url_for(key);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StoreError::Lookup(format!("{}: request failed: {}", self.name, e)))?;

        let status = response.status();
        debug!(probe = self.name, url = %url, status = status.as_u16(), "Probe response");
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(StoreError::Lookup(format!(
                "{}: unexpected status {}",
                self.name, status
            )))
        }
    }
}
