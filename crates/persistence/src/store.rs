use crate::repository::{CredentialRepository, SearchSettingsRepository};
use anyhow::Result;
use async_trait::async_trait;
use mediabrowse_core::{SearchRequest, SettingsStore};
use sqlx::SqlitePool;

const BEARER_TOKEN: &str = "catalog_bearer_token";

/// [`SettingsStore`] backed by the SQLite settings database
pub struct SqliteSettingsStore {
    search: SearchSettingsRepository,
    credentials: CredentialRepository,
}

impl SqliteSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            search: SearchSettingsRepository::new(pool.clone()),
            credentials: CredentialRepository::new(pool),
        }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn load_search_request(&self) -> Result<SearchRequest> {
        self.search.get().await
    }

    async fn save_search_request(&self, request: &SearchRequest) -> Result<()> {
        self.search.save(request).await
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        self.credentials.get(BEARER_TOKEN).await
    }

    async fn save_bearer_token(&self, token: &str) -> Result<()> {
        self.credentials.set(BEARER_TOKEN, token).await
    }

    async fn clear_bearer_token(&self) -> Result<()> {
        self.credentials.delete(BEARER_TOKEN).await
    }
}
