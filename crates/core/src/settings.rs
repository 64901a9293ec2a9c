use crate::models::SearchRequest;
use crate::traits::SettingsStore;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// In-process settings store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    search: RwLock<SearchRequest>,
    token: RwLock<Option<String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            search: RwLock::new(SearchRequest::default()),
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load_search_request(&self) -> Result<SearchRequest> {
        Ok(self.search.read().await.clone())
    }

    async fn save_search_request(&self, request: &SearchRequest) -> Result<()> {
        *self.search.write().await = request.clone();
        Ok(())
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        Ok(self.token.read().await.clone())
    }

    async fn save_bearer_token(&self, token: &str) -> Result<()> {
        *self.token.write().await = Some(token.to_string());
        tracing::debug!("Saved bearer token");
        Ok(())
    }

    async fn clear_bearer_token(&self) -> Result<()> {
        *self.token.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchKind;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.bearer_token().await.unwrap(), None);

        store.save_bearer_token("abc").await.unwrap();
        assert_eq!(store.bearer_token().await.unwrap().as_deref(), Some("abc"));
        store.clear_bearer_token().await.unwrap();
        assert_eq!(store.bearer_token().await.unwrap(), None);

        let request = SearchRequest {
            title: "Time".into(),
            kind: SearchKind::Album,
            ..Default::default()
        };
        store.save_search_request(&request).await.unwrap();
        assert_eq!(store.load_search_request().await.unwrap(), request);
    }
}
