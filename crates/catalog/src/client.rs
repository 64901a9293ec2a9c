use crate::error::CatalogError;
use crate::models::{first_uri, TokenResponse};
use crate::uri;
use async_trait::async_trait;
use mediabrowse_core::{is_blank, SearchKind, SearchRequest, SettingsStore};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com";
pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// Endpoints and client credentials for the catalog web API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub api_base: String,
    pub accounts_base: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            accounts_base: DEFAULT_ACCOUNTS_BASE.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }
}

impl CatalogConfig {
    pub fn has_credentials(&self) -> bool {
        !is_blank(&self.client_id) && !is_blank(&self.client_secret)
    }
}

/// Anything that can turn a search request into a provider-native identifier
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    async fn resolve(&self, request: &SearchRequest) -> Option<String>;
}

/// Catalog search client with a persisted client-credentials bearer token
///
/// Search: `GET {api_base}/v1/search?type={kind}&limit=1&q={query}`
/// Token:  `POST {accounts_base}/api/token` (`grant_type=client_credentials`)
pub struct CatalogClient {
    http: Client,
    config: CatalogConfig,
    store: Arc<dyn SettingsStore>,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig, store: Arc<dyn SettingsStore>) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { http, config, store })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Resolve a request to a native identifier, or `None` on any failure.
    ///
    /// A 401 from the search endpoint clears the persisted token, fetches a
    /// fresh one and retries once; a second 401 is terminal.
    pub async fn resolve(&self, request: &SearchRequest) -> Option<String> {
        debug!(
            "resolve start query={:?} title={:?} artist={:?} album={:?}",
            request.query, request.title, request.artist, request.album
        );

        if uri::is_native_uri(&request.query) {
            return Some(request.query.clone());
        }
        if let Some(track_uri) = uri::track_uri_from_web_link(&request.query) {
            return Some(track_uri);
        }

        let query = request.primary_query();
        if is_blank(&query) {
            return None;
        }

        let mut token = match self.cached_token().await {
            Some(token) => {
                debug!("resolve: using cached token prefix={}...", token_prefix(&token));
                token
            }
            None => {
                debug!("resolve: no token, fetching new");
                match self.fetch_client_credentials_token().await {
                    Ok(token) => token,
                    Err(e) => {
                        warn!("resolve: token unavailable, cannot resolve: {}", e);
                        return None;
                    }
                }
            }
        };

        let mut refreshed = false;
        loop {
            match self.search(&token, request.kind, &query).await {
                Ok(found) => {
                    debug!("resolve success query={:?} kind={} uri={:?}", query, request.kind, found);
                    return found;
                }
                Err(CatalogError::Unauthorized) if !refreshed => {
                    debug!("Token expired, refreshing...");
                    if let Err(e) = self.store.clear_bearer_token().await {
                        warn!("Failed to clear stale bearer token: {}", e);
                    }
                    token = match self.fetch_client_credentials_token().await {
                        Ok(token) => token,
                        Err(e) => {
                            warn!("resolve: token refresh failed: {}", e);
                            return None;
                        }
                    };
                    refreshed = true;
                }
                Err(e) => {
                    warn!("resolve failed: {}", e);
                    return None;
                }
            }
        }
    }

    /// Resolve a bare name as a free-text track search
    pub async fn resolve_from_name(&self, name: &str) -> Option<String> {
        debug!("resolve_from_name name={:?}", name);
        if is_blank(name) {
            return None;
        }
        self.resolve(&SearchRequest::from_query(name)).await
    }

    /// Exchange the client id/secret for a bearer token and persist it
    pub async fn fetch_client_credentials_token(&self) -> Result<String, CatalogError> {
        if !self.config.has_credentials() {
            return Err(CatalogError::NotConfigured);
        }

        let url = format!("{}/api/token", self.config.accounts_base.trim_end_matches('/'));
        debug!("Requesting client-credentials token from {}", url);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Token request failed: status={} body={}", status, body);
            return Err(CatalogError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        if let Err(e) = self.store.save_bearer_token(&token.access_token).await {
            warn!("Failed to persist bearer token: {}", e);
        }
        debug!("Fetched new bearer token");

        Ok(token.access_token)
    }

    async fn cached_token(&self) -> Option<String> {
        match self.store.bearer_token().await {
            Ok(token) => token.filter(|t| !is_blank(t)),
            Err(e) => {
                warn!("Failed to read bearer token: {}", e);
                None
            }
        }
    }

    async fn search(
        &self,
        token: &str,
        kind: SearchKind,
        query: &str,
    ) -> Result<Option<String>, CatalogError> {
        let url = format!("{}/v1/search", self.config.api_base.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .query(&[("type", kind.as_str()), ("limit", "1"), ("q", query)])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CatalogError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let root: Value = serde_json::from_str(&text)?;
        Ok(first_uri(&root, kind))
    }
}

#[async_trait]
impl CatalogResolver for CatalogClient {
    async fn resolve(&self, request: &SearchRequest) -> Option<String> {
        CatalogClient::resolve(self, request).await
    }
}

fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(6)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
