use mediabrowse_catalog::{CatalogClient, CatalogConfig};
use mediabrowse_core::{MemorySettingsStore, SearchKind, SearchRequest, SettingsStore};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64("client:secret")
const BASIC_AUTH: &str = "Basic Y2xpZW50OnNlY3JldA==";

fn config(server: &MockServer) -> CatalogConfig {
    CatalogConfig {
        api_base: server.uri(),
        accounts_base: server.uri(),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
    }
}

fn thriller() -> SearchRequest {
    SearchRequest {
        title: "Thriller".to_string(),
        artist: "Michael Jackson".to_string(),
        kind: SearchKind::Track,
        ..Default::default()
    }
}

fn track_result(uri: &str) -> serde_json::Value {
    json!({ "tracks": { "items": [ { "uri": uri, "name": "Thriller" } ] } })
}

async fn mount_token(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header("Authorization", BASIC_AUTH))
        .and(body_string("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetches_token_then_searches() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("type", "track"))
        .and(query_param("limit", "1"))
        .and(query_param("q", "Michael Jackson Thriller"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_result("spotify:track:2LlDHnm4y3fT5KAXp21xli")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySettingsStore::new());
    let client = CatalogClient::new(config(&server), store.clone()).unwrap();

    let uri = client.resolve(&thriller()).await;
    assert_eq!(uri.as_deref(), Some("spotify:track:2LlDHnm4y3fT5KAXp21xli"));
    assert_eq!(store.bearer_token().await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_expired_token_refreshes_once_and_retries() {
    let server = MockServer::start().await;
    mount_token(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_result("spotify:track:abc")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySettingsStore::with_token("stale"));
    let client = CatalogClient::new(config(&server), store.clone()).unwrap();

    assert_eq!(client.resolve(&thriller()).await.as_deref(), Some("spotify:track:abc"));
    assert_eq!(store.bearer_token().await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_second_unauthorized_is_terminal() {
    let server = MockServer::start().await;
    mount_token(&server, "also-rejected", 1).await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySettingsStore::with_token("stale"));
    let client = CatalogClient::new(config(&server), store).unwrap();

    assert_eq!(client.resolve(&thriller()).await, None);
}

#[tokio::test]
async fn test_server_error_fails_without_refresh() {
    let server = MockServer::start().await;
    mount_token(&server, "unused", 0).await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySettingsStore::with_token("valid"));
    let client = CatalogClient::new(config(&server), store).unwrap();

    assert_eq!(client.resolve(&thriller()).await, None);
}

#[tokio::test]
async fn test_failed_token_exchange_skips_search() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_client"}"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_result("spotify:track:x")))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySettingsStore::new());
    let client = CatalogClient::new(config(&server), store.clone()).unwrap();

    assert_eq!(client.resolve(&thriller()).await, None);
    assert_eq!(store.bearer_token().await.unwrap(), None);
}

#[tokio::test]
async fn test_album_search_reads_album_collection() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("type", "album"))
        .and(query_param("q", "Thriller"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "albums": { "items": [ { "uri": "spotify:album:2ANVost0y2y52ema1E9xAZ" } ] },
            "tracks": { "items": [ { "uri": "spotify:track:wrong" } ] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemorySettingsStore::with_token("valid"));
    let client = CatalogClient::new(config(&server), store).unwrap();

    let request = SearchRequest {
        query: "Thriller".to_string(),
        kind: SearchKind::Album,
        ..Default::default()
    };
    assert_eq!(
        client.resolve(&request).await.as_deref(),
        Some("spotify:album:2ANVost0y2y52ema1E9xAZ")
    );
}
