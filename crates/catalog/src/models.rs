use mediabrowse_core::SearchKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response from the client-credentials token endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// One page of a search result collection (`tracks`, `albums`, ...)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Paging {
    /// Entries may be null for content the caller cannot see
    #[serde(default)]
    pub items: Vec<Option<CatalogItem>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogItem {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Paging {
    /// First non-blank uri, skipping null entries
    pub fn first_uri(&self) -> Option<String> {
        self.items
            .iter()
            .flatten()
            .filter_map(|item| item.uri.as_deref())
            .find(|uri| !uri.trim().is_empty())
            .map(str::to_string)
    }
}

/// Top-level key of the result collection for a kind (`track` -> `tracks`)
pub fn collection_key(kind: SearchKind) -> String {
    format!("{}s", kind.as_str())
}

/// Pick the first playable identifier for `kind` out of a search response.
///
/// Track searches also look at `episodes`: the endpoint sometimes files
/// podcast content there even when only tracks were requested.
pub fn first_uri(root: &Value, kind: SearchKind) -> Option<String> {
    let primary = uri_in_collection(root, &collection_key(kind));
    match kind {
        SearchKind::Track => primary.or_else(|| uri_in_collection(root, "episodes")),
        _ => primary,
    }
}

fn uri_in_collection(root: &Value, key: &str) -> Option<String> {
    let collection = root.get(key)?;
    let paging: Paging = serde_json::from_value(collection.clone()).ok()?;
    paging.first_uri()
}
