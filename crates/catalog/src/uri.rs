//! Helpers for the streaming provider's native URI scheme

/// Prefix shared by every native identifier (`spotify:track:...`, `spotify:album:...`)
pub const NATIVE_SCHEME: &str = "spotify:";

const TRACK_PREFIX: &str = "spotify:track:";
const TRACK_LINK_MARKER: &str = "open.spotify.com/track/";

pub fn is_native_uri(s: &str) -> bool {
    s.starts_with(NATIVE_SCHEME)
}

/// Convert a `https://open.spotify.com/track/{id}?...` link into `spotify:track:{id}`
pub fn track_uri_from_web_link(s: &str) -> Option<String> {
    let start = s.find(TRACK_LINK_MARKER)? + TRACK_LINK_MARKER.len();
    let rest = &s[start..];
    let id = match rest.find('?') {
        Some(end) => &rest[..end],
        None => rest,
    };
    if id.trim().is_empty() {
        return None;
    }
    Some(format!("{TRACK_PREFIX}{id}"))
}

/// Provider-native track id from a native track URI or a track web link
pub fn extract_track_id(uri: &str) -> Option<String> {
    let id = if let Some(id) = uri.strip_prefix(TRACK_PREFIX) {
        id.to_string()
    } else if uri.contains(TRACK_LINK_MARKER) {
        track_uri_from_web_link(uri)?
            .strip_prefix(TRACK_PREFIX)?
            .to_string()
    } else {
        return None;
    };

    if id.trim().is_empty() {
        None
    } else {
        Some(id)
    }
}

/// In-app search URI for a free-text query
pub fn search_uri(query: &str) -> String {
    format!("{NATIVE_SCHEME}search:{}", urlencoding::encode(query))
}
