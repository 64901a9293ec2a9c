use mediabrowse_core::RemoteConnectionParams;
use serde::{Deserialize, Serialize};

/// Package id the platform reports for the integrated streaming provider.
/// On Linux this is the MPRIS bus name suffix.
#[cfg(target_os = "linux")]
pub const SPOTIFY_PACKAGE: &str = "spotify";
#[cfg(not(target_os = "linux"))]
pub const SPOTIFY_PACKAGE: &str = "com.spotify.music";

/// Well-known players that are offered even when they declare no media role
/// of their own
#[cfg(target_os = "linux")]
pub const KNOWN_MEDIA_PACKAGES: [&str; 4] = [SPOTIFY_PACKAGE, "rhythmbox", "vlc", "quodlibet"];
#[cfg(not(target_os = "linux"))]
pub const KNOWN_MEDIA_PACKAGES: [&str; 4] = [
    SPOTIFY_PACKAGE,
    "com.amazon.mp3",
    "com.google.android.apps.youtube.music",
    "com.apple.android.music",
];

/// The integrated streaming provider and its remote-control credentials
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Package the catalog URIs are launched with
    pub package: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub known_packages: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            package: SPOTIFY_PACKAGE.to_string(),
            client_id: String::new(),
            redirect_uri: String::new(),
            known_packages: KNOWN_MEDIA_PACKAGES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ProviderConfig {
    pub fn connection_params(&self) -> RemoteConnectionParams {
        RemoteConnectionParams {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            show_auth_view: true,
        }
    }
}
