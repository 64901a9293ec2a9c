//! Launching provider-native URIs
//!
//! Prefers the provider's remote-control SDK when credentials are configured
//! and falls back to a package-targeted view request otherwise.

use mediabrowse_core::{
    is_blank, AppLauncher, LaunchRequest, RemoteConnectionParams, RemoteControl, RemotePlayer,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Prompt shown when the provider wants the user to approve the connection
pub const AUTH_REQUIRED_MESSAGE: &str =
    "Spotify needs authorization. Please approve the prompt and try again.";

pub struct UriLauncher {
    package: String,
    params: RemoteConnectionParams,
    remote: Option<Arc<dyn RemoteControl>>,
    launcher: Arc<dyn AppLauncher>,
    connection: Mutex<Option<Box<dyn RemotePlayer>>>,
}

impl UriLauncher {
    pub fn new(
        package: impl Into<String>,
        params: RemoteConnectionParams,
        remote: Option<Arc<dyn RemoteControl>>,
        launcher: Arc<dyn AppLauncher>,
    ) -> Self {
        Self {
            package: package.into(),
            params,
            remote,
            launcher,
            connection: Mutex::new(None),
        }
    }

    /// True when an SDK is present and both credentials are non-blank
    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
            && !is_blank(&self.params.client_id)
            && !is_blank(&self.params.redirect_uri)
    }

    pub async fn play_uri(&self, uri: &str) {
        if is_blank(uri) {
            warn!("play_uri() called with a blank uri");
            return;
        }

        let Some(remote) = self.remote.as_ref().filter(|_| self.is_configured()) else {
            warn!("Remote control not configured, opening {} directly", uri);
            self.launch_view(uri);
            return;
        };

        let mut connection = self.connection.lock().await;
        let reused = match connection.as_ref() {
            Some(player) => Some(player.play(uri).await),
            None => None,
        };
        match reused {
            Some(Ok(())) => {
                debug!("Played {} over existing remote connection", uri);
                return;
            }
            Some(Err(e)) => {
                debug!("Existing remote connection failed ({}), reconnecting", e);
                if let Some(stale) = connection.take() {
                    stale.disconnect().await;
                }
            }
            None => {}
        }

        match remote.connect(&self.params).await {
            Ok(player) => {
                info!("Remote control connected");
                if let Err(e) = player.play(uri).await {
                    warn!("Remote play of {} failed: {}", uri, e);
                }
                *connection = Some(player);
            }
            Err(e) => {
                warn!("Remote control connection failed: {}", e);
                if e.is_authorization() {
                    self.launcher.notify_user(AUTH_REQUIRED_MESSAGE);
                }
                self.launch_view(uri);
            }
        }
    }

    /// Tear down the remote channel, if one is open
    pub async fn disconnect(&self) {
        if let Some(player) = self.connection.lock().await.take() {
            player.disconnect().await;
            debug!("Remote control disconnected");
        }
    }

    fn launch_view(&self, uri: &str) {
        let request = LaunchRequest::View {
            package: self.package.clone(),
            uri: uri.to_string(),
        };
        if let Err(e) = self.launcher.launch(&request) {
            warn!("Failed to open {} with {}: {}", uri, self.package, e);
        }
    }
}
