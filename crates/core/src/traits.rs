use crate::error::{RemoteError, SessionError};
use crate::models::{
    LaunchRequest, MediaMetadata, PlaybackState, SearchExtras, SearchRequest,
};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Change notification raised by a single session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    MetadataChanged(Option<MediaMetadata>),
    PlaybackStateChanged(Option<PlaybackState>),
}

/// A controller event tagged with the package that raised it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerUpdate {
    pub package_name: String,
    pub event: ControllerEvent,
}

pub type ControllerEventSink = UnboundedSender<ControllerUpdate>;

/// Receives the full list of active sessions whenever it changes.
/// An empty list may mean "unknown" on some platforms.
pub type SessionsChangedSink = UnboundedSender<Vec<Arc<dyn MediaController>>>;

/// Handle to one provider's live playback session.
///
/// Owned by the platform; holders must check `is_valid` before use and must
/// read `playback_state` fresh each time since the provider mutates it.
pub trait MediaController: Send + Sync {
    fn package_name(&self) -> &str;

    /// False once the platform has torn the session down
    fn is_valid(&self) -> bool;

    fn metadata(&self) -> Option<MediaMetadata>;

    fn playback_state(&self) -> Option<PlaybackState>;

    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn skip_to_next(&self) -> Result<()>;
    fn skip_to_previous(&self) -> Result<()>;
    fn fast_forward(&self) -> Result<()>;
    fn rewind(&self) -> Result<()>;
    fn play_from_search(&self, query: &str, extras: &SearchExtras) -> Result<()>;
    fn play_from_media_id(&self, media_id: &str, extras: Option<&SearchExtras>) -> Result<()>;
    fn play_from_uri(&self, uri: &str) -> Result<()>;

    /// Start forwarding metadata/state changes to `sink`
    fn register_callback(&self, sink: ControllerEventSink) -> Result<()>;

    fn unregister_callback(&self);
}

/// Which sessions to enumerate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionScope {
    /// Sessions visible through this app's listener component
    Listener,
    /// No component filter; some platforms only answer this form
    Unfiltered,
}

/// Platform broker of active media sessions
pub trait SessionManager: Send + Sync {
    /// Whether this app is an enabled notification/media listener
    fn has_listener_access(&self) -> bool;

    fn active_sessions(&self, scope: SessionScope) -> Result<Vec<Arc<dyn MediaController>>, SessionError>;

    fn add_sessions_listener(&self, sink: SessionsChangedSink) -> Result<(), SessionError>;

    fn remove_sessions_listener(&self) -> Result<(), SessionError>;
}

/// Static discovery of installed media-capable apps
pub trait AppDirectory: Send + Sync {
    /// Apps declaring the music player role
    fn music_players(&self) -> Vec<String>;

    /// Apps registering a media button receiver
    fn media_button_receivers(&self) -> Vec<String>;

    /// Apps exposing a media browse service
    fn media_browser_services(&self) -> Vec<String>;

    fn is_installed(&self, package_name: &str) -> bool;

    /// Human-readable label, if the package resolves
    fn label(&self, package_name: &str) -> Option<String>;
}

/// System-level app launching and the single user-visible prompt
pub trait AppLauncher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> Result<()>;

    fn notify_user(&self, message: &str);
}

/// Parameters for a provider remote-control SDK connection
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteConnectionParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub show_auth_view: bool,
}

/// A provider's native remote-control SDK
#[async_trait]
pub trait RemoteControl: Send + Sync {
    async fn connect(&self, params: &RemoteConnectionParams) -> Result<Box<dyn RemotePlayer>, RemoteError>;
}

/// An open remote-control channel
#[async_trait]
pub trait RemotePlayer: Send + Sync {
    async fn play(&self, uri: &str) -> Result<()>;

    async fn disconnect(&self);
}

/// Key-value persistence for the last search request and the bearer token
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_search_request(&self) -> Result<SearchRequest>;

    async fn save_search_request(&self, request: &SearchRequest) -> Result<()>;

    async fn bearer_token(&self) -> Result<Option<String>>;

    async fn save_bearer_token(&self, token: &str) -> Result<()>;

    async fn clear_bearer_token(&self) -> Result<()>;
}
