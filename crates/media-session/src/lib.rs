//! Media session aggregation and command routing
//!
//! This crate tracks the media sessions published by other apps, keeps one
//! of them bound as the active controller, and routes play, search and
//! transport commands to it with launch-request fallbacks:
//! - [`SessionAggregator`]: single-writer state machine over the platform broker
//! - [`CommandDispatcher`]: capability-checked routing and launch fallbacks
//! - [`UriLauncher`]: remote-control SDK first, view request second
//! - [`MediaService`]: actor that owns all of the above
//!
//! The only platform backend is Linux (MPRIS via D-Bus).

mod aggregator;
mod config;
mod dispatcher;
mod remote;
mod service;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(test)]
mod test_utils;

pub use aggregator::SessionAggregator;
pub use config::{ProviderConfig, KNOWN_MEDIA_PACKAGES, SPOTIFY_PACKAGE};
pub use dispatcher::{CommandDispatcher, TransportOp};
pub use remote::{UriLauncher, AUTH_REQUIRED_MESSAGE};
pub use service::{MediaService, MediaServiceDeps, MediaServiceHandle};

use anyhow::Result;
use mediabrowse_core::{AppDirectory, AppLauncher, SessionManager};
use std::sync::Arc;

/// Platform implementations of the session, discovery and launch seams
pub struct PlatformBackend {
    pub sessions: Arc<dyn SessionManager>,
    pub apps: Arc<dyn AppDirectory>,
    pub launcher: Arc<dyn AppLauncher>,
}

/// Create the backend for the current platform
pub fn create_platform_backend() -> Result<PlatformBackend> {
    #[cfg(target_os = "linux")]
    return Ok(PlatformBackend {
        sessions: Arc::new(linux::MprisSessionManager::new()),
        apps: Arc::new(linux::DesktopAppDirectory::default()),
        launcher: Arc::new(linux::XdgLauncher::new()),
    });

    #[cfg(not(target_os = "linux"))]
    return Err(anyhow::anyhow!(
        "Unsupported platform - media session access requires Linux (MPRIS)"
    ));
}
