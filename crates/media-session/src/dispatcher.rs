//! Command routing
//!
//! Every play or transport command goes to the session that can honor it
//! directly, and falls back to a package-targeted launch request when the
//! session is absent or does not advertise the needed capability. Capability
//! bits are read from the session each time, never cached.

use crate::aggregator::SessionAggregator;
use mediabrowse_catalog::uri::{extract_track_id, is_native_uri, search_uri, NATIVE_SCHEME};
use mediabrowse_core::{
    is_blank, AppLauncher, LaunchRequest, MediaController, SearchExtras, SearchRequest,
    TransportActions,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transport verbs forwarded to the active session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportOp {
    Play,
    Pause,
    SkipToNext,
    SkipToPrevious,
    FastForward,
    Rewind,
}

impl TransportOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportOp::Play => "play",
            TransportOp::Pause => "pause",
            TransportOp::SkipToNext => "next",
            TransportOp::SkipToPrevious => "previous",
            TransportOp::FastForward => "fast_forward",
            TransportOp::Rewind => "rewind",
        }
    }
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct CommandDispatcher {
    launcher: Arc<dyn AppLauncher>,
    provider_package: String,
}

impl CommandDispatcher {
    pub fn new(launcher: Arc<dyn AppLauncher>, provider_package: impl Into<String>) -> Self {
        Self {
            launcher,
            provider_package: provider_package.into(),
        }
    }

    pub fn provider_package(&self) -> &str {
        &self.provider_package
    }

    /// Play a search on the selected provider
    pub fn play_from_search(&self, aggregator: &mut SessionAggregator, request: &SearchRequest) {
        if request.is_empty() {
            debug!("play_from_search() ignored: empty request");
            return;
        }

        let extras = request.search_extras();
        let primary = request.primary_query();
        let active = aggregator.active_controller();
        let selected = aggregator.selected_package();
        debug!(
            "play_from_search() selected={:?} active={:?} query={:?} extras={}",
            selected,
            active.as_ref().map(|c| c.package_name()),
            primary,
            extras
        );

        if let (Some(controller), Some(selected)) = (&active, &selected) {
            if controller.package_name() == selected.as_str()
                && try_play_from_search(controller.as_ref(), &primary, &extras)
            {
                return;
            }
        }

        let Some(target) = selected else {
            debug!("play_from_search() ignored: no provider selected");
            return;
        };
        self.launch_search(&target, &primary, &extras);
    }

    /// Play a search on the integrated provider regardless of selection
    pub fn play_catalog_search(&self, aggregator: &mut SessionAggregator, request: &SearchRequest) {
        if request.is_empty() {
            debug!("play_catalog_search() ignored: empty request");
            return;
        }

        let extras = request.search_extras();
        let primary = request.primary_query();
        if let Some(controller) = self.provider_session(aggregator) {
            if try_play_from_search(controller.as_ref(), &primary, &extras) {
                return;
            }
        }

        let launch = LaunchRequest::PlayFromSearch {
            package: self.provider_package.clone(),
            query: Some(primary),
            extras,
        };
        if let Err(e) = self.launcher.launch(&launch) {
            warn!("Failed to launch catalog search on {}: {}", self.provider_package, e);
        }
    }

    /// Play a resolved catalog URI through the provider's session.
    ///
    /// Returns the native URI when no session can take it and the caller has
    /// to fall back to a URI launch.
    pub fn play_catalog_item(&self, aggregator: &mut SessionAggregator, uri: &str) -> Option<String> {
        if is_blank(uri) {
            warn!("play_catalog_item() ignored: blank uri");
            return None;
        }
        let Some(media_id) = extract_track_id(uri.trim()) else {
            warn!("play_catalog_item() ignored: no track id in {}", uri);
            return None;
        };

        let native_uri = format!("{NATIVE_SCHEME}track:{media_id}");

        if let Some(controller) = self.provider_session(aggregator) {
            if supports(controller.as_ref(), TransportActions::PLAY_FROM_MEDIA_ID) {
                match controller.play_from_media_id(&media_id, None) {
                    Ok(()) => {
                        debug!("play_from_media_id({}) sent to {}", media_id, controller.package_name());
                        return None;
                    }
                    Err(e) => warn!("play_from_media_id failed: {}", e),
                }
            } else if supports(controller.as_ref(), TransportActions::PLAY_FROM_URI) {
                match controller.play_from_uri(&native_uri) {
                    Ok(()) => {
                        debug!("play_from_uri({}) sent to {}", native_uri, controller.package_name());
                        return None;
                    }
                    Err(e) => warn!("play_from_uri failed: {}", e),
                }
            } else {
                debug!("{} takes neither media ids nor URIs", controller.package_name());
            }
        }

        Some(native_uri)
    }

    /// Play a search on an explicit package, bypassing selection.
    ///
    /// A native URI query aimed at the integrated provider is handed back
    /// for a URI launch instead.
    pub fn play_on_package(
        &self,
        aggregator: &mut SessionAggregator,
        package: &str,
        request: &SearchRequest,
    ) -> Option<String> {
        if is_blank(package) || request.is_empty() {
            debug!("play_on_package() ignored: package={:?} empty={}", package, request.is_empty());
            return None;
        }

        let query = request.query.trim();
        if package == self.provider_package && is_native_uri(query) {
            return Some(query.to_string());
        }

        let controller = aggregator.controller_for(package).or_else(|| {
            aggregator.reload_sessions();
            aggregator.controller_for(package)
        });

        let extras = request.search_extras();
        let primary = request.primary_query();
        if let Some(controller) = controller {
            if try_play_from_search(controller.as_ref(), &primary, &extras) {
                return None;
            }
        }

        let launch = LaunchRequest::PlayFromSearch {
            package: package.to_string(),
            query: Some(primary),
            extras,
        };
        if let Err(e) = self.launcher.launch(&launch) {
            warn!("Failed to launch search on {}: {}", package, e);
        }
        None
    }

    pub fn transport(&self, aggregator: &mut SessionAggregator, op: TransportOp) {
        let Some(controller) = aggregator.active_controller() else {
            debug!("{} ignored: no active session", op);
            return;
        };

        let result = match op {
            TransportOp::Play => controller.play(),
            TransportOp::Pause => controller.pause(),
            TransportOp::SkipToNext => controller.skip_to_next(),
            TransportOp::SkipToPrevious => controller.skip_to_previous(),
            TransportOp::FastForward => controller.fast_forward(),
            TransportOp::Rewind => controller.rewind(),
        };
        if let Err(e) = result {
            warn!("{} failed on {}: {}", op, controller.package_name(), e);
        }
    }

    /// Pause when playing or buffering, play otherwise
    pub fn play_or_pause(&self, aggregator: &mut SessionAggregator) {
        let op = if aggregator.state().playback_status.is_active() {
            TransportOp::Pause
        } else {
            TransportOp::Play
        };
        self.transport(aggregator, op);
    }

    /// Open the provider's own search screen for `query`
    pub fn open_catalog_search(&self, query: &str) {
        if is_blank(query) {
            return;
        }
        let launch = LaunchRequest::View {
            package: self.provider_package.clone(),
            uri: search_uri(query.trim()),
        };
        if let Err(e) = self.launcher.launch(&launch) {
            warn!("Failed to open catalog search: {}", e);
        }
    }

    fn launch_search(&self, package: &str, query: &str, extras: &SearchExtras) {
        let primary = LaunchRequest::PlayFromSearch {
            package: package.to_string(),
            query: Some(query.to_string()),
            extras: extras.clone(),
        };
        match self.launcher.launch(&primary) {
            Ok(()) => debug!("Launched play-from-search on {}", package),
            Err(e) => {
                debug!("play-from-search launch failed on {}: {}, trying media search", package, e);
                let legacy = LaunchRequest::MediaSearch {
                    package: package.to_string(),
                    extras: extras.clone(),
                };
                if let Err(e) = self.launcher.launch(&legacy) {
                    warn!("No search launch accepted by {}: {}", package, e);
                }
            }
        }
    }

    /// The active session, if it belongs to the integrated provider
    fn provider_session(&self, aggregator: &mut SessionAggregator) -> Option<Arc<dyn MediaController>> {
        aggregator
            .active_controller()
            .filter(|c| c.package_name() == self.provider_package)
    }
}

fn supports(controller: &dyn MediaController, action: TransportActions) -> bool {
    controller
        .playback_state()
        .map(|s| s.actions.contains(action))
        .unwrap_or(false)
}

/// Direct play-from-search when the session advertises it; false means the
/// caller should fall back
fn try_play_from_search(controller: &dyn MediaController, query: &str, extras: &SearchExtras) -> bool {
    let actions = controller
        .playback_state()
        .map(|s| s.actions)
        .unwrap_or(TransportActions::NONE);
    if !actions.contains(TransportActions::PLAY_FROM_SEARCH) {
        debug!(
            "{} does not advertise PLAY_FROM_SEARCH (actions={})",
            controller.package_name(),
            actions
        );
        return false;
    }

    match controller.play_from_search(query, extras) {
        Ok(()) => {
            debug!("play_from_search({:?}) sent to {}", query, controller.package_name());
            true
        }
        Err(e) => {
            warn!("play_from_search failed on {}: {}", controller.package_name(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use mediabrowse_core::{PlayerState, SearchKind};

    const SPOTIFY: &str = crate::SPOTIFY_PACKAGE;

    fn thriller() -> SearchRequest {
        SearchRequest {
            title: "Thriller".into(),
            artist: "Michael Jackson".into(),
            kind: SearchKind::Track,
            ..Default::default()
        }
    }

    fn dispatcher(launcher: &Arc<FakeLauncher>) -> CommandDispatcher {
        CommandDispatcher::new(launcher.clone(), SPOTIFY)
    }

    #[test]
    fn test_play_from_search_uses_session_when_supported() {
        let spotify = FakeController::new(SPOTIFY);
        spotify.set_state(PlayerState::Paused, TransportActions::PLAY_FROM_SEARCH | TransportActions::PLAY);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![spotify.clone()]));
        let mut aggregator = started_aggregator(sessions, FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());

        dispatcher(&launcher).play_from_search(&mut aggregator, &thriller());

        assert_eq!(spotify.calls(), vec!["play_from_search:Michael Jackson Thriller"]);
        assert!(launcher.launches().is_empty());
    }

    #[test]
    fn test_play_from_search_without_capability_launches() {
        let spotify = FakeController::new(SPOTIFY);
        spotify.set_state(PlayerState::Playing, TransportActions::PLAY | TransportActions::PAUSE);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![spotify.clone()]));
        let mut aggregator = started_aggregator(sessions, FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());

        dispatcher(&launcher).play_from_search(&mut aggregator, &thriller());

        assert!(spotify.calls().is_empty());
        assert_eq!(
            launcher.launches(),
            vec![LaunchRequest::PlayFromSearch {
                package: SPOTIFY.into(),
                query: Some("Michael Jackson Thriller".into()),
                extras: thriller().search_extras(),
            }]
        );
    }

    #[test]
    fn test_play_from_search_without_session_launches_selected() {
        let vlc = FakeController::new("org.videolan.vlc");
        vlc.set_state(PlayerState::Playing, TransportActions::PLAY_FROM_SEARCH);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![vlc.clone()]));
        let apps = FakeAppDirectory::default().with_players(&["com.amazon.mp3"]);
        let mut aggregator = started_aggregator(sessions, apps);
        aggregator.select("com.amazon.mp3");
        let launcher = Arc::new(FakeLauncher::default());

        dispatcher(&launcher).play_from_search(&mut aggregator, &SearchRequest::from_query("bad"));

        assert!(vlc.calls().is_empty());
        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].package(), "com.amazon.mp3");
    }

    #[test]
    fn test_rejected_launch_falls_back_to_media_search() {
        let apps = FakeAppDirectory::default().with_players(&["com.amazon.mp3"]);
        let mut aggregator = started_aggregator(Arc::new(FakeSessionManager::granted()), apps);
        aggregator.select("com.amazon.mp3");
        let launcher = Arc::new(FakeLauncher::default().rejecting_play_from_search());

        dispatcher(&launcher).play_from_search(&mut aggregator, &thriller());

        let launches = launcher.launches();
        assert_eq!(launches.len(), 2);
        assert_eq!(
            launches[1],
            LaunchRequest::MediaSearch {
                package: "com.amazon.mp3".into(),
                extras: thriller().search_extras(),
            }
        );
    }

    #[test]
    fn test_empty_or_unselected_requests_have_no_effect() {
        let launcher = Arc::new(FakeLauncher::default());
        let apps = FakeAppDirectory::default().with_players(&[SPOTIFY]);
        let mut aggregator = started_aggregator(Arc::new(FakeSessionManager::granted()), apps);
        let dispatcher = dispatcher(&launcher);

        // Nothing selected yet
        dispatcher.play_from_search(&mut aggregator, &thriller());

        aggregator.select(SPOTIFY);
        let blank = SearchRequest::from_query("   ");
        dispatcher.play_from_search(&mut aggregator, &blank);
        dispatcher.play_catalog_search(&mut aggregator, &blank);
        assert_eq!(dispatcher.play_catalog_item(&mut aggregator, " "), None);
        assert_eq!(dispatcher.play_on_package(&mut aggregator, SPOTIFY, &blank), None);
        dispatcher.open_catalog_search("  ");

        assert!(launcher.launches().is_empty());
    }

    #[test]
    fn test_transport_without_session_is_noop() {
        let apps = FakeAppDirectory::default().with_players(&[SPOTIFY]);
        let mut aggregator = started_aggregator(Arc::new(FakeSessionManager::granted()), apps);
        aggregator.select(SPOTIFY);
        let launcher = Arc::new(FakeLauncher::default());

        dispatcher(&launcher).transport(&mut aggregator, TransportOp::SkipToNext);

        assert!(launcher.launches().is_empty());
    }

    #[test]
    fn test_transport_and_toggle_reach_active_session() {
        let vlc = FakeController::new("org.videolan.vlc");
        vlc.set_state(PlayerState::Playing, TransportActions::PAUSE);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![vlc.clone()]));
        let mut aggregator = started_aggregator(sessions, FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());
        let dispatcher = dispatcher(&launcher);

        dispatcher.transport(&mut aggregator, TransportOp::SkipToPrevious);
        dispatcher.transport(&mut aggregator, TransportOp::FastForward);
        dispatcher.play_or_pause(&mut aggregator);

        assert_eq!(vlc.calls(), vec!["previous", "fast_forward", "pause"]);
    }

    #[test]
    fn test_catalog_item_prefers_media_id_on_provider_session() {
        let spotify = FakeController::new(SPOTIFY);
        spotify.set_state(PlayerState::Paused, TransportActions::PLAY_FROM_MEDIA_ID);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![spotify.clone()]));
        let mut aggregator = started_aggregator(sessions, FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());

        let fallback = dispatcher(&launcher)
            .play_catalog_item(&mut aggregator, "spotify:track:2LlQb7Uoj1kKyGhlkBf9aC");

        assert_eq!(fallback, None);
        assert_eq!(spotify.calls(), vec!["play_from_media_id:2LlQb7Uoj1kKyGhlkBf9aC"]);
    }

    #[test]
    fn test_catalog_item_opens_uri_when_media_ids_unsupported() {
        let spotify = FakeController::new(SPOTIFY);
        spotify.set_state(PlayerState::Paused, TransportActions::PLAY | TransportActions::PLAY_FROM_URI);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![spotify.clone()]));
        let mut aggregator = started_aggregator(sessions, FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());

        let fallback = dispatcher(&launcher).play_catalog_item(
            &mut aggregator,
            "https://open.spotify.com/track/2LlQb7Uoj1kKyGhlkBf9aC",
        );

        assert_eq!(fallback, None);
        assert_eq!(spotify.calls(), vec!["play_from_uri:spotify:track:2LlQb7Uoj1kKyGhlkBf9aC"]);
        assert!(launcher.launches().is_empty());
    }

    #[test]
    fn test_catalog_item_without_session_returns_native_uri() {
        let mut aggregator = started_aggregator(
            Arc::new(FakeSessionManager::granted()),
            FakeAppDirectory::default(),
        );
        let launcher = Arc::new(FakeLauncher::default());
        let dispatcher = dispatcher(&launcher);

        assert_eq!(
            dispatcher.play_catalog_item(
                &mut aggregator,
                "https://open.spotify.com/track/2LlQb7Uoj1kKyGhlkBf9aC?si=x"
            ),
            Some("spotify:track:2LlQb7Uoj1kKyGhlkBf9aC".to_string())
        );
        // Only track ids can be extracted
        assert_eq!(dispatcher.play_catalog_item(&mut aggregator, "spotify:album:1"), None);
    }

    #[test]
    fn test_catalog_search_targets_provider_not_selection() {
        let vlc = FakeController::new("org.videolan.vlc");
        vlc.set_state(PlayerState::Playing, TransportActions::PLAY_FROM_SEARCH);
        let sessions = Arc::new(FakeSessionManager::granted().with_sessions(vec![vlc.clone()]));
        let mut aggregator = started_aggregator(sessions, FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());

        dispatcher(&launcher).play_catalog_search(&mut aggregator, &thriller());

        assert!(vlc.calls().is_empty());
        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].package(), SPOTIFY);
    }

    #[test]
    fn test_play_on_package_routing() {
        let vlc = FakeController::new("org.videolan.vlc");
        vlc.set_state(PlayerState::Paused, TransportActions::PLAY_FROM_SEARCH);
        let sessions = Arc::new(FakeSessionManager::granted());
        let mut aggregator = started_aggregator(sessions.clone(), FakeAppDirectory::default());
        let launcher = Arc::new(FakeLauncher::default());
        let dispatcher = dispatcher(&launcher);

        let native = SearchRequest::from_query(" spotify:track:2LlQb7Uoj1kKyGhlkBf9aC ");
        assert_eq!(
            dispatcher.play_on_package(&mut aggregator, SPOTIFY, &native),
            Some("spotify:track:2LlQb7Uoj1kKyGhlkBf9aC".to_string())
        );

        // Session appears after the last scan; the lookup re-queries
        sessions.set_sessions(vec![vlc.clone()]);
        dispatcher.play_on_package(&mut aggregator, "org.videolan.vlc", &thriller());
        assert_eq!(vlc.calls(), vec!["play_from_search:Michael Jackson Thriller"]);

        dispatcher.play_on_package(&mut aggregator, "com.amazon.mp3", &thriller());
        assert_eq!(launcher.launches()[0].package(), "com.amazon.mp3");
    }

    #[test]
    fn test_open_catalog_search_builds_search_uri() {
        let launcher = Arc::new(FakeLauncher::default());

        dispatcher(&launcher).open_catalog_search(" michael jackson ");

        assert_eq!(
            launcher.launches(),
            vec![LaunchRequest::View {
                package: SPOTIFY.into(),
                uri: "spotify:search:michael%20jackson".into(),
            }]
        );
    }
}
