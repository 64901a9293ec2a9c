//! In-memory platform fakes shared by the unit tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mediabrowse_catalog::CatalogResolver;
use mediabrowse_core::{
    AppDirectory, AppLauncher, ControllerEvent, ControllerEventSink, ControllerUpdate,
    LaunchRequest, MediaController, MediaMetadata, PlaybackState, PlayerState,
    RemoteConnectionParams, RemoteControl, RemoteError, RemotePlayer, SearchExtras,
    SearchRequest, SessionError, SessionManager, SessionScope, SessionsChangedSink,
    TransportActions,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct FakeController {
    package: String,
    valid: AtomicBool,
    metadata: Mutex<Option<MediaMetadata>>,
    state: Mutex<Option<PlaybackState>>,
    sink: Mutex<Option<ControllerEventSink>>,
    calls: Mutex<Vec<String>>,
}

impl FakeController {
    pub fn new(package: &str) -> Arc<Self> {
        Arc::new(Self {
            package: package.to_string(),
            valid: AtomicBool::new(true),
            metadata: Mutex::new(None),
            state: Mutex::new(None),
            sink: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_metadata(self: Arc<Self>, metadata: MediaMetadata) -> Arc<Self> {
        *self.metadata.lock().unwrap() = Some(metadata);
        self
    }

    pub fn set_state(&self, state: PlayerState, actions: TransportActions) {
        *self.state.lock().unwrap() = Some(PlaybackState { state, actions });
    }

    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    pub fn is_registered(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn push_metadata(&self, metadata: MediaMetadata) {
        *self.metadata.lock().unwrap() = Some(metadata.clone());
        self.emit(ControllerEvent::MetadataChanged(Some(metadata)));
    }

    pub fn push_state(&self, state: PlaybackState) {
        *self.state.lock().unwrap() = Some(state);
        self.emit(ControllerEvent::PlaybackStateChanged(Some(state)));
    }

    fn emit(&self, event: ControllerEvent) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(ControllerUpdate {
                package_name: self.package.clone(),
                event,
            });
        }
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl MediaController for FakeController {
    fn package_name(&self) -> &str {
        &self.package
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn metadata(&self) -> Option<MediaMetadata> {
        self.metadata.lock().unwrap().clone()
    }

    fn playback_state(&self) -> Option<PlaybackState> {
        *self.state.lock().unwrap()
    }

    fn play(&self) -> Result<()> {
        self.record("play".into())
    }

    fn pause(&self) -> Result<()> {
        self.record("pause".into())
    }

    fn skip_to_next(&self) -> Result<()> {
        self.record("next".into())
    }

    fn skip_to_previous(&self) -> Result<()> {
        self.record("previous".into())
    }

    fn fast_forward(&self) -> Result<()> {
        self.record("fast_forward".into())
    }

    fn rewind(&self) -> Result<()> {
        self.record("rewind".into())
    }

    fn play_from_search(&self, query: &str, _extras: &SearchExtras) -> Result<()> {
        self.record(format!("play_from_search:{}", query))
    }

    fn play_from_media_id(&self, media_id: &str, _extras: Option<&SearchExtras>) -> Result<()> {
        self.record(format!("play_from_media_id:{}", media_id))
    }

    fn play_from_uri(&self, uri: &str) -> Result<()> {
        self.record(format!("play_from_uri:{}", uri))
    }

    fn register_callback(&self, sink: ControllerEventSink) -> Result<()> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn unregister_callback(&self) {
        *self.sink.lock().unwrap() = None;
    }
}

fn as_dyn(controllers: &[Arc<FakeController>]) -> Vec<Arc<dyn MediaController>> {
    controllers
        .iter()
        .map(|c| c.clone() as Arc<dyn MediaController>)
        .collect()
}

#[derive(Default)]
pub struct FakeSessionManager {
    access: AtomicBool,
    reject_listener: AtomicBool,
    sessions: Mutex<Vec<Arc<FakeController>>>,
    unfiltered: Mutex<Vec<Arc<FakeController>>>,
    sink: Mutex<Option<SessionsChangedSink>>,
    queries: AtomicUsize,
    adds: AtomicUsize,
    removes: AtomicUsize,
}

impl FakeSessionManager {
    pub fn granted() -> Self {
        let manager = Self::default();
        manager.set_access(true);
        manager
    }

    pub fn denied() -> Self {
        Self::default()
    }

    pub fn rejecting_listener(self) -> Self {
        self.reject_listener.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_sessions(self, sessions: Vec<Arc<FakeController>>) -> Self {
        self.set_sessions(sessions);
        self
    }

    pub fn with_unfiltered_sessions(self, sessions: Vec<Arc<FakeController>>) -> Self {
        *self.unfiltered.lock().unwrap() = sessions;
        self
    }

    pub fn set_access(&self, access: bool) {
        self.access.store(access, Ordering::SeqCst);
    }

    pub fn set_sessions(&self, sessions: Vec<Arc<FakeController>>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    /// Push the current session list through the registered listener
    pub fn push_sessions(&self) {
        let sessions = as_dyn(&self.sessions.lock().unwrap());
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(sessions);
        }
    }

    pub fn session_queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn listener_adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn listener_removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl SessionManager for FakeSessionManager {
    fn has_listener_access(&self) -> bool {
        self.access.load(Ordering::SeqCst)
    }

    fn active_sessions(&self, scope: SessionScope) -> Result<Vec<Arc<dyn MediaController>>, SessionError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if !self.has_listener_access() {
            return Err(SessionError::PermissionDenied("listener not enabled".into()));
        }
        let sessions = match scope {
            SessionScope::Listener => self.sessions.lock().unwrap(),
            SessionScope::Unfiltered => self.unfiltered.lock().unwrap(),
        };
        Ok(as_dyn(&sessions))
    }

    fn add_sessions_listener(&self, sink: SessionsChangedSink) -> Result<(), SessionError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        if self.reject_listener.load(Ordering::SeqCst) {
            return Err(SessionError::PermissionDenied("listener rejected".into()));
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn remove_sessions_listener(&self) -> Result<(), SessionError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAppDirectory {
    players: Vec<String>,
    installed: Vec<String>,
    labels: HashMap<String, String>,
}

impl FakeAppDirectory {
    pub fn with_players(mut self, packages: &[&str]) -> Self {
        self.players = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_installed(mut self, packages: &[&str]) -> Self {
        self.installed = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_label(mut self, package: &str, label: &str) -> Self {
        self.labels.insert(package.to_string(), label.to_string());
        self
    }
}

impl AppDirectory for FakeAppDirectory {
    fn music_players(&self) -> Vec<String> {
        self.players.clone()
    }

    fn media_button_receivers(&self) -> Vec<String> {
        Vec::new()
    }

    fn media_browser_services(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_installed(&self, package_name: &str) -> bool {
        self.installed.iter().any(|p| p == package_name)
    }

    fn label(&self, package_name: &str) -> Option<String> {
        self.labels.get(package_name).cloned()
    }
}

#[derive(Default)]
pub struct FakeLauncher {
    launches: Mutex<Vec<LaunchRequest>>,
    notices: Mutex<Vec<String>>,
    reject_play_from_search: AtomicBool,
}

impl FakeLauncher {
    pub fn rejecting_play_from_search(self) -> Self {
        self.reject_play_from_search.store(true, Ordering::SeqCst);
        self
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.launches.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl AppLauncher for FakeLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<()> {
        self.launches.lock().unwrap().push(request.clone());
        if matches!(request, LaunchRequest::PlayFromSearch { .. })
            && self.reject_play_from_search.load(Ordering::SeqCst)
        {
            return Err(anyhow!("no activity handles play-from-search"));
        }
        Ok(())
    }

    fn notify_user(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// Resolver returning a fixed answer and counting lookups
pub struct FakeResolver {
    uri: Option<String>,
    calls: AtomicUsize,
}

impl FakeResolver {
    pub fn returning(uri: Option<&str>) -> Self {
        Self {
            uri: uri.map(str::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogResolver for FakeResolver {
    async fn resolve(&self, request: &SearchRequest) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.is_empty() {
            return None;
        }
        self.uri.clone()
    }
}

pub struct FakeRemote {
    failure: Option<RemoteError>,
    connects: AtomicUsize,
    plays: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
}

impl FakeRemote {
    pub fn connecting() -> Self {
        Self {
            failure: None,
            connects: AtomicUsize::new(0),
            plays: Arc::new(Mutex::new(Vec::new())),
            disconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: RemoteError) -> Self {
        Self {
            failure: Some(error),
            ..Self::connecting()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> Vec<String> {
        self.plays.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteControl for FakeRemote {
    async fn connect(&self, _params: &RemoteConnectionParams) -> Result<Box<dyn RemotePlayer>, RemoteError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(Box::new(FakeRemotePlayer {
            plays: self.plays.clone(),
            disconnects: self.disconnects.clone(),
        }))
    }
}

struct FakeRemotePlayer {
    plays: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl RemotePlayer for FakeRemotePlayer {
    async fn play(&self, uri: &str) -> Result<()> {
        self.plays.lock().unwrap().push(uri.to_string());
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A started aggregator over the given fakes; event receivers are dropped
pub fn started_aggregator(
    sessions: Arc<FakeSessionManager>,
    apps: FakeAppDirectory,
) -> crate::SessionAggregator {
    let (sessions_tx, _) = tokio::sync::mpsc::unbounded_channel();
    let (controller_tx, _) = tokio::sync::mpsc::unbounded_channel();
    let mut aggregator = crate::SessionAggregator::new(
        sessions,
        Arc::new(apps),
        vec![crate::SPOTIFY_PACKAGE.to_string()],
        sessions_tx,
        controller_tx,
    );
    aggregator.start();
    aggregator
}
