//! Session aggregation
//!
//! Tracks every active media session on the device, keeps one of them bound
//! as the active controller and publishes the combined [`AggregateState`]
//! through a watch channel. All mutation happens through `&mut self`, so the
//! owner (the service actor) is the single writer.

use mediabrowse_core::{
    dedup_providers, AggregateState, AppDirectory, ControllerEvent, ControllerEventSink,
    ControllerUpdate, MediaController, NowPlaying, PlaybackStatus, Provider, SessionManager,
    SessionScope, SessionsChangedSink, TransportActions,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct SessionAggregator {
    sessions: Arc<dyn SessionManager>,
    apps: Arc<dyn AppDirectory>,
    known_packages: Vec<String>,
    controllers: Vec<Arc<dyn MediaController>>,
    active: Option<Arc<dyn MediaController>>,
    listener_registered: bool,
    state: watch::Sender<AggregateState>,
    sessions_sink: SessionsChangedSink,
    controller_sink: ControllerEventSink,
}

impl SessionAggregator {
    pub fn new(
        sessions: Arc<dyn SessionManager>,
        apps: Arc<dyn AppDirectory>,
        known_packages: Vec<String>,
        sessions_sink: SessionsChangedSink,
        controller_sink: ControllerEventSink,
    ) -> Self {
        let initial = AggregateState {
            permission_granted: sessions.has_listener_access(),
            ..Default::default()
        };
        let (state, _) = watch::channel(initial);

        Self {
            sessions,
            apps,
            known_packages,
            controllers: Vec::new(),
            active: None,
            listener_registered: false,
            state,
            sessions_sink,
            controller_sink,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregateState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AggregateState {
        self.state.borrow().clone()
    }

    pub fn selected_package(&self) -> Option<String> {
        self.state.borrow().selected_package().map(str::to_string)
    }

    pub fn is_listener_registered(&self) -> bool {
        self.listener_registered
    }

    /// Subscribe to session pushes and run the first scan
    pub fn start(&mut self) {
        self.register_sessions_listener();
        self.refresh();
    }

    /// Re-check permission, re-enumerate sessions and recompute the state
    pub fn refresh(&mut self) {
        let has_access = self.sessions.has_listener_access();
        debug!(
            "refresh() has_access={} listener_registered={}",
            has_access, self.listener_registered
        );

        self.update_state(|s| s.permission_granted = has_access);
        if has_access && !self.listener_registered {
            self.register_sessions_listener();
        } else if !has_access && self.listener_registered {
            // The platform drops our listener with the grant; forget it so a
            // later grant re-subscribes.
            if let Err(e) = self.sessions.remove_sessions_listener() {
                debug!("remove_sessions_listener after revoke: {}", e);
            }
            self.listener_registered = false;
        }

        let controllers = self.load_active_sessions();
        debug!(
            "refresh() controllers={:?}",
            controllers.iter().map(|c| c.package_name()).collect::<Vec<_>>()
        );
        self.handle_updated_controllers(controllers);
    }

    /// Platform push: the set of active sessions changed
    pub fn on_sessions_changed(&mut self, controllers: Vec<Arc<dyn MediaController>>) {
        let controllers = if controllers.is_empty() {
            // Some platforms push an empty list even when sessions exist
            self.load_active_sessions()
        } else {
            controllers
        };
        self.handle_updated_controllers(controllers);
    }

    /// Metadata or playback change from a session callback
    pub fn on_controller_event(&mut self, update: ControllerUpdate) {
        let Some(active) = self.active.clone() else {
            return;
        };
        if active.package_name() != update.package_name {
            debug!(
                "Dropping stale event from {} (active={})",
                update.package_name,
                active.package_name()
            );
            return;
        }

        let (now_playing, status) = match update.event {
            ControllerEvent::MetadataChanged(metadata) => (
                NowPlaying::from_metadata(metadata.as_ref()),
                PlaybackStatus::from_state(active.playback_state().as_ref()),
            ),
            ControllerEvent::PlaybackStateChanged(state) => (
                NowPlaying::from_metadata(active.metadata().as_ref()),
                PlaybackStatus::from_state(state.as_ref()),
            ),
        };

        debug!(
            "update_now_playing() title={:?} artist={:?} status={}",
            now_playing.as_ref().and_then(|n| n.title.as_deref()),
            now_playing.as_ref().and_then(|n| n.artist.as_deref()),
            status
        );
        self.update_state(|s| {
            s.now_playing = now_playing;
            s.playback_status = status;
        });
    }

    /// Select a provider; binds its session if one is live
    pub fn select(&mut self, package_name: &str) {
        debug!("select() package={}", package_name);
        let controller = self.controller_for(package_name);
        let provider = self.state.borrow().find_provider(package_name).cloned();

        if provider.is_none() && controller.is_none() {
            warn!("select() ignored: {} is not an available provider", package_name);
            return;
        }

        let selected = provider.or_else(|| Some(self.provider_for(package_name)));
        self.set_active_controller(controller, selected);
    }

    /// The bound controller, re-acquired through a refresh if the platform
    /// invalidated it
    pub fn active_controller(&mut self) -> Option<Arc<dyn MediaController>> {
        match &self.active {
            Some(controller) if controller.is_valid() => Some(controller.clone()),
            Some(controller) => {
                info!(
                    "Active session for {} is no longer valid, re-acquiring",
                    controller.package_name()
                );
                self.refresh();
                self.active.clone().filter(|c| c.is_valid())
            }
            None => None,
        }
    }

    /// A live controller for `package_name`, if one is held
    pub fn controller_for(&self, package_name: &str) -> Option<Arc<dyn MediaController>> {
        self.controllers
            .iter()
            .find(|c| c.package_name() == package_name && c.is_valid())
            .cloned()
    }

    /// Re-query the platform and apply the result
    pub fn reload_sessions(&mut self) {
        let controllers = self.load_active_sessions();
        self.handle_updated_controllers(controllers);
    }

    /// Drop every platform subscription. The aggregator is inert afterwards.
    pub fn dispose(&mut self) {
        if let Err(e) = self.sessions.remove_sessions_listener() {
            // Never registered when permission was missing
            debug!("remove_sessions_listener on dispose: {}", e);
        }
        self.listener_registered = false;
        if let Some(active) = self.active.take() {
            active.unregister_callback();
        }
        self.controllers.clear();
        info!("Session aggregator disposed");
    }

    fn register_sessions_listener(&mut self) {
        if !self.sessions.has_listener_access() {
            self.update_state(|s| s.permission_granted = false);
            return;
        }

        match self.sessions.add_sessions_listener(self.sessions_sink.clone()) {
            Ok(()) => {
                self.listener_registered = true;
                debug!("register_sessions_listener() success");
            }
            Err(e) => {
                self.listener_registered = false;
                if e.is_permission_denied() {
                    self.update_state(|s| s.permission_granted = false);
                }
                debug!("register_sessions_listener() failed: {}", e);
            }
        }
    }

    fn load_active_sessions(&mut self) -> Vec<Arc<dyn MediaController>> {
        if !self.sessions.has_listener_access() {
            return Vec::new();
        }

        let primary = self.query_sessions(SessionScope::Listener);
        if !primary.is_empty() {
            return primary;
        }

        // Some platforms only answer the unfiltered query once access is granted
        self.query_sessions(SessionScope::Unfiltered)
    }

    fn query_sessions(&mut self, scope: SessionScope) -> Vec<Arc<dyn MediaController>> {
        match self.sessions.active_sessions(scope) {
            Ok(controllers) => controllers,
            Err(e) => {
                if e.is_permission_denied() {
                    self.update_state(|s| s.permission_granted = false);
                }
                debug!("active_sessions({:?}) failed: {}", scope, e);
                Vec::new()
            }
        }
    }

    fn handle_updated_controllers(&mut self, controllers: Vec<Arc<dyn MediaController>>) {
        let controllers: Vec<_> = controllers.into_iter().filter(|c| c.is_valid()).collect();
        debug!(
            "handle_updated_controllers() incoming={:?}",
            controllers.iter().map(|c| c.package_name()).collect::<Vec<_>>()
        );

        let installed = self.discover_media_apps();
        let mut session_packages = HashSet::new();
        let session_apps: Vec<Provider> = controllers
            .iter()
            .map(|c| c.package_name().to_string())
            .filter(|pkg| session_packages.insert(pkg.clone()))
            .map(|pkg| self.provider_for(&pkg))
            .collect();
        let available = dedup_providers(installed.into_iter().chain(session_apps));

        let maintained = self
            .state
            .borrow()
            .selected_provider
            .as_ref()
            .and_then(|selected| {
                available
                    .iter()
                    .find(|p| p.package_name == selected.package_name)
                    .cloned()
            });

        self.controllers = controllers;
        let selection = maintained.clone();
        self.update_state(|s| {
            s.available_providers = available;
            s.selected_provider = selection;
        });

        match maintained {
            Some(provider) => {
                let controller = self.controller_for(&provider.package_name);
                self.set_active_controller(controller, Some(provider));
            }
            None => {
                let first = self.controllers.first().cloned();
                self.set_active_controller(first, None);
            }
        }
    }

    fn set_active_controller(
        &mut self,
        controller: Option<Arc<dyn MediaController>>,
        forced_selection: Option<Provider>,
    ) {
        let selected = forced_selection.or_else(|| {
            controller
                .as_ref()
                .map(|c| self.provider_for(c.package_name()))
        });

        let unchanged = match (&self.active, &controller) {
            (Some(current), Some(next)) => same_controller(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            self.update_state(|s| s.selected_provider = selected);
            return;
        }

        if let Some(previous) = self.active.take() {
            previous.unregister_callback();
        }
        if let Some(next) = &controller {
            if let Err(e) = next.register_callback(self.controller_sink.clone()) {
                warn!("register_callback failed for {}: {}", next.package_name(), e);
            }
        }
        self.active = controller.clone();

        let metadata = controller.as_ref().and_then(|c| c.metadata());
        let playback = controller.as_ref().and_then(|c| c.playback_state());
        debug!(
            "set_active_controller() controller={:?} selected={:?} actions={}",
            controller.as_ref().map(|c| c.package_name()),
            selected.as_ref().map(|p| p.package_name.as_str()),
            playback.map(|p| p.actions).unwrap_or(TransportActions::NONE)
        );

        self.update_state(|s| {
            s.selected_provider = selected;
            s.now_playing = NowPlaying::from_metadata(metadata.as_ref());
            s.playback_status = PlaybackStatus::from_state(playback.as_ref());
        });
    }

    fn discover_media_apps(&self) -> Vec<Provider> {
        let mut packages: HashSet<String> = HashSet::new();
        packages.extend(self.apps.music_players());
        packages.extend(self.apps.media_button_receivers());
        packages.extend(self.apps.media_browser_services());
        packages.extend(
            self.known_packages
                .iter()
                .filter(|pkg| self.apps.is_installed(pkg))
                .cloned(),
        );

        let mut providers: Vec<Provider> = packages
            .into_iter()
            .map(|pkg| self.provider_for(&pkg))
            .collect();
        providers.sort_by_key(|p| p.display_name.to_lowercase());
        providers
    }

    fn provider_for(&self, package_name: &str) -> Provider {
        let label = self
            .apps
            .label(package_name)
            .unwrap_or_else(|| package_name.to_string());
        Provider::new(package_name, label)
    }

    fn update_state(&self, transform: impl FnOnce(&mut AggregateState)) {
        self.state.send_modify(transform);
    }
}

fn same_controller(a: &Arc<dyn MediaController>, b: &Arc<dyn MediaController>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
