//! The media service actor
//!
//! One task owns the [`SessionAggregator`] and serializes everything that
//! touches it: user commands from [`MediaServiceHandle`], session pushes and
//! controller callbacks from the platform, and results of background work.
//! Network lookups and remote handshakes run on spawned tasks and report
//! back over a channel, so the owner never blocks on them.

use crate::aggregator::SessionAggregator;
use crate::config::ProviderConfig;
use crate::dispatcher::{CommandDispatcher, TransportOp};
use crate::remote::UriLauncher;
use mediabrowse_catalog::CatalogResolver;
use mediabrowse_core::{
    AggregateState, AppDirectory, AppLauncher, ControllerUpdate, MediaController, RemoteControl,
    SearchRequest, SessionManager,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Platform and network collaborators of the service
pub struct MediaServiceDeps {
    pub sessions: Arc<dyn SessionManager>,
    pub apps: Arc<dyn AppDirectory>,
    pub launcher: Arc<dyn AppLauncher>,
    pub remote: Option<Arc<dyn RemoteControl>>,
    pub resolver: Arc<dyn CatalogResolver>,
    pub provider: ProviderConfig,
}

#[derive(Debug)]
enum Command {
    Refresh,
    Select(String),
    Transport(TransportOp),
    PlayOrPause,
    PlayFromSearch(SearchRequest),
    PlayCatalogSearch(SearchRequest),
    PlayCatalogItem {
        request: SearchRequest,
        resolved: Option<String>,
    },
    PlayOnPackage {
        package: String,
        request: SearchRequest,
    },
    PlaySelected(SearchRequest),
    PlayUri(String),
    OpenCatalogSearch(String),
    WaitIdle(oneshot::Sender<()>),
    Dispose(oneshot::Sender<()>),
}

#[derive(Debug)]
enum TaskResult {
    CatalogItemResolved(Option<String>),
    SelectedResolved(Option<String>),
}

/// Cloneable front end of the service. Commands are fire-and-forget and
/// silently dropped once the service has stopped.
#[derive(Clone)]
pub struct MediaServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<AggregateState>,
}

impl MediaServiceHandle {
    /// Observable aggregate state
    pub fn state(&self) -> watch::Receiver<AggregateState> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> AggregateState {
        self.state.borrow().clone()
    }

    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn select(&self, package_name: impl Into<String>) {
        self.send(Command::Select(package_name.into()));
    }

    pub fn transport(&self, op: TransportOp) {
        self.send(Command::Transport(op));
    }

    pub fn play(&self) {
        self.transport(TransportOp::Play);
    }

    pub fn pause(&self) {
        self.transport(TransportOp::Pause);
    }

    pub fn skip_to_next(&self) {
        self.transport(TransportOp::SkipToNext);
    }

    pub fn skip_to_previous(&self) {
        self.transport(TransportOp::SkipToPrevious);
    }

    pub fn fast_forward(&self) {
        self.transport(TransportOp::FastForward);
    }

    pub fn rewind(&self) {
        self.transport(TransportOp::Rewind);
    }

    pub fn play_or_pause(&self) {
        self.send(Command::PlayOrPause);
    }

    pub fn play_from_search(&self, request: SearchRequest) {
        self.send(Command::PlayFromSearch(request));
    }

    pub fn play_catalog_search(&self, request: SearchRequest) {
        self.send(Command::PlayCatalogSearch(request));
    }

    /// Play the best catalog match for `request`, or `resolved` when the
    /// caller already has a URI
    pub fn play_catalog_item(&self, request: SearchRequest, resolved: Option<String>) {
        self.send(Command::PlayCatalogItem { request, resolved });
    }

    pub fn play_on_package(&self, package: impl Into<String>, request: SearchRequest) {
        self.send(Command::PlayOnPackage {
            package: package.into(),
            request,
        });
    }

    /// Route a request based on the current selection
    pub fn play_selected(&self, request: SearchRequest) {
        self.send(Command::PlaySelected(request));
    }

    pub fn play_uri(&self, uri: impl Into<String>) {
        self.send(Command::PlayUri(uri.into()));
    }

    pub fn open_catalog_search(&self, query: impl Into<String>) {
        self.send(Command::OpenCatalogSearch(query.into()));
    }

    /// Resolve once every command sent before this call has been handled
    /// and no background lookup or launch is still running
    pub async fn wait_idle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::WaitIdle(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stop the service and release every platform subscription. Later
    /// calls return immediately.
    pub async fn dispose(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Dispose(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Media service stopped, dropping command");
        }
    }
}

pub struct MediaService {
    aggregator: SessionAggregator,
    dispatcher: CommandDispatcher,
    uri_launcher: Arc<UriLauncher>,
    resolver: Arc<dyn CatalogResolver>,
    tasks: JoinSet<()>,
    task_tx: mpsc::UnboundedSender<TaskResult>,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl MediaService {
    /// Start the service on the current tokio runtime
    pub fn spawn(deps: MediaServiceDeps) -> MediaServiceHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let (controller_tx, controller_rx) = mpsc::unbounded_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        let aggregator = SessionAggregator::new(
            deps.sessions,
            deps.apps,
            deps.provider.known_packages.clone(),
            sessions_tx,
            controller_tx,
        );
        let state = aggregator.subscribe();
        let uri_launcher = Arc::new(UriLauncher::new(
            deps.provider.package.clone(),
            deps.provider.connection_params(),
            deps.remote,
            deps.launcher.clone(),
        ));
        let dispatcher = CommandDispatcher::new(deps.launcher, deps.provider.package);

        let service = Self {
            aggregator,
            dispatcher,
            uri_launcher,
            resolver: deps.resolver,
            tasks: JoinSet::new(),
            task_tx,
            idle_waiters: Vec::new(),
        };
        tokio::spawn(service.run(command_rx, sessions_rx, controller_rx, task_rx));

        MediaServiceHandle {
            commands: command_tx,
            state,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut sessions: mpsc::UnboundedReceiver<Vec<Arc<dyn MediaController>>>,
        mut controller_events: mpsc::UnboundedReceiver<ControllerUpdate>,
        mut task_results: mpsc::UnboundedReceiver<TaskResult>,
    ) {
        info!("Media service started");
        self.aggregator.start();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispose(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All service handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(controllers) = sessions.recv() => {
                    self.aggregator.on_sessions_changed(controllers);
                }
                Some(update) = controller_events.recv() => {
                    self.aggregator.on_controller_event(update);
                }
                Some(result) = task_results.recv() => {
                    self.handle_task_result(result);
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Background task failed: {}", e);
                    }
                }
            }

            if self.tasks.is_empty() && task_results.is_empty() {
                for waiter in self.idle_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
        }

        info!("Media service stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!("Handling {:?}", command);
        match command {
            Command::Refresh => self.aggregator.refresh(),
            Command::Select(package) => self.aggregator.select(&package),
            Command::Transport(op) => self.dispatcher.transport(&mut self.aggregator, op),
            Command::PlayOrPause => self.dispatcher.play_or_pause(&mut self.aggregator),
            Command::PlayFromSearch(request) => {
                self.dispatcher.play_from_search(&mut self.aggregator, &request)
            }
            Command::PlayCatalogSearch(request) => {
                self.dispatcher.play_catalog_search(&mut self.aggregator, &request)
            }
            Command::PlayCatalogItem { request, resolved } => match resolved {
                Some(uri) => self.play_catalog_item(&uri),
                None if request.is_empty() => debug!("play_catalog_item() ignored: empty request"),
                None => self.spawn_resolve(request, TaskResult::CatalogItemResolved),
            },
            Command::PlayOnPackage { package, request } => {
                if let Some(uri) = self
                    .dispatcher
                    .play_on_package(&mut self.aggregator, &package, &request)
                {
                    self.spawn_play_uri(uri);
                }
            }
            Command::PlaySelected(request) => self.play_selected(request),
            Command::PlayUri(uri) => self.spawn_play_uri(uri),
            Command::OpenCatalogSearch(query) => self.dispatcher.open_catalog_search(&query),
            Command::WaitIdle(done) => self.idle_waiters.push(done),
            Command::Dispose(_) => {}
        }
    }

    fn handle_task_result(&mut self, result: TaskResult) {
        match result {
            TaskResult::CatalogItemResolved(Some(uri)) => self.play_catalog_item(&uri),
            TaskResult::SelectedResolved(Some(uri)) => self.spawn_play_uri(uri),
            TaskResult::CatalogItemResolved(None) | TaskResult::SelectedResolved(None) => {
                warn!("No catalog match found, nothing to play");
            }
        }
    }

    fn play_catalog_item(&mut self, uri: &str) {
        if let Some(uri) = self.dispatcher.play_catalog_item(&mut self.aggregator, uri) {
            self.spawn_play_uri(uri);
        }
    }

    /// The integrated provider gets a resolved URI, everything else a plain
    /// search. Without remote credentials the URI goes through the catalog
    /// item path (session first, then a view launch).
    fn play_selected(&mut self, request: SearchRequest) {
        if request.is_empty() {
            debug!("play_selected() ignored: empty request");
            return;
        }

        let selected = self.aggregator.selected_package();
        if selected.as_deref() == Some(self.dispatcher.provider_package()) {
            if self.uri_launcher.is_configured() {
                self.spawn_resolve(request, TaskResult::SelectedResolved);
            } else {
                debug!("Remote control not configured, playing through the catalog item path");
                self.spawn_resolve(request, TaskResult::CatalogItemResolved);
            }
        } else {
            self.dispatcher.play_from_search(&mut self.aggregator, &request);
        }
    }

    fn spawn_resolve(&mut self, request: SearchRequest, finish: fn(Option<String>) -> TaskResult) {
        let resolver = self.resolver.clone();
        let results = self.task_tx.clone();
        self.tasks.spawn(async move {
            let uri = resolver.resolve(&request).await;
            debug!("Resolved {:?} to {:?}", request.primary_query(), uri);
            let _ = results.send(finish(uri));
        });
    }

    fn spawn_play_uri(&mut self, uri: String) {
        let launcher = self.uri_launcher.clone();
        self.tasks.spawn(async move {
            launcher.play_uri(&uri).await;
        });
    }

    async fn shutdown(&mut self) {
        self.tasks.abort_all();
        self.aggregator.dispose();
        self.uri_launcher.disconnect().await;
    }
}
