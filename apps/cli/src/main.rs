mod config;
mod logging;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::Config;
use mediabrowse_catalog::{CatalogClient, CatalogResolver};
use mediabrowse_core::{AggregateState, SearchKind, SearchRequest, SettingsStore};
use mediabrowse_media_session::{
    create_platform_backend, MediaService, MediaServiceDeps, MediaServiceHandle,
};
use mediabrowse_persistence::SqliteSettingsStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mediabrowse", version, about = "Browse and control media sessions")]
struct Cli {
    /// Config file (defaults to <config_dir>/mediabrowse/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Select this provider before running the command
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Keep settings in memory instead of the settings database
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available providers, the selection and the permission state
    List,
    /// Show what the selected provider is playing
    Status,
    /// Select a provider and show the result
    Select { package: String },
    Play,
    Pause,
    /// Pause when playing, play otherwise
    Toggle,
    Next,
    Previous,
    /// Fast forward
    Ff,
    /// Rewind
    Rew,
    /// Play a search on the selected provider (replays the last search when
    /// no fields are given). The streaming provider plays the catalog match;
    /// other players must accept search playback over their session.
    Search {
        #[command(flatten)]
        request: RequestArgs,
        /// Target this package directly instead of the selection
        #[arg(long)]
        on: Option<String>,
        /// Resolve through the catalog and play the best match
        #[arg(long, conflicts_with = "on")]
        catalog: bool,
    },
    /// Print the catalog URI for a search
    Resolve {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Open a provider-native URI
    Open { uri: String },
    /// Open the provider's own search screen
    OpenSearch { query: String },
    /// Print state changes until interrupted
    Watch,
}

#[derive(Args, Default)]
struct RequestArgs {
    /// Free-text query
    query: Vec<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    album: Option<String>,
    /// track, album, playlist, artist, show, episode, audiobook or chapter
    #[arg(long)]
    kind: Option<SearchKind>,
}

impl RequestArgs {
    fn is_given(&self) -> bool {
        !self.query.is_empty()
            || self.title.is_some()
            || self.artist.is_some()
            || self.album.is_some()
            || self.kind.is_some()
    }

    fn into_request(self) -> SearchRequest {
        SearchRequest {
            query: self.query.join(" "),
            title: self.title.unwrap_or_default(),
            artist: self.artist.unwrap_or_default(),
            album: self.album.unwrap_or_default(),
            kind: self.kind.unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init_logging(&config::data_dir()?.join("logs"), cli.verbose)?;
    tracing::info!("Starting mediabrowse");

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let config = Config::load(&config_path)?;
    tracing::info!("Config path: {}", config_path.display());

    let store: Arc<dyn SettingsStore> = if cli.ephemeral {
        Arc::new(SqliteSettingsStore::new(mediabrowse_persistence::init_memory_db().await?))
    } else {
        let db_path = config::db_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("Database path: {}", db_path.display());
        Arc::new(SqliteSettingsStore::new(mediabrowse_persistence::init_db(&db_path).await?))
    };

    let catalog = Arc::new(CatalogClient::new(config.catalog.clone(), store.clone())?);

    if let Command::Resolve { request } = cli.command {
        let request = request.into_request();
        match catalog.resolve(&request).await {
            Some(uri) => println!("{}", uri),
            None => anyhow::bail!("No catalog match for {:?}", request.primary_query()),
        }
        return Ok(());
    }

    let backend = create_platform_backend()?;
    let handle = MediaService::spawn(MediaServiceDeps {
        sessions: backend.sessions,
        apps: backend.apps,
        launcher: backend.launcher,
        remote: None,
        resolver: catalog as Arc<dyn CatalogResolver>,
        provider: config.provider.clone(),
    });
    handle.wait_idle().await;

    if let Some(package) = &cli.provider {
        handle.select(package.clone());
    }

    let result = run(&handle, store.as_ref(), cli.command).await;
    handle.wait_idle().await;
    handle.dispose().await;
    result
}

async fn run(handle: &MediaServiceHandle, store: &dyn SettingsStore, command: Command) -> Result<()> {
    match command {
        Command::List => print_providers(&current(handle).await),
        Command::Status => print_status(&current(handle).await),
        Command::Select { package } => {
            handle.select(package);
            print_providers(&current(handle).await);
        }
        Command::Play => handle.play(),
        Command::Pause => handle.pause(),
        Command::Toggle => handle.play_or_pause(),
        Command::Next => handle.skip_to_next(),
        Command::Previous => handle.skip_to_previous(),
        Command::Ff => handle.fast_forward(),
        Command::Rew => handle.rewind(),
        Command::Search { request, on, catalog } => {
            let request = if request.is_given() {
                let request = request.into_request();
                store.save_search_request(&request).await?;
                request
            } else {
                store.load_search_request().await?
            };
            if request.is_empty() {
                anyhow::bail!("Nothing to search for");
            }

            match on {
                Some(package) => handle.play_on_package(package, request),
                None if catalog => handle.play_catalog_item(request, None),
                None => handle.play_selected(request),
            }
        }
        Command::Resolve { .. } => {}
        Command::Open { uri } => handle.play_uri(uri),
        Command::OpenSearch { query } => handle.open_catalog_search(query),
        Command::Watch => watch(handle).await?,
    }
    Ok(())
}

/// State after every command sent so far has been applied
async fn current(handle: &MediaServiceHandle) -> AggregateState {
    handle.wait_idle().await;
    handle.snapshot()
}

async fn watch(handle: &MediaServiceHandle) -> Result<()> {
    let mut state = handle.state();
    print_status(&state.borrow_and_update().clone());

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                print_status(&state.borrow_and_update().clone());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_providers(state: &AggregateState) {
    if !state.permission_granted {
        println!("Session access not granted; showing installed apps only");
    }
    if state.available_providers.is_empty() {
        println!("No media providers found");
        return;
    }
    let selected = state.selected_package();
    for provider in &state.available_providers {
        let marker = if Some(provider.package_name.as_str()) == selected { "*" } else { " " };
        println!("{} {:<40} {}", marker, provider.package_name, provider.display_name);
    }
}

fn print_status(state: &AggregateState) {
    let Some(provider) = &state.selected_provider else {
        println!("No provider selected");
        return;
    };
    println!("{} [{}]", provider.display_name, state.playback_status);
    match &state.now_playing {
        Some(now) => {
            let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
            println!("  Title:  {}", field(&now.title));
            println!("  Artist: {}", field(&now.artist));
            println!("  Album:  {}", field(&now.album));
        }
        None => println!("  Nothing playing"),
    }
}
