//! Linux platform backend: MPRIS over D-Bus and XDG desktop entries
//!
//! Sessions are MPRIS players found on the session bus, queried with
//! `dbus-send`. The bus has no push channel we can hold from a plain
//! subprocess, so both the session list and each controller are watched by a
//! polling thread that reports differences to the registered sink. Providers
//! are identified by the MPRIS bus name suffix (`org.mpris.MediaPlayer2.vlc`
//! is `vlc`).

use anyhow::{anyhow, Context, Result};
use mediabrowse_core::{
    AppDirectory, AppLauncher, ControllerEvent, ControllerEventSink, ControllerUpdate,
    LaunchRequest, MediaController, MediaMetadata, PlaybackState, PlayerState, SearchExtras,
    SessionError, SessionManager, SessionScope, SessionsChangedSink, TransportActions,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const PLAYER_IFACE: &str = "org.mpris.MediaPlayer2.Player";
const SEEK_STEP_MICROS: i64 = 10_000_000;
const SESSION_POLL: Duration = Duration::from_secs(2);
const CONTROLLER_POLL: Duration = Duration::from_secs(1);
const BUS_NAMES_TTL: Duration = Duration::from_millis(500);
const DESKTOP_ENTRIES_TTL: Duration = Duration::from_secs(10);

fn dbus_send(args: &[&str]) -> Result<String> {
    let output = Command::new("dbus-send")
        .arg("--session")
        .arg("--print-reply")
        .args(args)
        .output()
        .context("failed to run dbus-send")?;

    if !output.status.success() {
        return Err(anyhow!(
            "dbus-send {:?} failed: {}",
            args.first(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Bus names of every MPRIS player on the session bus
fn list_player_names() -> Result<Vec<String>> {
    let stdout = dbus_send(&[
        "--dest=org.freedesktop.DBus",
        "/org/freedesktop/DBus",
        "org.freedesktop.DBus.ListNames",
    ])?;
    Ok(parse_player_names(&stdout))
}

fn parse_player_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            line.trim()
                .strip_prefix("string \"")
                .and_then(|s| s.strip_suffix('"'))
        })
        .filter(|name| name.starts_with(MPRIS_PREFIX))
        .map(str::to_string)
        .collect()
}

/// Recent `ListNames` result shared by the manager and its controllers, so
/// one refresh validates every controller with a single subprocess
#[derive(Default)]
struct BusNames {
    snapshot: Mutex<Option<(Instant, Vec<String>)>>,
}

impl BusNames {
    fn list(&self) -> Result<Vec<String>> {
        if let Ok(snapshot) = self.snapshot.lock() {
            if let Some((taken, names)) = snapshot.as_ref() {
                if taken.elapsed() < BUS_NAMES_TTL {
                    return Ok(names.clone());
                }
            }
        }
        self.refresh()
    }

    fn refresh(&self) -> Result<Vec<String>> {
        let names = list_player_names()?;
        if let Ok(mut snapshot) = self.snapshot.lock() {
            *snapshot = Some((Instant::now(), names.clone()));
        }
        Ok(names)
    }
}

fn get_property(bus_name: &str, property: &str) -> Result<String> {
    dbus_send(&[
        &format!("--dest={}", bus_name),
        MPRIS_PATH,
        "org.freedesktop.DBus.Properties.Get",
        &format!("string:{}", PLAYER_IFACE),
        &format!("string:{}", property),
    ])
}

fn get_string_property(bus_name: &str, property: &str) -> Result<String> {
    let stdout = get_property(bus_name, property)?;
    stdout
        .lines()
        .find_map(|line| line.split('"').nth(1))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Failed to parse property: {}", property))
}

fn get_bool_property(bus_name: &str, property: &str) -> bool {
    get_property(bus_name, property)
        .map(|stdout| stdout.contains("boolean true"))
        .unwrap_or(false)
}

/// Flatten the `Metadata` dict into string values; arrays keep their first element
fn parse_metadata(stdout: &str) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    let mut key: Option<String> = None;

    for line in stdout.lines().map(str::trim) {
        if line.starts_with("dict entry(") {
            key = None;
            continue;
        }

        if key.is_none() {
            if let Some(k) = line.strip_prefix("string \"").and_then(|s| s.strip_suffix('"')) {
                key = Some(k.to_string());
            }
            continue;
        }

        if let Some(k) = &key {
            if metadata.contains_key(k) {
                continue;
            }
            if let Some(value) = line
                .split_once("string \"")
                .map(|(_, rest)| rest.trim_end_matches('"'))
            {
                metadata.insert(k.clone(), value.to_string());
            }
        }
    }

    metadata
}

fn player_state_from_mpris(status: &str) -> PlayerState {
    match status {
        "Playing" => PlayerState::Playing,
        "Paused" => PlayerState::Paused,
        "Stopped" => PlayerState::Stopped,
        _ => PlayerState::None,
    }
}

fn package_from_bus_name(bus_name: &str) -> &str {
    bus_name.strip_prefix(MPRIS_PREFIX).unwrap_or(bus_name)
}

/// One MPRIS player
pub struct MprisController {
    bus_name: String,
    package: String,
    bus: Arc<BusNames>,
    watcher: Mutex<Option<Arc<AtomicBool>>>,
}

impl MprisController {
    fn new(bus_name: impl Into<String>, bus: Arc<BusNames>) -> Self {
        let bus_name = bus_name.into();
        let package = package_from_bus_name(&bus_name).to_string();
        Self {
            bus_name,
            package,
            bus,
            watcher: Mutex::new(None),
        }
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    fn call(&self, method: &str, extra: &[&str]) -> Result<()> {
        let dest = format!("--dest={}", self.bus_name);
        let member = format!("{}.{}", PLAYER_IFACE, method);
        let mut args = vec![dest.as_str(), MPRIS_PATH, member.as_str()];
        args.extend_from_slice(extra);
        dbus_send(&args).map(|_| ())
    }

    fn seek(&self, offset_micros: i64) -> Result<()> {
        self.call("Seek", &[&format!("int64:{}", offset_micros)])
    }

    fn stop_watcher(&self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(stop) = watcher.take() {
                stop.store(true, Ordering::SeqCst);
            }
        }
    }
}

fn read_metadata(bus_name: &str) -> Option<MediaMetadata> {
    let stdout = get_property(bus_name, "Metadata").ok()?;
    let fields = parse_metadata(&stdout);
    if fields.is_empty() {
        return None;
    }
    Some(MediaMetadata {
        title: fields.get("xesam:title").cloned(),
        artist: fields
            .get("xesam:artist")
            .or_else(|| fields.get("xesam:albumArtist"))
            .cloned(),
        album: fields.get("xesam:album").cloned(),
    })
}

fn read_playback_state(bus_name: &str) -> Option<PlaybackState> {
    let status = get_string_property(bus_name, "PlaybackStatus").ok()?;

    let mut actions = TransportActions::STOP;
    let can_play = get_bool_property(bus_name, "CanPlay");
    let can_pause = get_bool_property(bus_name, "CanPause");
    if can_play {
        actions |= TransportActions::PLAY;
    }
    if can_pause {
        actions |= TransportActions::PAUSE;
    }
    if can_play && can_pause {
        actions |= TransportActions::PLAY_PAUSE;
    }
    if get_bool_property(bus_name, "CanGoNext") {
        actions |= TransportActions::SKIP_TO_NEXT;
    }
    if get_bool_property(bus_name, "CanGoPrevious") {
        actions |= TransportActions::SKIP_TO_PREVIOUS;
    }
    if get_bool_property(bus_name, "CanSeek") {
        actions |= TransportActions::FAST_FORWARD | TransportActions::REWIND | TransportActions::SEEK_TO;
    }
    // OpenUri lives on the player interface of every compliant player
    actions |= TransportActions::PLAY_FROM_URI;

    Some(PlaybackState {
        state: player_state_from_mpris(&status),
        actions,
    })
}

impl MediaController for MprisController {
    fn package_name(&self) -> &str {
        &self.package
    }

    fn is_valid(&self) -> bool {
        self.bus
            .list()
            .map(|names| names.iter().any(|n| n == &self.bus_name))
            .unwrap_or(false)
    }

    fn metadata(&self) -> Option<MediaMetadata> {
        read_metadata(&self.bus_name)
    }

    fn playback_state(&self) -> Option<PlaybackState> {
        read_playback_state(&self.bus_name)
    }

    fn play(&self) -> Result<()> {
        self.call("Play", &[])
    }

    fn pause(&self) -> Result<()> {
        self.call("Pause", &[])
    }

    fn skip_to_next(&self) -> Result<()> {
        self.call("Next", &[])
    }

    fn skip_to_previous(&self) -> Result<()> {
        self.call("Previous", &[])
    }

    fn fast_forward(&self) -> Result<()> {
        self.seek(SEEK_STEP_MICROS)
    }

    fn rewind(&self) -> Result<()> {
        self.seek(-SEEK_STEP_MICROS)
    }

    fn play_from_search(&self, _query: &str, _extras: &SearchExtras) -> Result<()> {
        Err(anyhow!("{} does not support search playback over MPRIS", self.package))
    }

    /// MPRIS has no media id addressing; ids only reach a player as URIs
    fn play_from_media_id(&self, media_id: &str, _extras: Option<&SearchExtras>) -> Result<()> {
        Err(anyhow!("{} cannot play media id {} over MPRIS", self.package, media_id))
    }

    fn play_from_uri(&self, uri: &str) -> Result<()> {
        self.call("OpenUri", &[&format!("string:{}", uri)])
    }

    fn register_callback(&self, sink: ControllerEventSink) -> Result<()> {
        self.stop_watcher();
        let stop = Arc::new(AtomicBool::new(false));
        let bus_name = self.bus_name.clone();
        let package = self.package.clone();
        let stopped = stop.clone();

        thread::Builder::new()
            .name(format!("mpris-{}", package))
            .spawn(move || {
                let mut last_metadata = read_metadata(&bus_name);
                let mut last_state = read_playback_state(&bus_name);
                while !stopped.load(Ordering::SeqCst) {
                    thread::sleep(CONTROLLER_POLL);
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }

                    let metadata = read_metadata(&bus_name);
                    if metadata != last_metadata {
                        last_metadata = metadata.clone();
                        let event = ControllerEvent::MetadataChanged(metadata);
                        if sink.send(ControllerUpdate { package_name: package.clone(), event }).is_err() {
                            break;
                        }
                    }

                    let state = read_playback_state(&bus_name);
                    if state != last_state {
                        last_state = state;
                        let event = ControllerEvent::PlaybackStateChanged(state);
                        if sink.send(ControllerUpdate { package_name: package.clone(), event }).is_err() {
                            break;
                        }
                    }
                }
                debug!("Stopped watching {}", bus_name);
            })
            .context("failed to spawn MPRIS watcher")?;

        if let Ok(mut watcher) = self.watcher.lock() {
            *watcher = Some(stop);
        }
        Ok(())
    }

    fn unregister_callback(&self) {
        self.stop_watcher();
    }
}

impl Drop for MprisController {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}

#[derive(Default)]
struct SessionCache {
    bus: Arc<BusNames>,
    controllers: Mutex<HashMap<String, Arc<MprisController>>>,
}

impl SessionCache {
    /// Controllers for `names`, reusing instances so identity stays stable
    fn controllers(&self, names: &[String]) -> Vec<Arc<dyn MediaController>> {
        let Ok(mut cache) = self.controllers.lock() else {
            return Vec::new();
        };
        cache.retain(|name, _| names.contains(name));
        names
            .iter()
            .map(|name| {
                cache
                    .entry(name.clone())
                    .or_insert_with(|| Arc::new(MprisController::new(name.clone(), self.bus.clone())))
                    .clone() as Arc<dyn MediaController>
            })
            .collect()
    }
}

/// Session broker over the MPRIS players on the session bus
#[derive(Default)]
pub struct MprisSessionManager {
    cache: Arc<SessionCache>,
    watcher: Mutex<Option<Arc<AtomicBool>>>,
}

impl MprisSessionManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionManager for MprisSessionManager {
    /// The session bus is readable by any process that can reach it
    fn has_listener_access(&self) -> bool {
        self.cache.bus.list().is_ok()
    }

    fn active_sessions(&self, _scope: SessionScope) -> Result<Vec<Arc<dyn MediaController>>, SessionError> {
        let names = self.cache.bus.list().map_err(|e| SessionError::Platform(e.to_string()))?;
        Ok(self.cache.controllers(&names))
    }

    fn add_sessions_listener(&self, sink: SessionsChangedSink) -> Result<(), SessionError> {
        let Ok(mut watcher) = self.watcher.lock() else {
            return Err(SessionError::Platform("session watcher lock poisoned".into()));
        };
        if let Some(previous) = watcher.take() {
            previous.store(true, Ordering::SeqCst);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stopped = stop.clone();
        let cache = self.cache.clone();
        thread::Builder::new()
            .name("mpris-sessions".into())
            .spawn(move || {
                let mut last = cache.bus.refresh().unwrap_or_default();
                while !stopped.load(Ordering::SeqCst) {
                    thread::sleep(SESSION_POLL);
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(names) = cache.bus.refresh() else {
                        continue;
                    };
                    if names != last {
                        debug!("MPRIS players changed: {:?}", names);
                        last = names;
                        if sink.send(cache.controllers(&last)).is_err() {
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SessionError::Platform(e.to_string()))?;

        *watcher = Some(stop);
        Ok(())
    }

    fn remove_sessions_listener(&self) -> Result<(), SessionError> {
        let Ok(mut watcher) = self.watcher.lock() else {
            return Err(SessionError::Platform("session watcher lock poisoned".into()));
        };
        match watcher.take() {
            Some(stop) => {
                stop.store(true, Ordering::SeqCst);
                Ok(())
            }
            None => Err(SessionError::Platform("no sessions listener registered".into())),
        }
    }
}

/// A parsed `.desktop` entry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct DesktopEntry {
    /// File name without `.desktop`, lowercased
    stem: String,
    package: String,
    name: Option<String>,
    exec: Option<String>,
    categories: Vec<String>,
    no_display: bool,
}

impl DesktopEntry {
    fn parse(stem: &str, contents: &str) -> Self {
        let mut entry = DesktopEntry {
            stem: stem.to_lowercase(),
            ..Default::default()
        };
        let mut in_main_group = false;

        for line in contents.lines().map(str::trim) {
            if line.starts_with('[') {
                in_main_group = line == "[Desktop Entry]";
                continue;
            }
            if !in_main_group {
                continue;
            }
            match line.split_once('=') {
                Some(("Name", value)) => entry.name = Some(value.trim().to_string()),
                Some(("Categories", value)) => {
                    entry.categories = value
                        .split(';')
                        .filter(|c| !c.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                Some(("Exec", value)) => entry.exec = Some(value.trim().to_string()),
                Some(("NoDisplay", value)) => entry.no_display = value.trim() == "true",
                _ => {}
            }
        }
        entry.package = entry
            .exec
            .as_deref()
            .and_then(package_from_exec)
            .unwrap_or_else(|| package_from_desktop_stem(stem));
        entry
    }

    /// Matches the player id as well as the full desktop file name
    fn is_package(&self, package_name: &str) -> bool {
        self.package == package_name || self.stem == package_name.to_lowercase()
    }

    fn is_music_player(&self) -> bool {
        let has = |category: &str| self.categories.iter().any(|c| c == category);
        !self.no_display && has("Audio") && (has("Player") || has("Music"))
    }
}

/// Package id for a desktop file stem: the last dotted segment, lowercased
/// (`org.gnome.Rhythmbox3` is `rhythmbox3`)
fn package_from_desktop_stem(stem: &str) -> String {
    stem.rsplit('.').next().unwrap_or(stem).to_lowercase()
}

/// Package id from the program an `Exec=` line starts. Players name their
/// MPRIS bus after their binary, so this lines up with session ids.
/// Flatpak launches use `--command=`, `env` prefixes are skipped.
fn package_from_exec(exec: &str) -> Option<String> {
    let mut tokens = exec.split_whitespace().peekable();
    if tokens.peek().map(|t| program_name(t)) == Some("env") {
        tokens.next();
        while tokens.peek().is_some_and(|t| t.contains('=') || t.starts_with('-')) {
            tokens.next();
        }
    }

    let program = program_name(tokens.next()?);
    let name = if program == "flatpak" {
        tokens.find_map(|t| t.strip_prefix("--command="))?
    } else {
        program
    };
    let name = program_name(name);
    (!name.is_empty()).then(|| name.to_lowercase())
}

fn program_name(token: &str) -> &str {
    let token = token.trim_matches('"');
    token.rsplit('/').next().unwrap_or(token)
}

/// Installed applications from XDG desktop entries and D-Bus service files.
/// Entries are read at most once per `DESKTOP_ENTRIES_TTL`.
pub struct DesktopAppDirectory {
    application_dirs: Vec<PathBuf>,
    service_dirs: Vec<PathBuf>,
    cache: Mutex<Option<(Instant, Arc<Vec<DesktopEntry>>)>>,
}

impl Default for DesktopAppDirectory {
    fn default() -> Self {
        let mut application_dirs = vec![
            PathBuf::from("/usr/share/applications"),
            PathBuf::from("/usr/local/share/applications"),
            PathBuf::from("/var/lib/flatpak/exports/share/applications"),
        ];
        let mut service_dirs = vec![PathBuf::from("/usr/share/dbus-1/services")];
        if let Some(data) = dirs::data_dir() {
            application_dirs.push(data.join("applications"));
            service_dirs.push(data.join("dbus-1/services"));
        }
        Self::new(application_dirs, service_dirs)
    }
}

impl DesktopAppDirectory {
    pub fn new(application_dirs: Vec<PathBuf>, service_dirs: Vec<PathBuf>) -> Self {
        Self {
            application_dirs,
            service_dirs,
            cache: Mutex::new(None),
        }
    }

    fn entries(&self) -> Arc<Vec<DesktopEntry>> {
        let Ok(mut cache) = self.cache.lock() else {
            return Arc::new(self.read_entries());
        };
        if let Some((read_at, entries)) = cache.as_ref() {
            if read_at.elapsed() < DESKTOP_ENTRIES_TTL {
                return entries.clone();
            }
        }
        let entries = Arc::new(self.read_entries());
        *cache = Some((Instant::now(), entries.clone()));
        entries
    }

    fn read_entries(&self) -> Vec<DesktopEntry> {
        let entries: Vec<DesktopEntry> = self
            .application_dirs
            .iter()
            .flat_map(|dir| read_dir_files(dir, "desktop"))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                let contents = std::fs::read_to_string(&path).ok()?;
                Some(DesktopEntry::parse(stem, &contents))
            })
            .collect();
        debug!("Read {} desktop entries", entries.len());
        entries
    }
}

fn read_dir_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
            .collect(),
        Err(e) => {
            debug!("Skipping {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

impl AppDirectory for DesktopAppDirectory {
    fn music_players(&self) -> Vec<String> {
        let mut players: Vec<String> = Vec::new();
        for entry in self.entries().iter().filter(|e| e.is_music_player()) {
            if !players.contains(&entry.package) {
                players.push(entry.package.clone());
            }
        }
        players
    }

    /// Linux has no media button receiver registry
    fn media_button_receivers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Players that can be D-Bus activated over MPRIS
    fn media_browser_services(&self) -> Vec<String> {
        self.service_dirs
            .iter()
            .flat_map(|dir| read_dir_files(dir, "service"))
            .filter_map(|path| {
                let stem = path.file_stem()?.to_str()?;
                stem.strip_prefix(MPRIS_PREFIX).map(|p| p.to_lowercase())
            })
            .collect()
    }

    fn is_installed(&self, package_name: &str) -> bool {
        self.entries().iter().any(|e| e.is_package(package_name))
    }

    fn label(&self, package_name: &str) -> Option<String> {
        self.entries()
            .iter()
            .find(|e| e.is_package(package_name))
            .and_then(|e| e.name.clone())
    }
}

/// Launches through `xdg-open`; user prompts go through `notify-send`
#[derive(Default)]
pub struct XdgLauncher;

impl XdgLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl AppLauncher for XdgLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<()> {
        match request {
            LaunchRequest::View { package, uri } => {
                debug!("xdg-open {} (for {})", uri, package);
                Command::new("xdg-open")
                    .arg(uri)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .with_context(|| format!("failed to open {}", uri))?;
                Ok(())
            }
            LaunchRequest::PlayFromSearch { package, .. } | LaunchRequest::MediaSearch { package, .. } => {
                Err(anyhow!("{} cannot be launched into a search on this platform", package))
            }
        }
    }

    fn notify_user(&self, message: &str) {
        let shown = Command::new("notify-send")
            .args(["mediabrowse", message])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !shown {
            warn!("{}", message);
        }
    }
}
