use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A media-capable application, identified by its package name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provider {
    pub package_name: String,
    pub display_name: String,
}

impl Provider {
    pub fn new(package_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Raw metadata as reported by a session
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// Snapshot of what a session is currently playing
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl NowPlaying {
    pub fn from_metadata(metadata: Option<&MediaMetadata>) -> Option<Self> {
        metadata.map(|m| Self {
            title: m.title.clone(),
            artist: m.artist.clone(),
            album: m.album.clone(),
        })
    }
}

/// Playback state code reported by the platform for a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    #[default]
    None,
    Stopped,
    Paused,
    Playing,
    FastForwarding,
    Rewinding,
    Buffering,
    Error,
    Connecting,
    SkippingToPrevious,
    SkippingToNext,
    SkippingToQueueItem,
}

/// User-facing playback status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    Buffering,
    Stopped,
}

impl PlaybackStatus {
    /// Derive the status from a session's reported state; anything unmapped is Idle
    pub fn from_state(state: Option<&PlaybackState>) -> Self {
        match state.map(|s| s.state) {
            Some(PlayerState::Playing) => PlaybackStatus::Playing,
            Some(PlayerState::Paused) => PlaybackStatus::Paused,
            Some(PlayerState::Buffering) => PlaybackStatus::Buffering,
            Some(PlayerState::Stopped) => PlaybackStatus::Stopped,
            _ => PlaybackStatus::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackStatus::Playing | PlaybackStatus::Buffering)
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Buffering => "buffering",
            PlaybackStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Bitmask of transport actions a session currently supports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportActions(u64);

impl TransportActions {
    pub const NONE: Self = Self(0);
    pub const STOP: Self = Self(1 << 0);
    pub const PAUSE: Self = Self(1 << 1);
    pub const PLAY: Self = Self(1 << 2);
    pub const REWIND: Self = Self(1 << 3);
    pub const SKIP_TO_PREVIOUS: Self = Self(1 << 4);
    pub const SKIP_TO_NEXT: Self = Self(1 << 5);
    pub const FAST_FORWARD: Self = Self(1 << 6);
    pub const SEEK_TO: Self = Self(1 << 8);
    pub const PLAY_PAUSE: Self = Self(1 << 9);
    pub const PLAY_FROM_MEDIA_ID: Self = Self(1 << 10);
    pub const PLAY_FROM_SEARCH: Self = Self(1 << 11);
    pub const PLAY_FROM_URI: Self = Self(1 << 13);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for TransportActions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for TransportActions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for TransportActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TransportActions, &str); 7] = [
            (TransportActions::PLAY_FROM_SEARCH, "PLAY_FROM_SEARCH"),
            (TransportActions::PLAY, "PLAY"),
            (TransportActions::PAUSE, "PAUSE"),
            (TransportActions::SKIP_TO_NEXT, "NEXT"),
            (TransportActions::SKIP_TO_PREVIOUS, "PREV"),
            (TransportActions::FAST_FORWARD, "FF"),
            (TransportActions::REWIND, "REW"),
        ];

        let supported: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if supported.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&supported.join(","))
        }
    }
}

/// Playback state plus the actions supported in that state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub state: PlayerState,
    pub actions: TransportActions,
}

/// Kind of catalog item a search targets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    #[default]
    Track,
    Album,
    Playlist,
    Artist,
    Show,
    Episode,
    Audiobook,
    Chapter,
}

impl SearchKind {
    pub const ALL: [SearchKind; 8] = [
        SearchKind::Track,
        SearchKind::Album,
        SearchKind::Playlist,
        SearchKind::Artist,
        SearchKind::Show,
        SearchKind::Episode,
        SearchKind::Audiobook,
        SearchKind::Chapter,
    ];

    /// Wire name used by the catalog search endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchKind::Track => "track",
            SearchKind::Album => "album",
            SearchKind::Playlist => "playlist",
            SearchKind::Artist => "artist",
            SearchKind::Show => "show",
            SearchKind::Episode => "episode",
            SearchKind::Audiobook => "audiobook",
            SearchKind::Chapter => "chapter",
        }
    }

    /// Content-type focus hint passed along with search extras
    pub fn media_focus(&self) -> &'static str {
        match self {
            SearchKind::Track => "vnd.android.cursor.item/audio",
            SearchKind::Album => "vnd.android.cursor.item/album",
            SearchKind::Artist => "vnd.android.cursor.item/artist",
            SearchKind::Playlist => "vnd.android.cursor.item/playlist",
            SearchKind::Show => "vnd.android.cursor.item/podcast",
            SearchKind::Episode => "vnd.android.cursor.item/podcast_episode",
            SearchKind::Audiobook => "vnd.android.cursor.item/audiobook",
            SearchKind::Chapter => "vnd.android.cursor.item/audiobook_chapter",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for invalid search kind strings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseSearchKindError(pub String);

impl fmt::Display for ParseSearchKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid search kind: {}", self.0)
    }
}

impl std::error::Error for ParseSearchKindError {}

impl FromStr for SearchKind {
    type Err = ParseSearchKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SearchKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| ParseSearchKindError(s.to_string()))
    }
}

/// Structured hints sent alongside a search-based play request.
///
/// Never carries the raw free-text query; that key belongs to the launch
/// request fallback only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchExtras {
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub focus: String,
}

impl fmt::Display for SearchExtras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{artist={:?}, title={:?}, album={:?}, focus={}}}",
            self.artist, self.title, self.album, self.focus
        )
    }
}

/// A generic search request entered by the user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub kind: SearchKind,
}

impl SearchRequest {
    /// Free-text request with no structured fields
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        is_blank(&self.query) && is_blank(&self.title) && is_blank(&self.artist) && is_blank(&self.album)
    }

    /// "artist title album" with blank parts omitted
    pub fn natural_query(&self) -> String {
        [&self.artist, &self.title, &self.album]
            .into_iter()
            .filter(|part| !is_blank(part))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }

    /// The natural query, or the raw query text when every structured field is blank
    pub fn primary_query(&self) -> String {
        let natural = self.natural_query();
        if natural.is_empty() {
            self.query.clone()
        } else {
            natural
        }
    }

    pub fn search_extras(&self) -> SearchExtras {
        SearchExtras {
            artist: non_blank(&self.artist),
            title: non_blank(&self.title),
            album: non_blank(&self.album),
            focus: self.kind.media_focus().to_string(),
        }
    }
}

/// Aggregated view of all media sessions, observed by the presentation layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateState {
    pub available_providers: Vec<Provider>,
    pub selected_provider: Option<Provider>,
    pub now_playing: Option<NowPlaying>,
    pub playback_status: PlaybackStatus,
    pub permission_granted: bool,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self {
            available_providers: Vec::new(),
            selected_provider: None,
            now_playing: None,
            playback_status: PlaybackStatus::Idle,
            permission_granted: true,
        }
    }
}

impl AggregateState {
    pub fn contains_provider(&self, package_name: &str) -> bool {
        self.available_providers
            .iter()
            .any(|p| p.package_name == package_name)
    }

    pub fn find_provider(&self, package_name: &str) -> Option<&Provider> {
        self.available_providers
            .iter()
            .find(|p| p.package_name == package_name)
    }

    pub fn selected_package(&self) -> Option<&str> {
        self.selected_provider.as_ref().map(|p| p.package_name.as_str())
    }
}

/// A system-level, package-targeted request to start another app
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchRequest {
    /// Primary "play from search" action; `query` is only set on the fallback path
    PlayFromSearch {
        package: String,
        query: Option<String>,
        extras: SearchExtras,
    },
    /// Legacy media search action, tried when the primary one fails
    MediaSearch { package: String, extras: SearchExtras },
    /// Open a URI with the given package
    View { package: String, uri: String },
}

impl LaunchRequest {
    pub fn package(&self) -> &str {
        match self {
            LaunchRequest::PlayFromSearch { package, .. }
            | LaunchRequest::MediaSearch { package, .. }
            | LaunchRequest::View { package, .. } => package,
        }
    }
}

/// Keep the first occurrence of each package name, preserving order
pub fn dedup_providers(providers: impl IntoIterator<Item = Provider>) -> Vec<Provider> {
    let mut seen = std::collections::HashSet::new();
    providers
        .into_iter()
        .filter(|p| seen.insert(p.package_name.clone()))
        .collect()
}

pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn non_blank(s: &str) -> Option<String> {
    if is_blank(s) {
        None
    } else {
        Some(s.to_string())
    }
}
