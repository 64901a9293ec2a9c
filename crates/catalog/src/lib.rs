//! Catalog search client for the integrated streaming provider
//!
//! Resolves free-text or structured search requests into provider-native
//! URIs (`spotify:track:...`) through the provider's web API, using a
//! client-credentials bearer token that is persisted in a [`SettingsStore`]
//! and refreshed once when the API reports it as expired.
//!
//! [`SettingsStore`]: mediabrowse_core::SettingsStore

pub mod client;
pub mod error;
pub mod models;
pub mod uri;

pub use client::*;
pub use error::*;
