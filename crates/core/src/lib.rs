//! Shared model and platform boundary for mediabrowse
//!
//! Everything platform-specific (session broker, app discovery, launching,
//! remote-control SDKs, persistence) sits behind the traits in [`traits`] so
//! the aggregation and dispatch logic can run anywhere.

pub mod error;
pub mod models;
pub mod settings;
pub mod traits;

pub use error::*;
pub use models::*;
pub use settings::*;
pub use traits::*;
