//! Commentline YouTube - comment harvesting over the YouTube Data API v3
//!
//! Implements the engine's [`commentline_core::RemoteClient`] for the
//! `search`, `commentThreads` and `comments` endpoints and wires it to the
//! durable checkpoint and output state.

pub mod api;
pub mod config;
pub mod response;
pub mod runner;
pub mod stats;
pub mod video_id;

// Re-exports
pub use api::{DEFAULT_API_URL, YouTubeClient};
pub use config::{API_KEY_ENV, Config, HarvestArgs};
pub use runner::{harvest, run, status};
pub use stats::{HarvestReport, StatusReport};
pub use video_id::extract_video_id;
