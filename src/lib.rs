pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod notify;

// Re-export main types for convenience
pub use config::Config;
pub use db::{DedupGuard, DedupReport, Repository};
pub use error::{AppError, DatabaseError, FetchError, MergeError};
pub use feed::{FeedSource, JsonSnapshotSource, MergeEngine, RefreshReport};
pub use models::{Episode, Show};
pub use notify::{Snapshot, SnapshotStream};
