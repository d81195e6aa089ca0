mod merge;
mod source;

pub use merge::{MergeEngine, RefreshReport, DEFAULT_MAX_CONCURRENT};
pub use source::{FeedSource, JsonSnapshotSource};
