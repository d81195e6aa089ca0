use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a show's feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Feed URL of the owning show. Filled in from the owner when read back.
    #[serde(default)]
    pub show_feed_url: String,
    /// Stable per-show identifier (the feed item's guid)
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Length in seconds
    #[serde(default)]
    pub duration: u32,
    pub sound_url: String,
    pub published_at: DateTime<Utc>,
}

impl Episode {
    /// Newest first; ties broken by show then episode id so snapshots are stable
    pub fn timeline_order(&self, other: &Self) -> Ordering {
        other
            .published_at
            .cmp(&self.published_at)
            .then_with(|| self.show_feed_url.cmp(&other.show_feed_url))
            .then_with(|| self.id.cmp(&other.id))
    }
}
