use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::Episode;

/// A followed podcast, identified by its feed URL.
///
/// Being stored is what makes a show "followed"; there is no separate flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub feed_url: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub image_url: String,
    #[serde(default)]
    pub link_url: Option<String>,
    /// Newest first when read back from the library.
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Show {
    /// Library ordering: title ascending, ties broken by feed URL
    pub fn library_order(&self, other: &Self) -> Ordering {
        self.title
            .cmp(&other.title)
            .then_with(|| self.feed_url.cmp(&other.feed_url))
    }

    pub fn episode_ids(&self) -> impl Iterator<Item = &str> {
        self.episodes.iter().map(|e| e.id.as_str())
    }
}
