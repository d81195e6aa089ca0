use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::Show;

/// Supplies the current contents of a feed as plain show data.
///
/// Implementations must not touch the library; they only describe what the
/// feed publishes right now.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_show(&self, feed_url: &str) -> Result<Show, FetchError>;
}

/// Serves show snapshots previously exported as JSON files.
///
/// Each `*.json` file in the directory holds one [`Show`]; files are indexed by
/// the show's feed URL.
#[derive(Debug, Clone, Default)]
pub struct JsonSnapshotSource {
    shows: HashMap<String, Show>,
}

impl JsonSnapshotSource {
    /// Load every snapshot in `dir`. A missing directory yields an empty source.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let mut shows = HashMap::new();
        if !dir.exists() {
            return Ok(Self { shows });
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|json| serde_json::from_str::<Show>(&json).map_err(|e| e.to_string()));
            match parsed {
                Ok(show) => {
                    shows.insert(show.feed_url.clone(), show);
                }
                Err(e) => {
                    tracing::warn!("Skipping snapshot {}: {}", path.display(), e);
                }
            }
        }

        tracing::debug!("Loaded {} feed snapshots from {}", shows.len(), dir.display());
        Ok(Self { shows })
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }
}

#[async_trait]
impl FeedSource for JsonSnapshotSource {
    async fn fetch_show(&self, feed_url: &str) -> Result<Show, FetchError> {
        let show = self
            .shows
            .get(feed_url)
            .cloned()
            .ok_or_else(|| FetchError::Unavailable {
                feed_url: feed_url.to_string(),
            })?;

        if show.title.trim().is_empty() {
            return Err(FetchError::Invalid {
                feed_url: feed_url.to_string(),
                reason: "show has no title".to_string(),
            });
        }
        Ok(show)
    }
}
