use std::collections::HashSet;
use std::path::Path;

use rusqlite::params;

use crate::error::DatabaseError;
use crate::models::{Episode, Show};
use crate::notify::SnapshotStream;

use super::dedup::DedupGuard;
use super::store::{self, Store, Write};

/// The library of followed shows.
///
/// Cheap to clone; every clone shares one store, one writer and one hub.
#[derive(Clone)]
pub struct Repository {
    store: Store,
}

impl Repository {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let store = Store::open(db_path.as_ref()).await?;
        Ok(Self { store })
    }

    /// Fresh, empty in-memory library
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let store = Store::open_in_memory().await?;
        Ok(Self { store })
    }

    pub fn dedup_guard(&self) -> DedupGuard {
        DedupGuard::new(self.store.clone())
    }

    // Queries

    /// The followed show for `feed_url` with its episodes, newest first
    pub async fn fetch_show(&self, feed_url: &str) -> Result<Option<Show>, DatabaseError> {
        let feed_url = feed_url.to_string();
        self.store
            .read(move |tx| match store::primary_show_id(tx, &feed_url)? {
                Some(show_id) => store::load_show(tx, show_id).map(Some),
                None => Ok(None),
            })
            .await
    }

    /// All followed shows ordered by title, then feed URL
    pub async fn fetch_followed_shows(&self) -> Result<Vec<Show>, DatabaseError> {
        self.store.read(store::load_shows).await
    }

    // Snapshot streams

    pub fn followed_shows_stream(&self) -> SnapshotStream<Show> {
        self.store.subscribe_shows()
    }

    pub fn followed_episodes_stream(&self) -> SnapshotStream<Episode> {
        self.store.subscribe_episodes()
    }

    /// Live subscribers per query: (shows, episodes)
    pub fn subscriber_counts(&self) -> (usize, usize) {
        let hub = self.store.hub();
        (hub.show_subscribers(), hub.episode_subscribers())
    }

    // Writes

    /// Store `show` and its episodes. Following an already followed show is a no-op.
    pub async fn follow_show(&self, show: Show) -> Result<(), DatabaseError> {
        self.store
            .write(move |tx| {
                if store::primary_show_id(tx, &show.feed_url)?.is_some() {
                    tracing::debug!("Already following {}", show.feed_url);
                    return Ok(Write::Unchanged(()));
                }

                let show_id = store::insert_show(tx, &show)?;
                let inserted = insert_new_episodes(tx, show_id, &show.episodes, HashSet::new())?;
                tracing::debug!("Followed {} with {} episodes", show.feed_url, inserted);
                Ok(Write::Changed(()))
            })
            .await
    }

    /// Remove every record for `feed_url` together with its episodes.
    /// Unfollowing a show that is not followed is a no-op.
    pub async fn unfollow_show(&self, feed_url: &str) -> Result<(), DatabaseError> {
        let feed_url = feed_url.to_string();
        self.store
            .write(move |tx| {
                let mut stmt = tx.prepare("SELECT id FROM shows WHERE feed_url = ?1")?;
                let show_ids = stmt
                    .query_map(params![feed_url], |row| row.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                if show_ids.is_empty() {
                    tracing::debug!("Not following {}, nothing to unfollow", feed_url);
                    return Ok(Write::Unchanged(()));
                }

                let mut episodes = 0;
                for show_id in &show_ids {
                    episodes += store::delete_show_row(tx, *show_id)?;
                }
                tracing::debug!(
                    "Unfollowed {} ({} rows, {} episodes)",
                    feed_url,
                    show_ids.len(),
                    episodes
                );
                Ok(Write::Changed(()))
            })
            .await
    }

    /// Append the episodes of `show` that are not stored yet.
    ///
    /// Stored episodes are never touched, whether or not the payload still
    /// carries them. Fails with `ShowNotFollowed` if the show is not followed.
    pub async fn add_new_episodes(&self, show: Show) -> Result<(), DatabaseError> {
        self.add_new_episodes_counted(show).await.map(|_| ())
    }

    /// Same as [`Repository::add_new_episodes`], returning how many episodes were stored
    pub(crate) async fn add_new_episodes_counted(&self, show: Show) -> Result<usize, DatabaseError> {
        self.store
            .write(move |tx| {
                let Some(show_id) = store::primary_show_id(tx, &show.feed_url)? else {
                    return Err(DatabaseError::ShowNotFollowed {
                        feed_url: show.feed_url,
                    });
                };

                let known = stored_episode_ids(tx, show_id)?;
                let inserted = insert_new_episodes(tx, show_id, &show.episodes, known)?;
                if inserted == 0 {
                    return Ok(Write::Unchanged(0));
                }

                tracing::debug!("Added {} new episodes to {}", inserted, show.feed_url);
                Ok(Write::Changed(inserted))
            })
            .await
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

fn stored_episode_ids(tx: &rusqlite::Transaction, show_id: i64) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = tx.prepare("SELECT episode_id FROM episodes WHERE show_id = ?1")?;
    let ids = stmt
        .query_map(params![show_id], |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<String>>>()?;
    Ok(ids)
}

/// Insert episodes whose id is not in `known`; repeated ids in the payload are inserted once
fn insert_new_episodes(
    tx: &rusqlite::Transaction,
    show_id: i64,
    episodes: &[Episode],
    mut known: HashSet<String>,
) -> rusqlite::Result<usize> {
    let mut inserted = 0;
    for episode in episodes {
        if known.insert(episode.id.clone()) {
            store::insert_episode(tx, show_id, episode)?;
            inserted += 1;
        }
    }
    Ok(inserted)
}
