use std::collections::HashMap;

use rusqlite::{params, Transaction};

use crate::error::DatabaseError;

use super::store::{self, Store, Write};

/// Rows removed by one dedup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub shows_removed: usize,
    pub episodes_removed: usize,
}

impl DedupReport {
    pub fn is_empty(&self) -> bool {
        self.shows_removed == 0 && self.episodes_removed == 0
    }
}

/// Collapses records that share a natural key back into one.
///
/// Replicated stores can end up with several show rows for one feed URL, or
/// several episode rows for one `(feed URL, episode id)`. The pass runs as a
/// single write transaction, so a failure leaves the store untouched and the
/// pass can simply be run again.
pub struct DedupGuard {
    store: Store,
}

impl DedupGuard {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Delete duplicate shows, then duplicate episodes.
    ///
    /// Shows: the row owning the most episodes survives (oldest row on a tie).
    /// Episodes: the row with the latest `published_at` survives (oldest row
    /// on a tie).
    pub async fn delete(&self) -> Result<DedupReport, DatabaseError> {
        let report = self
            .store
            .write(|tx| {
                let shows_removed = delete_duplicate_shows(tx)?;
                let episodes_removed = delete_duplicate_episodes(tx)?;
                let report = DedupReport {
                    shows_removed,
                    episodes_removed,
                };

                if report.is_empty() {
                    Ok(Write::Unchanged(report))
                } else {
                    Ok(Write::Changed(report))
                }
            })
            .await?;

        if report.is_empty() {
            tracing::debug!("Dedup pass found no duplicates");
        } else {
            tracing::info!(
                "Dedup pass removed {} shows and {} episodes",
                report.shows_removed,
                report.episodes_removed
            );
        }
        Ok(report)
    }
}

struct ShowRow {
    id: i64,
    episode_count: i64,
}

fn delete_duplicate_shows(tx: &Transaction) -> Result<usize, DatabaseError> {
    let mut stmt = tx.prepare(
        r#"SELECT s.id, s.feed_url, (SELECT COUNT(*) FROM episodes e WHERE e.show_id = s.id)
           FROM shows s"#,
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                ShowRow {
                    id: row.get(0)?,
                    episode_count: row.get(2)?,
                },
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut groups: HashMap<String, Vec<ShowRow>> = HashMap::new();
    for (feed_url, row) in rows {
        groups.entry(feed_url).or_default().push(row);
    }

    let mut removed = 0;
    for (feed_url, mut candidates) in groups {
        if candidates.len() < 2 {
            continue;
        }

        candidates.sort_by(|a, b| {
            b.episode_count
                .cmp(&a.episode_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        tracing::debug!(
            "Keeping show row {} of {} for {}",
            candidates[0].id,
            candidates.len(),
            feed_url
        );
        for loser in &candidates[1..] {
            store::delete_show_row(tx, loser.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

struct EpisodeRow {
    id: i64,
    published_at: i64,
}

fn delete_duplicate_episodes(tx: &Transaction) -> Result<usize, DatabaseError> {
    let mut stmt = tx.prepare(
        r#"SELECT e.id, s.feed_url, e.episode_id, e.published_at
           FROM episodes e
           JOIN shows s ON s.id = e.show_id"#,
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                (row.get::<_, String>(1)?, row.get::<_, String>(2)?),
                EpisodeRow {
                    id: row.get(0)?,
                    published_at: row.get(3)?,
                },
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut groups: HashMap<(String, String), Vec<EpisodeRow>> = HashMap::new();
    for (key, row) in rows {
        groups.entry(key).or_default().push(row);
    }

    let mut removed = 0;
    for mut candidates in groups.into_values() {
        if candidates.len() < 2 {
            continue;
        }

        candidates.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        for loser in &candidates[1..] {
            tx.execute("DELETE FROM episodes WHERE id = ?1", params![loser.id])?;
            removed += 1;
        }
    }
    Ok(removed)
}
