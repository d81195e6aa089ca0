use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tokio_rusqlite::Connection;

use crate::error::DatabaseError;
use crate::models::{Episode, Show};
use crate::notify::{ChangeHub, SnapshotStream};

use super::schema::SCHEMA;

/// Outcome of a write closure: only changed writes are announced to subscribers
pub(crate) enum Write<R> {
    Changed(R),
    Unchanged(R),
}

/// SQLite-backed record store with a single serialized writer.
///
/// `tokio_rusqlite` runs every closure on the connection's own thread, one at
/// a time, so writes never interleave and reads always see committed state.
#[derive(Clone)]
pub(crate) struct Store {
    conn: Connection,
    hub: Arc<ChangeHub>,
}

impl Store {
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            Ok(())
        })
        .await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, DatabaseError> {
        let (shows, episodes) = conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                let tx = conn.transaction()?;
                let snapshots = (load_shows(&tx)?, load_episodes(&tx)?);
                tx.commit()?;
                Ok(snapshots)
            })
            .await?;

        Ok(Self {
            conn,
            hub: Arc::new(ChangeHub::new(shows, episodes)),
        })
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub fn subscribe_shows(&self) -> SnapshotStream<Show> {
        self.hub.subscribe_shows()
    }

    pub fn subscribe_episodes(&self) -> SnapshotStream<Episode> {
        self.hub.subscribe_episodes()
    }

    /// Run `f` inside a read transaction
    pub async fn read<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await?;
        Ok(result)
    }

    /// Run `f` inside a write transaction.
    ///
    /// Any error drops the transaction, rolling it back. A `Changed` outcome
    /// recomputes both snapshots inside the transaction, commits, and
    /// publishes them before the next closure can run.
    pub async fn write<F, R>(&self, f: F) -> Result<R, DatabaseError>
    where
        F: FnOnce(&Transaction) -> Result<Write<R>, DatabaseError> + Send + 'static,
        R: Send + 'static,
    {
        let hub = Arc::clone(&self.hub);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let outcome = match f(&tx) {
                    Ok(outcome) => outcome,
                    Err(e) => return Ok(Err(e)),
                };

                match outcome {
                    Write::Unchanged(result) => {
                        tx.commit()?;
                        Ok(Ok(result))
                    }
                    Write::Changed(result) => {
                        let shows = load_shows(&tx)?;
                        let episodes = load_episodes(&tx)?;
                        tx.commit()?;
                        hub.publish(shows, episodes);
                        Ok(Ok(result))
                    }
                }
            })
            .await?
    }

    /// Execute raw SQL against the store, bypassing the repository
    #[cfg(test)]
    pub async fn execute_raw(&self, sql: &str) -> Result<(), DatabaseError> {
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Row id of the show that represents `feed_url`.
///
/// With duplicate rows the one owning the most episodes wins, then the oldest row.
pub(crate) fn primary_show_id(tx: &Transaction, feed_url: &str) -> rusqlite::Result<Option<i64>> {
    tx.query_row(
        r#"SELECT s.id FROM shows s
           WHERE s.feed_url = ?1
           ORDER BY (SELECT COUNT(*) FROM episodes e WHERE e.show_id = s.id) DESC, s.id ASC
           LIMIT 1"#,
        params![feed_url],
        |row| row.get(0),
    )
    .optional()
}

pub(crate) fn load_show(tx: &Transaction, show_id: i64) -> rusqlite::Result<Show> {
    let mut show = tx.query_row(
        "SELECT id, feed_url, title, description, author, image_url, link_url FROM shows WHERE id = ?1",
        params![show_id],
        show_from_row,
    )?;

    let mut stmt = tx.prepare(&format!("{EPISODE_COLUMNS} WHERE e.show_id = ?1"))?;
    show.episodes = stmt
        .query_map(params![show_id], episode_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    show.episodes.sort_by(Episode::timeline_order);
    Ok(show)
}

/// Every stored show with its episodes, in library order
pub(crate) fn load_shows(tx: &Transaction) -> rusqlite::Result<Vec<Show>> {
    let mut stmt =
        tx.prepare("SELECT id, feed_url, title, description, author, image_url, link_url FROM shows")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, show_from_row(row)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut episodes_by_show: HashMap<i64, Vec<Episode>> = HashMap::new();
    let mut stmt = tx.prepare(EPISODE_COLUMNS)?;
    let mut episode_rows = stmt.query([])?;
    while let Some(row) = episode_rows.next()? {
        let show_id: i64 = row.get(9)?;
        episodes_by_show
            .entry(show_id)
            .or_default()
            .push(episode_from_row(row)?);
    }

    let mut shows: Vec<Show> = rows
        .into_iter()
        .map(|(id, mut show)| {
            let mut episodes = episodes_by_show.remove(&id).unwrap_or_default();
            episodes.sort_by(Episode::timeline_order);
            show.episodes = episodes;
            show
        })
        .collect();
    shows.sort_by(Show::library_order);
    Ok(shows)
}

/// Every stored episode across all shows, newest first
pub(crate) fn load_episodes(tx: &Transaction) -> rusqlite::Result<Vec<Episode>> {
    let mut stmt = tx.prepare(EPISODE_COLUMNS)?;
    let mut episodes = stmt
        .query_map([], episode_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    episodes.sort_by(Episode::timeline_order);
    Ok(episodes)
}

pub(crate) fn insert_show(tx: &Transaction, show: &Show) -> rusqlite::Result<i64> {
    tx.execute(
        "INSERT INTO shows (feed_url, title, description, author, image_url, link_url) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            show.feed_url,
            show.title,
            show.description,
            show.author,
            show.image_url,
            show.link_url,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

pub(crate) fn insert_episode(tx: &Transaction, show_id: i64, episode: &Episode) -> rusqlite::Result<()> {
    tx.execute(
        r#"INSERT INTO episodes (show_id, episode_id, title, subtitle, description, duration_secs, sound_url, published_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        params![
            show_id,
            episode.id,
            episode.title,
            episode.subtitle,
            episode.description,
            episode.duration,
            episode.sound_url,
            episode.published_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

/// Cascade by hand: episodes first, then the show row itself
pub(crate) fn delete_show_row(tx: &Transaction, show_id: i64) -> rusqlite::Result<usize> {
    let episodes = tx.execute("DELETE FROM episodes WHERE show_id = ?1", params![show_id])?;
    tx.execute("DELETE FROM shows WHERE id = ?1", params![show_id])?;
    Ok(episodes)
}

const EPISODE_COLUMNS: &str = r#"SELECT s.feed_url, e.episode_id, e.title, e.subtitle, e.description,
                                       e.duration_secs, e.sound_url, e.published_at, e.id, e.show_id
                                FROM episodes e
                                JOIN shows s ON s.id = e.show_id"#;

fn parse_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn show_from_row(row: &Row) -> rusqlite::Result<Show> {
    Ok(Show {
        feed_url: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        author: row.get(4)?,
        image_url: row.get(5)?,
        link_url: row.get(6)?,
        episodes: Vec::new(),
    })
}

fn episode_from_row(row: &Row) -> rusqlite::Result<Episode> {
    Ok(Episode {
        show_feed_url: row.get(0)?,
        id: row.get(1)?,
        title: row.get(2)?,
        subtitle: row.get(3)?,
        description: row.get(4)?,
        duration: row.get(5)?,
        sound_url: row.get(6)?,
        published_at: parse_timestamp(row.get(7)?),
    })
}
