/// Natural keys (`shows.feed_url`, `episodes(show_id, episode_id)`) are not
/// declared UNIQUE: replicated stores can deliver duplicate rows, which the
/// repository tolerates on read and the dedup pass collapses.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- shows table
CREATE TABLE IF NOT EXISTS shows (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_url TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    author TEXT,
    image_url TEXT NOT NULL,
    link_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_shows_feed_url ON shows(feed_url);

-- episodes table
CREATE TABLE IF NOT EXISTS episodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    show_id INTEGER NOT NULL REFERENCES shows(id) ON DELETE CASCADE,
    episode_id TEXT NOT NULL,
    title TEXT NOT NULL,
    subtitle TEXT,
    description TEXT,
    duration_secs INTEGER NOT NULL DEFAULT 0,
    sound_url TEXT NOT NULL,
    published_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_show_id ON episodes(show_id, episode_id);
CREATE INDEX IF NOT EXISTS idx_episodes_published_at ON episodes(published_at DESC);
"#;
