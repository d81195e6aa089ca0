use thiserror::Error;

/// Errors surfaced by the library store
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("Show is not followed: {feed_url}")]
    ShowNotFollowed { feed_url: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.into())
    }
}

/// Errors reported by a feed source
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("No feed available for {feed_url}")]
    Unavailable { feed_url: String },

    #[error("Invalid feed data for {feed_url}: {reason}")]
    Invalid { feed_url: String, reason: String },
}

/// Errors that can occur while merging fetched feeds into the library
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Database(#[from] DatabaseError),
}

/// Top-level errors for the command line front end
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Merge(#[from] MergeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
