mod dedup;
mod repository;
mod schema;
mod store;

pub use dedup::{DedupGuard, DedupReport};
pub use repository::Repository;
