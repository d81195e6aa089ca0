mod hub;

pub use hub::{ChangeHub, Snapshot, SnapshotStream};
