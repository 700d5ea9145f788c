// Database module
// SQLite-backed bucket store for uploaded sounds

pub mod connection;
pub mod migrations;
pub mod models;
pub mod store;

pub use connection::DbLocation;
pub use models::{AddedFile, FileBlob, StoredFile};
pub use store::BucketStore;
