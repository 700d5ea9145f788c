// Database connection management
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::StoreResult;

/// Where the store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    /// Private in-memory database, gone when the connection drops
    Memory,
}

/// The store's single, exclusively owned connection
pub struct DatabaseConnection {
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    pub fn open(location: &DbLocation, version: u32) -> StoreResult<Self> {
        let mut conn = match location {
            DbLocation::File(db_path) => {
                // Create parent directory if it doesn't exist
                if let Some(parent) = db_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(db_path)?
            }
            DbLocation::Memory => Connection::open_in_memory()?,
        };

        run_migrations(&mut conn, version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn get_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

impl Clone for DatabaseConnection {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}
