// Bucket store
// Sound files grouped under a bucket label, every operation in its own transaction.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::connection::{DatabaseConnection, DbLocation};
use super::migrations::SCHEMA_VERSION;
use super::models::{AddedFile, FileBlob, StoredFile};
use crate::error::{StoreError, StoreResult};

const SELECT_FILE: &str =
    "SELECT id, bucket, name, mime_type, last_modified, bytes FROM sound_files";

/// Persistent, bucket-indexed store of uploaded sound files.
///
/// Ids are assigned by the store, unique across all buckets and never reused.
/// Every operation fails with `StoreError::NotReady` until `setup` has completed.
pub struct BucketStore {
    location: DbLocation,
    db: RwLock<Option<DatabaseConnection>>,
}

impl BucketStore {
    pub fn new(location: DbLocation) -> Self {
        Self {
            location,
            db: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DbLocation::Memory)
    }

    pub fn is_ready(&self) -> bool {
        self.db.read().is_some()
    }

    /// Open the store at the current schema version, creating it on first use
    pub async fn setup(&self) -> StoreResult<()> {
        self.setup_version(SCHEMA_VERSION).await
    }

    /// Open the store at `version`. Only version 1 exists.
    pub async fn setup_version(&self, version: u32) -> StoreResult<()> {
        if self.is_ready() {
            return Ok(());
        }

        let location = self.location.clone();
        let db = tokio::task::spawn_blocking(move || DatabaseConnection::open(&location, version))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))??;

        let mut slot = self.db.write();
        if slot.is_none() {
            *slot = Some(db);
            info!(location = ?self.location, version, "Bucket store ready");
        }
        Ok(())
    }

    /// Insert every file under `bucket` in one transaction.
    ///
    /// `extras[i]` is handed back with file `i`; missing entries default to `{}`.
    /// Extras are not persisted.
    pub async fn add_files_to_bucket(
        &self,
        bucket: &str,
        files: Vec<FileBlob>,
        extras: Vec<Value>,
    ) -> StoreResult<Vec<AddedFile>> {
        let bucket = bucket.to_string();
        let added = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let mut ids = Vec::with_capacity(files.len());
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO sound_files (bucket, name, mime_type, size, last_modified, bytes)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for file in &files {
                        stmt.execute(params![
                            bucket,
                            file.name,
                            file.mime_type,
                            file.size() as i64,
                            file.last_modified.map(|t| t.timestamp_millis()),
                            file.bytes,
                        ])?;
                        ids.push(tx.last_insert_rowid());
                    }
                }
                tx.commit()?;

                let mut extras = extras.into_iter();
                Ok(files
                    .into_iter()
                    .zip(ids)
                    .map(|(file, id)| {
                        let extra = match extras.next() {
                            Some(Value::Null) | None => Value::Object(Map::new()),
                            Some(extra) => extra,
                        };
                        AddedFile {
                            id,
                            bucket: bucket.clone(),
                            file,
                            extra,
                        }
                    })
                    .collect::<Vec<_>>())
            })
            .await?;

        if let Some(first) = added.first() {
            info!(bucket = %first.bucket, count = added.len(), "Added files to bucket");
        }
        Ok(added)
    }

    /// Every bucket label with its member ids in key order, from one index scan
    pub async fn list_buckets(&self) -> StoreResult<BTreeMap<String, Vec<i64>>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut buckets: BTreeMap<String, Vec<i64>> = BTreeMap::new();
            {
                let mut stmt = tx.prepare("SELECT bucket, id FROM sound_files ORDER BY bucket, id")?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let bucket: String = row.get(0)?;
                    buckets.entry(bucket).or_default().push(row.get(1)?);
                }
            }
            tx.commit()?;
            Ok(buckets)
        })
        .await
    }

    /// All records of `bucket` in key order; empty for an unknown bucket
    pub async fn get_bucket_files(&self, bucket: &str) -> StoreResult<Vec<StoredFile>> {
        let bucket = bucket.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE bucket = ?1 ORDER BY id", SELECT_FILE))?;
            let files = stmt
                .query_map(params![bucket], stored_file)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(files)
        })
        .await
    }

    /// Delete every record of `bucket` in one transaction, returning how many went
    pub async fn delete_bucket_files(&self, bucket: &str) -> StoreResult<usize> {
        let bucket = bucket.to_string();
        let deleted = self
            .with_conn({
                let bucket = bucket.clone();
                move |conn| {
                    let tx = conn.transaction()?;
                    let ids: Vec<i64> = {
                        let mut stmt =
                            tx.prepare("SELECT id FROM sound_files WHERE bucket = ?1 ORDER BY id")?;
                        let rows = stmt.query_map(params![bucket], |row| row.get(0))?;
                        rows.collect::<Result<_, _>>()?
                    };

                    let mut deleted = 0;
                    for id in ids {
                        deleted += tx.execute("DELETE FROM sound_files WHERE id = ?1", params![id])?;
                    }
                    // Any error above drops `tx`, which rolls everything back
                    tx.commit()?;
                    Ok(deleted)
                }
            })
            .await?;

        debug!(bucket = %bucket, count = deleted, "Deleted bucket files");
        Ok(deleted)
    }

    /// Point lookup by id; `None` when absent
    pub async fn find_file(&self, id: i64) -> StoreResult<Option<StoredFile>> {
        self.with_conn(move |conn| {
            let file = conn
                .query_row(&format!("{} WHERE id = ?1", SELECT_FILE), params![id], stored_file)
                .optional()?;
            Ok(file)
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .db
            .read()
            .as_ref()
            .map(DatabaseConnection::get_connection)
            .ok_or(StoreError::NotReady)?;

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn stored_file(row: &Row<'_>) -> rusqlite::Result<StoredFile> {
    let last_modified: Option<i64> = row.get(4)?;
    Ok(StoredFile {
        id: row.get(0)?,
        bucket: row.get(1)?,
        file: FileBlob {
            name: row.get(2)?,
            mime_type: row.get(3)?,
            last_modified: last_modified.and_then(DateTime::<Utc>::from_timestamp_millis),
            bytes: row.get(5)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    async fn ready_store() -> BucketStore {
        let store = BucketStore::in_memory();
        store.setup().await.unwrap();
        store
    }

    fn blob(name: &str) -> FileBlob {
        FileBlob::new(name, name.as_bytes().to_vec()).with_mime_type("audio/wav")
    }

    fn blobs(names: &[&str]) -> Vec<FileBlob> {
        names.iter().map(|name| blob(name)).collect()
    }

    async fn add_trigger(store: &BucketStore, sql: &'static str) {
        store
            .with_conn(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_operations_before_setup_are_not_ready() {
        let store = BucketStore::in_memory();
        assert!(!store.is_ready());
        assert!(matches!(
            store.list_buckets().await,
            Err(StoreError::NotReady)
        ));
        assert!(matches!(
            store.add_files_to_bucket("A", blobs(&["a"]), vec![]).await,
            Err(StoreError::NotReady)
        ));
        assert!(matches!(
            store.get_bucket_files("A").await,
            Err(StoreError::NotReady)
        ));
        assert!(matches!(
            store.delete_bucket_files("A").await,
            Err(StoreError::NotReady)
        ));
        assert!(matches!(store.find_file(1).await, Err(StoreError::NotReady)));
    }

    #[tokio::test]
    async fn test_unsupported_version_fails_setup() {
        let store = BucketStore::in_memory();
        let err = store.setup_version(2).await.unwrap_err();
        assert!(matches!(err, StoreError::SchemaVersion { requested: 2, .. }));
        assert!(!store.is_ready());
    }

    #[tokio::test]
    async fn test_buckets_list_get_and_delete() {
        let store = ready_store().await;
        let a = store
            .add_files_to_bucket("A", blobs(&["a1", "a2", "a3"]), vec![])
            .await
            .unwrap();
        let b = store
            .add_files_to_bucket("B", blobs(&["b1", "b2"]), vec![])
            .await
            .unwrap();
        let a_ids: Vec<i64> = a.iter().map(|f| f.id).collect();
        let b_ids: Vec<i64> = b.iter().map(|f| f.id).collect();

        let buckets = store.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets["A"], a_ids);
        assert_eq!(buckets["B"], b_ids);

        let files = store.get_bucket_files("A").await.unwrap();
        assert_eq!(files.iter().map(|f| f.id).collect::<Vec<_>>(), a_ids);
        assert_eq!(
            files.iter().map(|f| f.file.name.as_str()).collect::<Vec<_>>(),
            vec!["a1", "a2", "a3"]
        );

        assert_eq!(store.delete_bucket_files("A").await.unwrap(), 3);
        let buckets = store.list_buckets().await.unwrap();
        assert!(!buckets.contains_key("A"));
        assert_eq!(buckets["B"], b_ids);
        assert!(store.get_bucket_files("A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_added_file_round_trips_through_find() {
        let store = ready_store().await;
        let modified = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let file = FileBlob::new("rain.ogg", vec![0, 1, 2, 254, 255])
            .with_mime_type("audio/ogg")
            .with_last_modified(modified);

        let added = store
            .add_files_to_bucket("weather", vec![file.clone()], vec![json!({"gain": 0.5})])
            .await
            .unwrap();
        assert_eq!(added[0].extra, json!({"gain": 0.5}));

        let found = store.find_file(added[0].id).await.unwrap().unwrap();
        assert_eq!(found.bucket, "weather");
        assert_eq!(found.file, file);
        assert_eq!(store.find_file(added[0].id + 100).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_extras_pair_by_position() {
        let store = ready_store().await;
        let added = store
            .add_files_to_bucket("A", blobs(&["x", "y", "z"]), vec![json!({"n": 1}), Value::Null])
            .await
            .unwrap();
        assert_eq!(added[0].extra, json!({"n": 1}));
        assert_eq!(added[1].extra, json!({}));
        assert_eq!(added[2].extra, json!({}));
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let store = ready_store().await;
        let first = store
            .add_files_to_bucket("A", blobs(&["a"]), vec![])
            .await
            .unwrap();
        store.delete_bucket_files("A").await.unwrap();
        let second = store
            .add_files_to_bucket("A", blobs(&["a"]), vec![])
            .await
            .unwrap();
        assert!(second[0].id > first[0].id);
    }

    #[tokio::test]
    async fn test_failed_add_inserts_nothing() {
        let store = ready_store().await;
        add_trigger(
            &store,
            "CREATE TRIGGER reject_bad BEFORE INSERT ON sound_files
             WHEN NEW.name = 'bad'
             BEGIN SELECT RAISE(ABORT, 'bad file'); END;",
        )
        .await;

        let err = store
            .add_files_to_bucket("A", blobs(&["good", "bad"]), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transaction(_)));
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_bucket_intact() {
        let store = ready_store().await;
        store
            .add_files_to_bucket("A", blobs(&["a1", "locked", "a3"]), vec![])
            .await
            .unwrap();
        add_trigger(
            &store,
            "CREATE TRIGGER keep_locked BEFORE DELETE ON sound_files
             WHEN OLD.name = 'locked'
             BEGIN SELECT RAISE(ABORT, 'locked'); END;",
        )
        .await;

        assert!(store.delete_bucket_files("A").await.is_err());
        assert_eq!(store.get_bucket_files("A").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let location = DbLocation::File(dir.path().join("nested").join("sounds.db"));

        let store = BucketStore::new(location.clone());
        store.setup().await.unwrap();
        let added = store
            .add_files_to_bucket("A", blobs(&["a"]), vec![])
            .await
            .unwrap();
        drop(store);

        let reopened = BucketStore::new(location);
        reopened.setup().await.unwrap();
        let found = reopened.find_file(added[0].id).await.unwrap().unwrap();
        assert_eq!(found.file.bytes, b"a".to_vec());
    }
}
