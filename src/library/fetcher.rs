// Byte fetcher backed by the bucket store
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::db::models::StoredFile;
use crate::db::store::BucketStore;
use crate::scheduler::sound::{FetchBytes, SoundDescriptor};

/// Resolves a descriptor id (the stored record id) to the file's bytes
pub struct StoreFetcher {
    store: Arc<BucketStore>,
}

impl StoreFetcher {
    pub fn new(store: Arc<BucketStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    /// One descriptor per stored record, all sharing this fetcher
    pub fn descriptors(self: &Arc<Self>, files: &[StoredFile]) -> Vec<SoundDescriptor> {
        let fetcher: Arc<dyn FetchBytes> = self.clone();
        files
            .iter()
            .map(|file| {
                SoundDescriptor::new(file.id.to_string(), fetcher.clone()).with_extra(
                    serde_json::json!({ "bucket": file.bucket, "name": file.file.name }),
                )
            })
            .collect()
    }
}

#[async_trait]
impl FetchBytes for StoreFetcher {
    async fn fetch(&self, id: &str, _extra: &Value) -> anyhow::Result<Vec<u8>> {
        let key: i64 = id
            .parse()
            .with_context(|| format!("Sound id {:?} is not a stored file id", id))?;
        let file = self
            .store
            .find_file(key)
            .await
            .with_context(|| format!("Failed to load sound {}", key))?
            .with_context(|| format!("Sound {} is no longer in the store", key))?;
        Ok(file.file.bytes)
    }
}
