//! In-memory metadata store.
//!
//! Suitable for unit tests and single-node development, mirroring the
//! teacher's `storage::mem::InMemoryBlockStore`. Single-flight locking per
//! `(hotkey, data_hash)` is implemented with a `dashmap`-backed map of
//! `tokio::sync::Mutex<()>` guards, so conflicting writes to the same key
//! serialize without blocking writes to a different key.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::MetadataError;
use crate::types::{BlobMetadata, ChunkEntry, DataHash, Hotkey};

use super::MetadataStore;

#[derive(Default)]
struct HotkeyBucket {
    blobs: BTreeMap<DataHash, BlobMetadata>,
}

/// `tokio::sync::Mutex`-guarded in-process metadata map.
pub struct InMemoryMetadataStore {
    buckets: Mutex<BTreeMap<Hotkey, HotkeyBucket>>,
    chunk_mappings: Mutex<BTreeMap<DataHash, Vec<ChunkEntry>>>,
    write_locks: DashMap<(Hotkey, DataHash), Arc<Mutex<()>>>,
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        InMemoryMetadataStore {
            buckets: Mutex::new(BTreeMap::new()),
            chunk_mappings: Mutex::new(BTreeMap::new()),
            write_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, hotkey: &Hotkey, data_hash: &DataHash) -> Arc<Mutex<()>> {
        self.write_locks
            .entry((hotkey.clone(), data_hash.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn add_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
        metadata: BlobMetadata,
    ) -> Result<(), MetadataError> {
        let guard = self.lock_for(hotkey, data_hash);
        let _held = guard.lock().await;
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(hotkey.clone())
            .or_default()
            .blobs
            .insert(data_hash.clone(), metadata);
        Ok(())
    }

    async fn get_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
    ) -> Result<Option<BlobMetadata>, MetadataError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets.get(hotkey).and_then(|b| b.blobs.get(data_hash)).cloned())
    }

    async fn get_all_metadata(&self, hotkey: &Hotkey) -> Result<Vec<BlobMetadata>, MetadataError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .get(hotkey)
            .map(|b| b.blobs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
        metadata: BlobMetadata,
    ) -> Result<(), MetadataError> {
        self.add_metadata(hotkey, data_hash, metadata).await
    }

    async fn remove_metadata(&self, hotkey: &Hotkey, data_hash: &DataHash) -> Result<(), MetadataError> {
        let guard = self.lock_for(hotkey, data_hash);
        let _held = guard.lock().await;
        let mut buckets = self.buckets.lock().await;
        if let Some(bucket) = buckets.get_mut(hotkey) {
            bucket.blobs.remove(data_hash);
        }
        Ok(())
    }

    async fn hkeys(&self, hotkey: &Hotkey) -> Result<Vec<DataHash>, MetadataError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .get(hotkey)
            .map(|b| b.blobs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hotkey_storage_used(&self, hotkey: &Hotkey) -> Result<u64, MetadataError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .get(hotkey)
            .map(|b| b.blobs.values().map(|m| m.size).sum())
            .unwrap_or(0))
    }

    async fn total_network_storage(&self) -> Result<u64, MetadataError> {
        let buckets = self.buckets.lock().await;
        Ok(buckets
            .values()
            .flat_map(|b| b.blobs.values())
            .map(|m| m.size)
            .sum())
    }

    async fn store_chunk_metadata(&self, data_hash: &DataHash, entry: ChunkEntry) -> Result<(), MetadataError> {
        let mut mappings = self.chunk_mappings.lock().await;
        let list = mappings.entry(data_hash.clone()).or_default();
        list.retain(|e| e.chunk_index != entry.chunk_index);
        list.push(entry);
        list.sort_by_key(|e| e.chunk_index);
        Ok(())
    }

    async fn get_ordered_metadata(&self, data_hash: &DataHash) -> Result<Vec<ChunkEntry>, MetadataError> {
        let mappings = self.chunk_mappings.lock().await;
        Ok(mappings.get(data_hash).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncryptionPayload;

    fn sample_metadata(hash: &str, size: u64) -> BlobMetadata {
        BlobMetadata::new(
            hash.to_string(),
            size,
            EncryptionPayload {
                nonce: vec![0u8; 12],
                tag: vec![0u8; 16],
            },
            0,
        )
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let store = InMemoryMetadataStore::new();
        let hotkey = Hotkey("5F...miner1".to_string());
        let data_hash = "deadbeef".to_string();

        store
            .add_metadata(&hotkey, &data_hash, sample_metadata(&data_hash, 1024))
            .await
            .unwrap();

        let fetched = store.get_metadata(&hotkey, &data_hash).await.unwrap().unwrap();
        assert_eq!(fetched.size, 1024);
        assert_eq!(store.hkeys(&hotkey).await.unwrap(), vec![data_hash]);
    }

    #[tokio::test]
    async fn hotkey_at_capacity_reflects_summed_sizes() {
        let store = InMemoryMetadataStore::new();
        let hotkey = Hotkey("5F...miner2".to_string());
        store
            .add_metadata(&hotkey, &"a".to_string(), sample_metadata("a", 600))
            .await
            .unwrap();
        store
            .add_metadata(&hotkey, &"b".to_string(), sample_metadata("b", 500))
            .await
            .unwrap();

        assert!(store.hotkey_at_capacity(&hotkey, 1000).await.unwrap());
        assert!(!store.hotkey_at_capacity(&hotkey, 2000).await.unwrap());
    }

    #[tokio::test]
    async fn total_network_storage_sums_across_hotkeys() {
        let store = InMemoryMetadataStore::new();
        store
            .add_metadata(&Hotkey("h1".to_string()), &"a".to_string(), sample_metadata("a", 100))
            .await
            .unwrap();
        store
            .add_metadata(&Hotkey("h2".to_string()), &"b".to_string(), sample_metadata("b", 200))
            .await
            .unwrap();
        assert_eq!(store.total_network_storage().await.unwrap(), 300);
    }

    #[tokio::test]
    async fn chunk_mapping_is_returned_in_order() {
        let store = InMemoryMetadataStore::new();
        let data_hash = "blob1".to_string();
        store
            .store_chunk_metadata(
                &data_hash,
                ChunkEntry { chunk_index: 2, chunk_hash: "c2".to_string(), hotkey: Hotkey("h".to_string()) },
            )
            .await
            .unwrap();
        store
            .store_chunk_metadata(
                &data_hash,
                ChunkEntry { chunk_index: 0, chunk_hash: "c0".to_string(), hotkey: Hotkey("h".to_string()) },
            )
            .await
            .unwrap();

        let ordered = store.get_ordered_metadata(&data_hash).await.unwrap();
        assert_eq!(ordered.iter().map(|e| e.chunk_index).collect::<Vec<_>>(), vec![0, 2]);
    }
}
