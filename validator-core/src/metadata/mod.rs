//! The metadata store adapter (C3): typed operations over an external
//! hash-of-hashes key-value service, plus an in-memory test double.
//!
//! Keys are conceptually `hotkey:<hotkey>` (a field hash mapping
//! `data_hash → metadata`) and `<hotkey>:<data_hash>` (the TTL-bearing key),
//! but that shape is an implementation detail of each backend; callers only
//! see the [`MetadataStore`] trait.

pub mod mem;
pub mod redis_backend;

pub use mem::InMemoryMetadataStore;
pub use redis_backend::RedisMetadataStore;

use async_trait::async_trait;

use crate::error::MetadataError;
use crate::types::{BlobMetadata, ChunkEntry, DataHash, Hotkey};

/// External hash-of-hashes metadata service, abstracted the way the
/// teacher's `BlockStore` trait abstracts over in-memory and persistent
/// backends.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn add_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
        metadata: BlobMetadata,
    ) -> Result<(), MetadataError>;

    async fn get_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
    ) -> Result<Option<BlobMetadata>, MetadataError>;

    async fn get_all_metadata(&self, hotkey: &Hotkey) -> Result<Vec<BlobMetadata>, MetadataError>;

    async fn update_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
        metadata: BlobMetadata,
    ) -> Result<(), MetadataError>;

    async fn remove_metadata(&self, hotkey: &Hotkey, data_hash: &DataHash) -> Result<(), MetadataError>;

    async fn hkeys(&self, hotkey: &Hotkey) -> Result<Vec<DataHash>, MetadataError>;

    async fn hotkey_storage_used(&self, hotkey: &Hotkey) -> Result<u64, MetadataError>;

    async fn hotkey_at_capacity(&self, hotkey: &Hotkey, capacity_bytes: u64) -> Result<bool, MetadataError> {
        Ok(self.hotkey_storage_used(hotkey).await? >= capacity_bytes)
    }

    async fn total_network_storage(&self) -> Result<u64, MetadataError>;

    async fn store_chunk_metadata(&self, data_hash: &DataHash, entry: ChunkEntry) -> Result<(), MetadataError>;

    async fn get_ordered_metadata(&self, data_hash: &DataHash) -> Result<Vec<ChunkEntry>, MetadataError>;
}
