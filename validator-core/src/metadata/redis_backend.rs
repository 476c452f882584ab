//! Redis-backed metadata store: the real-world backend behind
//! [`super::MetadataStore`], mirroring how `storage::rocksdb::RocksDbBlockStore`
//! plays the "real" backend role behind `BlockStore` in the teacher.
//!
//! Keys follow the hash-of-hashes layout described by the protocol: a field
//! hash `hotkey:<hotkey>` maps `data_hash → metadata json`, and a
//! TTL-bearing key `<hotkey>:<data_hash>` tracks expiry independently so the
//! server can drop stale entries without the validator polling for them.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::MetadataError;
use crate::types::{BlobMetadata, ChunkEntry, DataHash, Hotkey};

use super::MetadataStore;

fn hotkey_field_key(hotkey: &Hotkey) -> String {
    format!("hotkey:{}", hotkey.0)
}

fn ttl_key(hotkey: &Hotkey, data_hash: &DataHash) -> String {
    format!("{}:{}", hotkey.0, data_hash)
}

fn chunk_mapping_key(data_hash: &DataHash) -> String {
    format!("chunks:{data_hash}")
}

/// Async Redis client implementing [`MetadataStore`] against an external
/// `redis`/`aioredis`-shaped deployment.
pub struct RedisMetadataStore {
    client: redis::Client,
    write_locks: DashMap<(Hotkey, DataHash), Arc<Mutex<()>>>,
}

impl RedisMetadataStore {
    pub fn new(host: &str, port: u16, db_index: u8) -> Result<Self, MetadataError> {
        let url = format!("redis://{host}:{port}/{db_index}");
        let client = redis::Client::open(url).map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        Ok(RedisMetadataStore {
            client,
            write_locks: DashMap::new(),
        })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, MetadataError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))
    }

    fn lock_for(&self, hotkey: &Hotkey, data_hash: &DataHash) -> Arc<Mutex<()>> {
        self.write_locks
            .entry((hotkey.clone(), data_hash.clone()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl MetadataStore for RedisMetadataStore {
    async fn add_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
        metadata: BlobMetadata,
    ) -> Result<(), MetadataError> {
        let guard = self.lock_for(hotkey, data_hash);
        let _held = guard.lock().await;

        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&metadata)?;
        let _: () = conn
            .hset(hotkey_field_key(hotkey), data_hash, &json)
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;

        if metadata.ttl_seconds > 0 {
            let key = ttl_key(hotkey, data_hash);
            let _: () = conn
                .set_ex(&key, 1u8, metadata.ttl_seconds)
                .await
                .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn get_metadata(
        &self,
        hotkey: &Hotkey,
        data_hash: &DataHash,
    ) -> Result<Option<BlobMetadata>, MetadataError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .hget(hotkey_field_key(hotkey), data_hash)
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn get_all_metadata(&self, hotkey: &Hotkey) -> Result<Vec<BlobMetadata>, MetadataError> {
        let mut conn = self.conn().await?;
        let raw: Vec<(String, String)> = conn
            .hgetall(hotkey_field_key(hotkey))
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        raw.into_iter()
            .map(|(_, json)| serde_json::from_str(&json).map_err(MetadataError::from))
            .collect()
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
        let mut conn = self.conn().await?;
        let _: () = conn
            .hdel(hotkey_field_key(hotkey), data_hash)
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn hkeys(&self, hotkey: &Hotkey) -> Result<Vec<DataHash>, MetadataError> {
        let mut conn = self.conn().await?;
        conn.hkeys(hotkey_field_key(hotkey))
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))
    }

    async fn hotkey_storage_used(&self, hotkey: &Hotkey) -> Result<u64, MetadataError> {
        let all = self.get_all_metadata(hotkey).await?;
        Ok(all.iter().map(|m| m.size).sum())
    }

    async fn total_network_storage(&self) -> Result<u64, MetadataError> {
        let mut conn = self.conn().await?;
        let hotkey_field_keys: Vec<String> = conn
            .keys("hotkey:*")
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        let mut total = 0u64;
        for field_key in hotkey_field_keys {
            let values: Vec<String> = conn
                .hvals(&field_key)
                .await
                .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
            for json in values {
                let metadata: BlobMetadata = serde_json::from_str(&json)?;
                total += metadata.size;
            }
        }
        Ok(total)
    }

    async fn store_chunk_metadata(&self, data_hash: &DataHash, entry: ChunkEntry) -> Result<(), MetadataError> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(&entry)?;
        let _: () = conn
            .hset(chunk_mapping_key(data_hash), entry.chunk_index, &json)
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_ordered_metadata(&self, data_hash: &DataHash) -> Result<Vec<ChunkEntry>, MetadataError> {
        let mut conn = self.conn().await?;
        let raw: Vec<(usize, String)> = conn
            .hgetall(chunk_mapping_key(data_hash))
            .await
            .map_err(|e| MetadataError::Unavailable(e.to_string()))?;
        let mut entries = raw
            .into_iter()
            .map(|(_, json)| serde_json::from_str::<ChunkEntry>(&json).map_err(MetadataError::from))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.chunk_index);
        Ok(entries)
    }
}
