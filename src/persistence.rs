//! Chunked persistence engine
//!
//! A trade history with embedded images outgrows a single storage entry, so
//! the collection is split into consecutive groups of at most `chunk_size`
//! records. Group `i` lives under `<namespace>_<i>` and `<namespace>_count`
//! records how many groups the last save wrote.
//!
//! Saves are best-effort: a slot that fails to serialize or write is logged
//! and skipped, and the in-memory collection stays authoritative. Loads
//! degrade the same way, skipping missing or corrupt slots.
//!
//! Slots are overwritten in place, so a crash mid-save can leave a torn
//! collection.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::codec::ImageCodec;
use crate::error::JournalResult;
use crate::storage::KeyValueStore;
use crate::types::{TradeImage, TradeRecord};

pub const DEFAULT_NAMESPACE: &str = "tradewzrd_trades";
pub const CHUNK_SIZE: usize = 50;
pub const IMAGE_KEY_PREFIX: &str = "trade_image_";

/// Storage key of an individually stored image
pub fn image_key(image_id: &str) -> String {
    format!("{}{}", IMAGE_KEY_PREFIX, image_id)
}

/// Split `items` into consecutive groups of at most `size`, keeping order
pub fn partition<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Outcome of a save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    pub group_count: usize,
    pub slots_written: usize,
    pub failed_slots: Vec<usize>,
    pub stale_removed: usize,
    pub count_written: bool,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed_slots.is_empty() && self.count_written
    }
}

#[derive(Clone)]
pub struct ChunkedStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    chunk_size: usize,
    codec: ImageCodec,
}

impl ChunkedStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            chunk_size: CHUNK_SIZE,
            codec: ImageCodec::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_codec(mut self, codec: ImageCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn slot_key(&self, index: usize) -> String {
        format!("{}_{}", self.namespace, index)
    }

    pub fn count_key(&self) -> String {
        format!("{}_count", self.namespace)
    }

    /// Number of groups written by the last save.
    ///
    /// `None` when the count is absent or unparseable.
    pub fn stored_count(&self) -> JournalResult<Option<usize>> {
        let key = self.count_key();
        let raw = self.store.get(&key)?;
        Ok(raw.and_then(|s| match s.trim().parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!("Ignoring unparseable slot count '{}' under {}", s, key);
                None
            }
        }))
    }

    /// Persist `records` across slots, then drop slots left over from a
    /// larger previous save.
    pub fn save(&self, records: &[TradeRecord]) -> SaveReport {
        let previous_count = match self.stored_count() {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                warn!("Could not read previous slot count: {}", e);
                0
            }
        };

        let groups = partition(records, self.chunk_size);
        let mut report = SaveReport {
            group_count: groups.len(),
            ..SaveReport::default()
        };

        for (index, group) in groups.iter().enumerate() {
            match self.write_slot(index, group) {
                Ok(()) => report.slots_written += 1,
                Err(e) => {
                    warn!("Failed to persist slot {} ({} trades): {}", index, group.len(), e);
                    report.failed_slots.push(index);
                }
            }
        }

        match self.store.set(&self.count_key(), &groups.len().to_string()) {
            Ok(()) => report.count_written = true,
            Err(e) => warn!("Failed to persist slot count: {}", e),
        }

        for index in groups.len()..previous_count {
            match self.store.remove(&self.slot_key(index)) {
                Ok(()) => report.stale_removed += 1,
                Err(e) => warn!("Failed to remove stale slot {}: {}", index, e),
            }
        }

        info!(
            "Saved {} trades in {} slots ({} failed, {} stale removed)",
            records.len(),
            report.group_count,
            report.failed_slots.len(),
            report.stale_removed
        );
        report
    }

    fn write_slot(&self, index: usize, group: &[TradeRecord]) -> JournalResult<()> {
        let compressed: Vec<TradeRecord> = group
            .iter()
            .map(|trade| TradeRecord {
                images: trade.images.iter().map(|img| self.codec.compress_image(img)).collect(),
                ..trade.clone()
            })
            .collect();

        let payload = serde_json::to_string(&compressed)?;
        self.store.set(&self.slot_key(index), &payload)?;
        debug!("Wrote slot {} ({} trades, {} bytes)", index, group.len(), payload.len());
        Ok(())
    }

    /// Reconstruct the collection, or return `seed` when nothing is stored
    pub fn load(&self, seed: &[TradeRecord]) -> Vec<TradeRecord> {
        let count = match self.stored_count() {
            Ok(Some(count)) if count > 0 => count,
            Ok(_) => {
                debug!("No persisted trades under '{}', using seed data", self.namespace);
                return seed.to_vec();
            }
            Err(e) => {
                warn!("Failed to read slot count, using seed data: {}", e);
                return seed.to_vec();
            }
        };

        let mut trades = Vec::new();
        for index in 0..count {
            let key = self.slot_key(index);
            match self.store.get(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<Vec<TradeRecord>>(&raw) {
                    Ok(group) => trades.extend(group),
                    Err(e) => warn!("Skipping corrupt slot {}: {}", key, e),
                },
                Ok(None) => warn!("Skipping missing slot {}", key),
                Err(e) => warn!("Skipping unreadable slot {}: {}", key, e),
            }
        }

        info!("Loaded {} trades from {} slots", trades.len(), count);
        trades
    }

    /// Remove every slot, the count and the given image keys.
    ///
    /// Returns the number of keys removed.
    pub fn clear<'a, I>(&self, image_ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let count = self.stored_count().ok().flatten().unwrap_or(0);
        let mut keys: Vec<String> = (0..count).map(|i| self.slot_key(i)).collect();
        keys.push(self.count_key());
        keys.extend(image_ids.into_iter().map(image_key));

        let mut removed = 0;
        for key in &keys {
            match self.store.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", key, e),
            }
        }
        info!("Cleared {} keys under '{}'", removed, self.namespace);
        removed
    }

    pub fn put_image(&self, image: &TradeImage) -> JournalResult<()> {
        self.store.set(&image_key(&image.id), &image.encoded_data)
    }

    pub fn get_image(&self, image_id: &str) -> JournalResult<Option<String>> {
        self.store.get(&image_key(image_id))
    }

    pub fn remove_image(&self, image_id: &str) -> JournalResult<()> {
        self.store.remove(&image_key(image_id))
    }
}
