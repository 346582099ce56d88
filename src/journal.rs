//! Trade store
//!
//! Owns the in-memory trade collection and exposes the journal's mutation
//! API. Every mutation updates memory synchronously and queues persistence
//! work for a background task, so callers never wait on (or fail because of)
//! storage. The task handles commands strictly in submission order and
//! collapses back-to-back saves into the latest snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::MAX_IMAGES_PER_TRADE;
use crate::error::{JournalError, JournalResult};
use crate::persistence::ChunkedStore;
use crate::stats::TradeStats;
use crate::types::{TradeImage, TradeRecord, TradeValidationError};

pub const EXPORT_VERSION: &str = "1.0";

/// Versioned backup of the whole journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSnapshot {
    #[serde(rename = "trades")]
    pub records: Vec<TradeRecord>,
    pub version: String,
    #[serde(rename = "exportDate")]
    pub exported_at: DateTime<Utc>,
}

enum Command {
    Save(Vec<TradeRecord>),
    PutImage(TradeImage),
    RemoveImages(Vec<String>),
    Clear(Vec<String>),
    Flush(oneshot::Sender<()>),
}

pub struct TradeStore {
    trades: Vec<TradeRecord>,
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
    max_images: usize,
}

impl TradeStore {
    /// Load the persisted collection (or `seed` when nothing is stored) and
    /// start the persistence task on the current Tokio runtime.
    pub async fn open(engine: ChunkedStore, seed: &[TradeRecord]) -> JournalResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| JournalError::Config(format!("trade store requires a tokio runtime: {}", e)))?;

        let loader = engine.clone();
        let seed = seed.to_vec();
        let trades = handle
            .spawn_blocking(move || loader.load(&seed))
            .await
            .map_err(|e| JournalError::read(engine.count_key(), e))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(run_worker(engine, rx));

        info!("Trade store opened with {} trades", trades.len());
        Ok(Self {
            trades,
            tx,
            worker,
            max_images: MAX_IMAGES_PER_TRADE,
        })
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn get(&self, id: &str) -> Option<&TradeRecord> {
        self.trades.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn stats(&self) -> TradeStats {
        TradeStats::from_trades(&self.trades)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.trades.iter().position(|t| t.id == id)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Persistence task has stopped; change kept in memory only");
        }
    }

    fn schedule_save(&self) {
        self.send(Command::Save(self.trades.clone()));
    }

    /// Most recent first. Relative order of trades sharing a date is not
    /// part of the contract.
    fn sort_by_date_desc(&mut self) {
        self.trades.sort_by(|a, b| b.date.cmp(&a.date));
    }

    fn prepare(mut record: TradeRecord) -> Result<TradeRecord, TradeValidationError> {
        record.normalize();
        record.validate()?;
        Ok(record)
    }

    pub fn add(&mut self, record: TradeRecord) -> JournalResult<()> {
        let record = Self::prepare(record)?;
        debug!("Adding trade {} ({} {})", record.id, record.direction, record.pair);
        self.trades.push(record);
        self.sort_by_date_desc();
        self.schedule_save();
        Ok(())
    }

    /// Replace the trade with the same id. Returns `false` when no trade
    /// matches.
    pub fn update(&mut self, record: TradeRecord) -> JournalResult<bool> {
        let Some(pos) = self.position(&record.id) else {
            debug!("Update ignored, no trade with id {}", record.id);
            return Ok(false);
        };
        let record = Self::prepare(record)?;

        let dropped: Vec<String> = self.trades[pos]
            .image_ids()
            .filter(|id| !record.images.iter().any(|img| img.id == *id))
            .map(str::to_string)
            .collect();
        if !dropped.is_empty() {
            self.send(Command::RemoveImages(dropped));
        }

        self.trades[pos] = record;
        self.schedule_save();
        Ok(true)
    }

    /// Remove a trade and every image it owns. Returns `false` when no trade
    /// matches.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };

        let trade = self.trades.remove(pos);
        let image_ids: Vec<String> = trade.image_ids().map(str::to_string).collect();
        if !image_ids.is_empty() {
            self.send(Command::RemoveImages(image_ids));
        }
        debug!("Deleted trade {}", id);
        self.schedule_save();
        true
    }

    /// Merge `records` into the journal; an incoming trade replaces an
    /// existing one with the same id. Invalid records are skipped.
    ///
    /// Returns the number of records merged.
    pub fn import(&mut self, records: Vec<TradeRecord>) -> usize {
        let mut merged = 0;
        for record in records {
            let record = match Self::prepare(record) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping invalid imported trade: {}", e);
                    continue;
                }
            };
            match self.position(&record.id) {
                Some(pos) => self.trades[pos] = record,
                None => self.trades.push(record),
            }
            merged += 1;
        }

        self.sort_by_date_desc();
        self.schedule_save();
        info!("Imported {} trades ({} total)", merged, self.trades.len());
        merged
    }

    /// Drop every trade and wipe all persisted slots and images
    pub fn clear(&mut self) {
        let image_ids: Vec<String> = self
            .trades
            .iter()
            .flat_map(|t| t.image_ids().map(str::to_string))
            .collect();
        self.send(Command::Clear(image_ids));
        self.trades.clear();
        info!("Trade journal cleared");
    }

    pub fn export(&self) -> ExportSnapshot {
        ExportSnapshot {
            records: self.trades.clone(),
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
        }
    }

    pub fn export_json(&self) -> JournalResult<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Merge the trades of a JSON backup produced by [`export_json`](Self::export_json)
    pub fn import_snapshot(&mut self, json: &str) -> JournalResult<usize> {
        let snapshot: ExportSnapshot =
            serde_json::from_str(json).map_err(|e| JournalError::ImportFormat(e.to_string()))?;
        if snapshot.version != EXPORT_VERSION {
            warn!("Importing backup version {} (expected {})", snapshot.version, EXPORT_VERSION);
        }
        Ok(self.import(snapshot.records))
    }

    /// Attach an image to a trade and store it under its own key.
    /// Returns `false` when no trade matches.
    pub fn attach_image(&mut self, trade_id: &str, image: TradeImage) -> JournalResult<bool> {
        let Some(pos) = self.position(trade_id) else {
            return Ok(false);
        };
        if self.trades[pos].images.len() >= self.max_images {
            return Err(TradeValidationError::TooManyImages(self.max_images).into());
        }

        self.send(Command::PutImage(image.clone()));
        self.trades[pos].images.push(image);
        self.schedule_save();
        Ok(true)
    }

    pub fn detach_image(&mut self, trade_id: &str, image_id: &str) -> bool {
        let Some(pos) = self.position(trade_id) else {
            return false;
        };
        let images = &mut self.trades[pos].images;
        let before = images.len();
        images.retain(|img| img.id != image_id);
        if images.len() == before {
            return false;
        }

        self.send(Command::RemoveImages(vec![image_id.to_string()]));
        self.schedule_save();
        true
    }

    /// Wait until every persistence command queued so far has run
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drain outstanding persistence work and stop the background task
    pub async fn close(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Err(e) = worker.await {
            error!("Persistence task ended abnormally: {}", e);
        }
    }
}

async fn run_blocking<T, F>(label: &str, f: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!("{} task failed: {}", label, e);
            None
        }
    }
}

async fn run_worker(engine: ChunkedStore, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: Option<Command> = None;

    loop {
        let command = match pending.take() {
            Some(command) => command,
            None => match rx.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Save(mut snapshot) => {
                while let Ok(next) = rx.try_recv() {
                    match next {
                        Command::Save(newer) => snapshot = newer,
                        other => {
                            pending = Some(other);
                            break;
                        }
                    }
                }

                let engine = engine.clone();
                if let Some(report) = run_blocking("Save", move || engine.save(&snapshot)).await {
                    if !report.is_complete() {
                        warn!(
                            "Partial save: slots {:?} failed, count written: {}",
                            report.failed_slots, report.count_written
                        );
                    }
                }
            }
            Command::PutImage(image) => {
                let engine = engine.clone();
                if let Some(Err(e)) = run_blocking("Image write", move || engine.put_image(&image)).await {
                    warn!("Failed to store image: {}", e);
                }
            }
            Command::RemoveImages(ids) => {
                let engine = engine.clone();
                run_blocking("Image removal", move || {
                    for id in &ids {
                        if let Err(e) = engine.remove_image(id) {
                            warn!("Failed to remove image {}: {}", id, e);
                        }
                    }
                })
                .await;
            }
            Command::Clear(image_ids) => {
                let engine = engine.clone();
                run_blocking("Clear", move || engine.clear(image_ids.iter().map(String::as_str))).await;
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Persistence task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::image_key;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::types::Direction;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn trade(id: &str, date: &str) -> TradeRecord {
        TradeRecord::new(
            "EUR/USD",
            Direction::Long,
            1.10,
            1000.0,
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        )
        .with_id(id)
    }

    async fn open(store: &Arc<MemoryStore>) -> TradeStore {
        TradeStore::open(ChunkedStore::new(store.clone()), &[]).await.unwrap()
    }

    fn image(id: &str) -> TradeImage {
        TradeImage {
            id: id.to_string(),
            encoded_data: "data:image/png;base64,AAAA".to_string(),
            name: format!("{}.png", id),
            mime_type: "image/png".to_string(),
            byte_size: 3,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_add_sorts_most_recent_first() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;

        journal.add(trade("a", "2024-01-01")).unwrap();
        journal.add(trade("b", "2024-03-01")).unwrap();
        journal.add(trade("c", "2024-02-01")).unwrap();

        let ids: Vec<&str> = journal.trades().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_trade() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;

        let mut bad = trade("x", "2024-01-01");
        bad.size = 0.0;
        assert!(matches!(journal.add(bad), Err(JournalError::Validation(_))));
        assert!(journal.is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_and_ignores_unknown() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("a", "2024-01-01")).unwrap();

        let edited = trade("a", "2024-01-01").closed_at(1.12, None);
        assert!(journal.update(edited).unwrap());
        assert!((journal.get("a").unwrap().pnl - 20.0).abs() < 1e-9);

        assert!(!journal.update(trade("missing", "2024-01-01")).unwrap());
        assert_eq!(journal.len(), 1);
    }

    #[tokio::test]
    async fn test_import_overwrites_matching_ids() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("1", "2024-01-01")).unwrap();

        let merged = journal.import(vec![
            trade("1", "2024-01-01").with_notes("revised"),
            trade("2", "2024-02-01"),
        ]);
        assert_eq!(merged, 2);
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.get("1").unwrap().notes, "revised");
        assert_eq!(journal.trades()[0].id, "2");
    }

    #[tokio::test]
    async fn test_delete_removes_owned_images() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("1", "2024-01-01")).unwrap();
        journal.attach_image("1", image("img-a")).unwrap();
        journal.attach_image("1", image("img-b")).unwrap();
        journal.flush().await;
        assert!(store.get(&image_key("img-a")).unwrap().is_some());

        assert!(journal.delete("1"));
        assert!(!journal.delete("1"));
        journal.flush().await;

        assert!(store.get(&image_key("img-a")).unwrap().is_none());
        assert!(store.get(&image_key("img-b")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_respects_image_limit() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await.with_max_images(1);
        journal.add(trade("1", "2024-01-01")).unwrap();

        assert!(journal.attach_image("1", image("first")).unwrap());
        assert!(journal.attach_image("1", image("second")).is_err());
        assert!(!journal.attach_image("nope", image("third")).unwrap());

        assert!(journal.detach_image("1", "first"));
        assert!(!journal.detach_image("1", "first"));
        journal.flush().await;
        assert!(store.get(&image_key("first")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_wipes_storage() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("1", "2024-01-01")).unwrap();
        journal.attach_image("1", image("img")).unwrap();
        journal.flush().await;
        assert!(!store.is_empty());

        journal.clear();
        journal.flush().await;
        assert!(journal.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_export_snapshot_roundtrip() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("1", "2024-01-01")).unwrap();

        let snapshot = journal.export();
        assert_eq!(snapshot.version, "1.0");
        assert_eq!(snapshot.records.len(), 1);

        let json = journal.export_json().unwrap();
        assert!(json.contains("\"exportDate\""));

        let other_store = Arc::new(MemoryStore::new());
        let mut restored = open(&other_store).await;
        assert_eq!(restored.import_snapshot(&json).unwrap(), 1);
        assert_eq!(restored.get("1").unwrap().pair, "EUR/USD");

        assert!(matches!(
            restored.import_snapshot("not json"),
            Err(JournalError::ImportFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_close_persists_pending_changes() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("1", "2024-01-01")).unwrap();
        journal.add(trade("2", "2024-01-02")).unwrap();
        journal.close().await;

        let reopened = open(&store).await;
        assert_eq!(reopened.len(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_noop_even_when_invalid() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;
        journal.add(trade("a", "2024-01-01")).unwrap();

        let mut invalid = trade("missing", "2024-01-01");
        invalid.size = 0.0;
        assert!(!journal.update(invalid).unwrap());

        let mut invalid_known = trade("a", "2024-01-01");
        invalid_known.size = 0.0;
        assert!(matches!(journal.update(invalid_known), Err(JournalError::Validation(_))));
        assert_eq!(journal.get("a").unwrap().size, 1000.0);
    }

    #[tokio::test]
    async fn test_add_accepts_prices_beyond_decimal_range() {
        let store = Arc::new(MemoryStore::new());
        let mut journal = open(&store).await;

        let huge = TradeRecord::new("SHIB/USD", Direction::Long, 1e15, 1e15, NaiveDate::default())
            .with_id("huge")
            .closed_at(2e15, None);
        journal.add(huge).unwrap();
        assert_eq!(journal.get("huge").unwrap().pnl, 1e30);
        assert_eq!(journal.stats().total_pnl, 1e30);
        journal.close().await;

        let reopened = open(&store).await;
        assert_eq!(reopened.get("huge").unwrap().pnl, 1e30);
    }

    #[tokio::test]
    async fn test_save_bursts_end_with_latest_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let engine = ChunkedStore::new(store.clone()).with_chunk_size(1);
        let mut journal = TradeStore::open(engine.clone(), &[]).await.unwrap();

        journal.add(trade("a", "2024-01-01")).unwrap();
        journal.add(trade("b", "2024-01-02")).unwrap();
        journal.add(trade("c", "2024-01-03")).unwrap();
        journal.attach_image("b", image("chart")).unwrap();
        journal.flush().await;
        assert_eq!(store.get(&engine.count_key()).unwrap().as_deref(), Some("3"));

        // Save, RemoveImages, then more saves with a shifting slot count
        assert!(journal.delete("a"));
        assert!(journal.detach_image("b", "chart"));
        journal.add(trade("d", "2024-01-04")).unwrap();
        assert!(journal.delete("c"));
        assert!(journal.delete("b"));
        journal.add(trade("e", "2024-01-05")).unwrap();
        journal.flush().await;

        assert_eq!(
            store.keys(),
            vec![
                "tradewzrd_trades_0".to_string(),
                "tradewzrd_trades_1".to_string(),
                "tradewzrd_trades_count".to_string(),
            ]
        );
        assert_eq!(store.get(&engine.count_key()).unwrap().as_deref(), Some("2"));

        let loaded: Vec<String> = engine.load(&[]).into_iter().map(|t| t.id).collect();
        assert_eq!(loaded, vec!["e", "d"]);
        journal.close().await;
    }
}
