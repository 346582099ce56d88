//! Trade Journal
//!
//! Persistence layer for a personal trading journal: trade records with
//! image attachments are split into fixed-size groups and stored under
//! numbered keys of a key-value store, with CSV interchange, JSON backups,
//! performance statistics and position sizing on top.

pub mod codec;
pub mod config;
pub mod csv_io;
pub mod error;
pub mod journal;
pub mod market_data;
pub mod persistence;
pub mod risk;
pub mod seed;
pub mod stats;
pub mod storage;
pub mod types;

pub use config::JournalConfig;
pub use error::{JournalError, JournalResult};
pub use journal::{ExportSnapshot, TradeStore};
pub use persistence::{ChunkedStore, SaveReport};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::*;
