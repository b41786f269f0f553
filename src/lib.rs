//! # StrataDB
//!
//! A persistent, embedded, ordered key-value storage engine built on a
//! **Log-Structured Merge-tree (LSM-tree)**. Designed for fast writes and
//! crash-safe operation from a single owning task.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                       Engine                           │
//! │  ┌────────────┐   ┌─────────────────────────────────┐  │
//! │  │  Memtable  │   │        SSTable levels           │  │
//! │  │  (skip     │   │  L0: newest flushes (overlap)   │  │
//! │  │   list)    │   │  L1: merger of L0               │  │
//! │  │  + WAL     │   │  L2: merger of L1   …           │  │
//! │  └─────┬──────┘   └───────────┬─────────────────────┘  │
//! │        │    flush             │                        │
//! │        └──────────►───────────┘                        │
//! │                                                        │
//! │  ┌──────────────────────────────────────────────────┐  │
//! │  │     Size-tiered compaction (after every flush)   │  │
//! │  └──────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | Orchestrator — open, read, write, scan, flush, stats |
//! | [`memtable`] | Skip-list in-memory write buffer |
//! | [`wal`] | Line-oriented write-ahead log for crash recovery |
//! | [`sstable`] | Immutable sorted on-disk tables with sparse index and bloom filter |
//! | [`compaction`] | Size-tiered level-wise merging |
//! | [`bloom`] | FNV-1a bloom filter embedded in every table |
//!
//! ## Key Features
//!
//! - **Write-ahead logging** — every mutation is durable in the WAL before
//!   it is acknowledged; recovery replays the log into a fresh memtable.
//! - **Positional recency** — the memtable is newer than any table, level 0
//!   is newer than level 1, and within a level position 0 is newest; reads
//!   need no per-record version metadata.
//! - **Tombstone deletes** — deletions write a sentinel value that shadows
//!   older entries until bottom-level compaction drops it physically.
//! - **Bloom-gated lookups** — each SSTable embeds a bloom filter so point
//!   reads skip tables that cannot contain the key.
//! - **Single-writer by construction** — mutations take `&mut self`; the
//!   borrow checker enforces the ownership model instead of locks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stratadb::{Engine, EngineConfig};
//!
//! let mut db = Engine::open("/tmp/my_db", EngineConfig::default())?;
//!
//! // Write
//! db.put("hello", "world")?;
//!
//! // Read
//! assert_eq!(db.get("hello")?.as_deref(), Some("world"));
//!
//! // Delete
//! db.delete("hello")?;
//! assert_eq!(db.get("hello")?, None);
//!
//! // Ordered range scan
//! db.put("a", "1")?;
//! db.put("b", "2")?;
//! let pairs = db.scan("a", "c")?;
//!
//! // Graceful shutdown
//! db.close()?;
//! # Ok::<(), stratadb::EngineError>(())
//! ```

pub mod bloom;
pub mod compaction;
pub mod engine;
pub mod memtable;
pub mod sstable;
pub mod wal;

pub use engine::{Engine, EngineConfig, EngineError, EngineInspect, EngineStats};
