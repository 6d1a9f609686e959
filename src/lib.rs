//! # caskdb
//!
//! An embedded Bitcask-style append-only key-value storage engine.
//!
//! ## Features
//!
//! - **Append-only log**: every write appends a CRC-checked record
//! - **In-memory index**: point reads cost one index lookup plus one disk read
//! - **Pluggable index backends**: ordered tree, radix tree, or a persistent
//!   B+-tree that skips replay at startup
//! - **Atomic batches**: staged writes commit under one sequence number
//! - **Merge compaction**: rewrites live records and emits a hint file for
//!   fast reindexing
//! - **Single-writer safety**: a directory lock keeps engines exclusive
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bytes::Bytes;
//! use caskdb::{Engine, Options};
//!
//! let engine = Engine::open(Options::new("/tmp/caskdb-demo"))?;
//!
//! engine.put(Bytes::from("hello"), Bytes::from("world"))?;
//! let value = engine.get(b"hello")?;
//! engine.delete(Bytes::from("hello"))?;
//!
//! // Atomic batch
//! let batch = engine.new_write_batch(Default::default())?;
//! batch.put(Bytes::from("k1"), Bytes::from("v1"))?;
//! batch.put(Bytes::from("k2"), Bytes::from("v2"))?;
//! batch.commit()?;
//!
//! engine.close()?;
//! ```

// Public modules
pub mod error;
pub mod options;

// Internal modules
mod batch;
mod data_file;
mod db;
mod index;
mod io;
mod iterator;
mod merge;
mod types;
mod util;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};

// Engine
pub use db::{Engine, Stat};

// Batches and iteration
pub use batch::WriteBatch;
pub use iterator::EngineIterator;
