//! Tricache - tiered read-through cache engine for immutable artifacts.
//!
//! This library coordinates a local byte substrate that mirrors immutable
//! binary artifacts ("triplets") held in a remote object store. Callers ask
//! for an artifact to be admitted; a background worker downloads the bytes,
//! writes them to the substrate, and seals a metadata record. When the
//! substrate fills up, a second worker evicts the least-recently-used
//! artifact and reclaims its bytes after a grace window.
//!
//! # High-Level API
//!
//! The [`manager`] module provides the facade most embedders need:
//!
//! ```ignore
//! use std::sync::Arc;
//! use tricache::config::CacheConfig;
//! use tricache::holder::DiskHolder;
//! use tricache::manager::CacheManager;
//! use tricache::metadata::MemoryStore;
//! use tricache::source::AnySource;
//!
//! let config = CacheConfig::default();
//! let holder = Arc::new(DiskHolder::new(cache_dir, 20_000_000_000)?);
//! let store = Arc::new(MemoryStore::new());
//! let source = AnySource::from_config(&config)?;
//!
//! let manager = CacheManager::new(source, holder, store, config);
//! manager.enqueue_write("fid-a", "https://oss.example.com/fid-a");
//! ```

pub mod config;
pub mod holder;
pub mod logging;
pub mod lru;
pub mod manager;
pub mod metadata;
pub mod source;

/// Version of the tricache library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
