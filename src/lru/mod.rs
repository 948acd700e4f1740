//! Residency and recency tracking for cached artifacts.

mod index;

pub use index::{LruError, LruIndex};
