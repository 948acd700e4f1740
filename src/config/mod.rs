//! Engine configuration.
//!
//! [`CacheConfig`] carries the knobs the cache manager and its collaborators
//! recognize. Defaults live in named constants so embedders can reference
//! them when building partial overrides.

use std::path::PathBuf;
use std::time::Duration;

/// Default number of admissions drained per worker tick.
pub const DEFAULT_BATCH_WRITE_MAX: usize = 16;

/// Default grace window between metadata deletion and physical purge.
pub const DEFAULT_PURGE_GRACE_MS: u64 = 500;

/// Default admission ceiling per artifact (64 MiB).
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 64 * 1024 * 1024;

/// Default cadence of both background workers.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 200;

/// Engine configuration.
///
/// All fields have working defaults; use the `with_*` builders to override
/// individual knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum admissions drained per write-worker tick. Bounds the
    /// per-batch download/write fan-out.
    pub batch_write_max: usize,
    /// Delay between deleting an evicted artifact's metadata and reclaiming
    /// its bytes. Protects readers that observed the entry just before
    /// eviction.
    pub purge_grace: Duration,
    /// Largest artifact admitted to the substrate, in bytes. Oversized
    /// artifacts are dropped at admission.
    pub max_object_size: u64,
    /// Fetch artifacts from the local filesystem instead of HTTP. Test mode.
    pub local_mode: bool,
    /// Cadence of the admission and purge workers.
    pub tick_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            batch_write_max: DEFAULT_BATCH_WRITE_MAX,
            purge_grace: Duration::from_millis(DEFAULT_PURGE_GRACE_MS),
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            local_mode: false,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }
}

impl CacheConfig {
    /// Set the per-tick admission batch bound.
    ///
    /// Values below 1 are clamped to 1; a zero-sized batch would stall the
    /// write pipeline.
    pub fn with_batch_write_max(mut self, max: usize) -> Self {
        self.batch_write_max = max.max(1);
        self
    }

    /// Set the purge grace window.
    pub fn with_purge_grace(mut self, grace: Duration) -> Self {
        self.purge_grace = grace;
        self
    }

    /// Set the admission ceiling in bytes.
    pub fn with_max_object_size(mut self, bytes: u64) -> Self {
        self.max_object_size = bytes;
        self
    }

    /// Select the filesystem source backend instead of HTTP.
    pub fn with_local_mode(mut self, local: bool) -> Self {
        self.local_mode = local;
        self
    }

    /// Set the background worker tick interval.
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval = tick;
        self
    }
}

/// Default substrate directory, under the platform cache directory.
pub fn default_substrate_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tricache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = CacheConfig::default();

        assert_eq!(config.batch_write_max, DEFAULT_BATCH_WRITE_MAX);
        assert_eq!(
            config.purge_grace,
            Duration::from_millis(DEFAULT_PURGE_GRACE_MS)
        );
        assert_eq!(config.max_object_size, DEFAULT_MAX_OBJECT_SIZE);
        assert!(!config.local_mode);
        assert_eq!(
            config.tick_interval,
            Duration::from_millis(DEFAULT_TICK_INTERVAL_MS)
        );
    }

    #[test]
    fn config_builder_overrides() {
        let config = CacheConfig::default()
            .with_batch_write_max(4)
            .with_purge_grace(Duration::from_millis(50))
            .with_max_object_size(1024)
            .with_local_mode(true)
            .with_tick_interval(Duration::from_millis(20));

        assert_eq!(config.batch_write_max, 4);
        assert_eq!(config.purge_grace, Duration::from_millis(50));
        assert_eq!(config.max_object_size, 1024);
        assert!(config.local_mode);
        assert_eq!(config.tick_interval, Duration::from_millis(20));
    }

    #[test]
    fn config_batch_bound_clamped_to_one() {
        let config = CacheConfig::default().with_batch_write_max(0);
        assert_eq!(config.batch_write_max, 1);
    }

    #[test]
    fn default_substrate_dir_ends_with_crate_name() {
        assert!(default_substrate_dir().ends_with("tricache"));
    }
}
