//! Pipeline configuration.

use std::time::Duration;
use tracing::warn;

/// Default number of events that triggers an immediate flush.
pub const DEFAULT_BATCH_SIZE: usize = 3000;

/// Default interval between timer-driven flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default maximum entry count per durable store.
pub const DEFAULT_STORE_CAPACITY: usize = 10_000;

/// Smallest accepted flush interval; anything lower falls back to the default.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1_000);

/// Configuration for batching and persistence behavior.
///
/// Invalid values never fail construction: [`PipelineConfig::sanitized`]
/// replaces them with the documented defaults and logs the override.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum events buffered in memory before an immediate flush.
    pub batch_size: usize,
    /// How often the periodic timer flushes a non-empty buffer.
    pub flush_interval: Duration,
    /// Maximum entry count for each durable store.
    pub store_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            store_capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Return a copy with out-of-bounds values replaced by defaults.
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();

        if config.batch_size == 0 {
            warn!(
                batch_size = config.batch_size,
                fallback = DEFAULT_BATCH_SIZE,
                "Invalid batch size, using default"
            );
            config.batch_size = DEFAULT_BATCH_SIZE;
        }

        if config.flush_interval < MIN_FLUSH_INTERVAL {
            warn!(
                flush_interval_ms = config.flush_interval.as_millis() as u64,
                fallback_ms = DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
                "Flush interval below minimum, using default"
            );
            config.flush_interval = DEFAULT_FLUSH_INTERVAL;
        }

        if config.store_capacity == 0 {
            warn!(
                store_capacity = config.store_capacity,
                fallback = DEFAULT_STORE_CAPACITY,
                "Invalid store capacity, using default"
            );
            config.store_capacity = DEFAULT_STORE_CAPACITY;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 3000);
        assert_eq!(config.flush_interval, Duration::from_millis(30_000));
        assert_eq!(config.store_capacity, 10_000);
    }

    #[test]
    fn sanitized_keeps_valid_values() {
        let config = PipelineConfig {
            batch_size: 5,
            flush_interval: Duration::from_secs(2),
            store_capacity: 42,
        }
        .sanitized();

        assert_eq!(config.batch_size, 5);
        assert_eq!(config.flush_interval, Duration::from_secs(2));
        assert_eq!(config.store_capacity, 42);
    }

    #[test]
    fn sanitized_replaces_zero_batch_size() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        }
        .sanitized();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn sanitized_replaces_tiny_flush_interval() {
        let config = PipelineConfig {
            flush_interval: Duration::from_millis(10),
            ..PipelineConfig::default()
        }
        .sanitized();
        assert_eq!(config.flush_interval, DEFAULT_FLUSH_INTERVAL);
    }

    #[test]
    fn sanitized_accepts_minimum_flush_interval() {
        let config = PipelineConfig {
            flush_interval: MIN_FLUSH_INTERVAL,
            ..PipelineConfig::default()
        }
        .sanitized();
        assert_eq!(config.flush_interval, MIN_FLUSH_INTERVAL);
    }

    #[test]
    fn sanitized_replaces_zero_store_capacity() {
        let config = PipelineConfig {
            store_capacity: 0,
            ..PipelineConfig::default()
        }
        .sanitized();
        assert_eq!(config.store_capacity, DEFAULT_STORE_CAPACITY);
    }
}
