use std::time::Duration;

use crate::{
    error::{Error, Result},
    ring::DEFAULT_MAX_READ_HANDLES,
};

/// Per-connection buffer sizes and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceConfig {
    /// Ring buffer capacity in bytes. Also bounds the largest message that can be received.
    pub ring_capacity: usize,
    /// Read cursors available on the ring buffer. The blocking receiver and
    /// the asynchronous task take one each.
    pub max_read_handles: usize,
    /// Concurrent asynchronous subscribers.
    pub max_subscribers: usize,
    /// How long a fill waits for the first byte.
    pub fill_min_wait: Duration,
    /// Upper bound on a single fill.
    pub fill_max_wait: Duration,
    /// Sleep between polls of a blocking receive that found nothing.
    pub poll_interval: Duration,
    /// Pause between asynchronous task passes, doubled when a pass was idle.
    pub async_yield: Duration,
    /// Bytes requested from the transport per read.
    pub read_chunk: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 2048,
            max_read_handles: DEFAULT_MAX_READ_HANDLES,
            max_subscribers: 16,
            fill_min_wait: Duration::ZERO,
            fill_max_wait: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            async_yield: Duration::from_millis(10),
            read_chunk: 256,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(Error::InvalidParameter("ring_capacity must be non-zero"));
        }
        if self.max_read_handles == 0 {
            return Err(Error::InvalidParameter("max_read_handles must be non-zero"));
        }
        if self.read_chunk == 0 {
            return Err(Error::InvalidParameter("read_chunk must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = DeviceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ring_capacity, 2048);
        assert_eq!(config.max_read_handles, 3);
    }

    #[test]
    fn rejects_zero_sizes() {
        for config in [
            DeviceConfig {
                ring_capacity: 0,
                ..Default::default()
            },
            DeviceConfig {
                max_read_handles: 0,
                ..Default::default()
            },
            DeviceConfig {
                read_chunk: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidParameter(_))
            ));
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_config_keeps_defaults() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{"ring_capacity": 4096}"#).unwrap();
        assert_eq!(config.ring_capacity, 4096);
        assert_eq!(config.max_subscribers, 16);
    }
}
