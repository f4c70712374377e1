//! Worker configuration.

use atlas::{Error, Result};
use atlas_core::{ProgressScheduler, MESSAGE_INTERVAL};
use std::time::Duration;

/// Default bound of the frame channel between worker thread and caller.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Minimum spacing between intermediate frames.
    pub message_interval: Duration,
    /// Frames buffered before the worker thread blocks.
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            message_interval: MESSAGE_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::Config(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fresh scheduler for a request starting now.
    pub fn scheduler(&self) -> ProgressScheduler {
        ProgressScheduler::new(self.message_interval)
    }
}
