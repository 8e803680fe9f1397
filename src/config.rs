//! Construction-time configuration for the timer wheel.

use crate::error::ConfigError;
use std::time::Duration;

/// Configuration for a [`crate::TimerScheduler`].
///
/// The wheel is sized once at construction. A power-of-two bucket count keeps
/// the deadline-to-bucket mapping a mask operation; other sizes are accepted
/// and rounded up to the next power of two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time quantum by which the wheel advances.
    ///
    /// All deadlines are quantized up to a whole number of ticks. Must be
    /// strictly positive.
    ///
    /// Default: 10ms
    pub tick_duration: Duration,

    /// Number of buckets in the wheel.
    ///
    /// Must be at least 1. Rounded up to a power of two.
    ///
    /// Default: 512
    pub wheel_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(10),
            wheel_size: 512,
        }
    }
}

impl SchedulerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tick duration.
    #[must_use]
    pub fn tick_duration(mut self, duration: Duration) -> Self {
        self.tick_duration = duration;
        self
    }

    /// Sets the wheel size.
    #[must_use]
    pub fn wheel_size(mut self, size: u32) -> Self {
        self.wheel_size = size;
        self
    }

    /// Validates the configuration.
    ///
    /// Fails fast on a zero tick duration or a zero wheel size; these are
    /// caller errors, not retriable conditions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_duration.is_zero() {
            return Err(ConfigError::ZeroTickDuration(self.tick_duration));
        }
        if self.wheel_size == 0 {
            return Err(ConfigError::ZeroWheelSize);
        }
        Ok(())
    }

    /// Returns the bucket count actually used: `wheel_size` rounded up to the
    /// next power of two.
    #[must_use]
    pub fn normalized_wheel_size(&self) -> u64 {
        u64::from(self.wheel_size).next_power_of_two()
    }

    /// Returns the tick duration in whole nanoseconds.
    #[must_use]
    pub fn tick_nanos(&self) -> u64 {
        self.tick_duration.as_nanos().min(u128::from(u64::MAX)) as u64
    }
}
