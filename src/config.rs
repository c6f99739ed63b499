//! Pool and validation configuration

use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sizing and background top-up settings for a [`CorePool`](crate::CorePool)
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_max_active_entries(16)
///     .with_max_idle_entries(8)
///     .with_min_idle_entries(2)
///     .with_max_wait_on_borrow(Duration::from_secs(5));
///
/// assert_eq!(config.max_active_entries, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Maximum number of entries borrowed at the same time
    pub max_active_entries: usize,

    /// Capacity of the idle queue; surplus returned entries are disposed
    pub max_idle_entries: usize,

    /// Idle count the ensure loop tries to keep available
    pub min_idle_entries: usize,

    /// Default deadline used by [`Pool::borrow`](crate::Pool::borrow)
    pub max_wait_on_borrow: Duration,

    /// Worker threads creating entries for the ensure loop
    pub ensure_threads: usize,

    /// Delay between two ensure runs
    pub ensure_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active_entries: 8,
            max_idle_entries: 8,
            min_idle_entries: 0,
            max_wait_on_borrow: Duration::from_secs(30),
            ensure_threads: 1,
            ensure_interval: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of concurrently borrowed entries
    pub fn with_max_active_entries(mut self, count: usize) -> Self {
        self.max_active_entries = count;
        self
    }

    /// Set the idle queue capacity
    pub fn with_max_idle_entries(mut self, count: usize) -> Self {
        self.max_idle_entries = count;
        self
    }

    /// Set the idle count maintained by the ensure loop
    pub fn with_min_idle_entries(mut self, count: usize) -> Self {
        self.min_idle_entries = count;
        self
    }

    /// Set the default borrow deadline
    pub fn with_max_wait_on_borrow(mut self, wait: Duration) -> Self {
        self.max_wait_on_borrow = wait;
        self
    }

    /// Set the ensure loop thread count and interval
    pub fn with_ensure(mut self, threads: usize, interval: Duration) -> Self {
        self.ensure_threads = threads;
        self.ensure_interval = interval;
        self
    }

    /// Check the configuration for values the pool cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] describing the first offending field.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_active_entries == 0 {
            return Err(PoolError::InvalidConfig(
                "max_active_entries must be greater than 0".into(),
            ));
        }
        if self.max_idle_entries == 0 {
            return Err(PoolError::InvalidConfig(
                "max_idle_entries must be greater than 0".into(),
            ));
        }
        if self.min_idle_entries > self.max_idle_entries {
            return Err(PoolError::InvalidConfig(format!(
                "min_idle_entries ({}) must not exceed max_idle_entries ({})",
                self.min_idle_entries, self.max_idle_entries
            )));
        }
        if self.ensure_threads == 0 {
            return Err(PoolError::InvalidConfig(
                "ensure_threads must be greater than 0".into(),
            ));
        }
        if self.ensure_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "ensure_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Validation policy applied by a [`ValidatingPool`](crate::ValidatingPool)
///
/// # Examples
///
/// ```
/// use esox_resourcepool::ValidationConfig;
/// use std::time::Duration;
///
/// let config = ValidationConfig::new()
///     .with_test_on_borrow(true)
///     .with_max_age(Duration::from_secs(600))
///     .with_background_test(2, Duration::from_secs(1), Duration::from_secs(30));
///
/// assert!(config.test_in_background);
/// assert_eq!(config.test_threads, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ValidationConfig {
    /// Validate entries before handing them to a borrower
    pub test_on_borrow: bool,

    /// Validate entries before putting them back into the idle queue
    pub test_on_return: bool,

    /// Periodically sweep and validate the idle entries
    pub test_in_background: bool,

    /// Worker threads used by the sweep loop
    pub test_threads: usize,

    /// Delay before the first sweep
    pub test_initial_delay: Duration,

    /// Delay between two sweeps
    pub test_interval: Duration,

    /// Entries older than this are invalidated unconditionally
    pub max_age: Option<Duration>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            test_on_borrow: false,
            test_on_return: false,
            test_in_background: false,
            test_threads: 1,
            test_initial_delay: Duration::from_secs(10),
            test_interval: Duration::from_secs(30),
            max_age: None,
        }
    }
}

impl ValidationConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    /// Enable the background sweep
    pub fn with_background_test(
        mut self,
        threads: usize,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        self.test_in_background = true;
        self.test_threads = threads;
        self.test_initial_delay = initial_delay;
        self.test_interval = interval;
        self
    }

    /// Set the maximum entry age
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Check the configuration for values the pipeline cannot work with
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] describing the first offending field.
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_age.is_some_and(|age| age.is_zero()) {
            return Err(PoolError::InvalidConfig(
                "max_age must be greater than zero".into(),
            ));
        }
        if self.test_in_background {
            if self.test_threads == 0 {
                return Err(PoolError::InvalidConfig(
                    "test_threads must be greater than 0".into(),
                ));
            }
            if self.test_interval.is_zero() {
                return Err(PoolError::InvalidConfig(
                    "test_interval must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(ValidationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = PoolConfig::new().with_max_active_entries(0);
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));

        let config = PoolConfig::new().with_max_idle_entries(0);
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_min_idle_above_max_idle_rejected() {
        let config = PoolConfig::new()
            .with_max_idle_entries(2)
            .with_min_idle_entries(3);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_idle_entries (3)"));
    }

    #[test]
    fn test_zero_max_age_rejected() {
        let config = ValidationConfig::new().with_max_age(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_background_threads_checked_only_when_enabled() {
        let mut config = ValidationConfig::new();
        config.test_threads = 0;
        assert!(config.validate().is_ok());

        config.test_in_background = true;
        assert!(config.validate().is_err());
    }
}
