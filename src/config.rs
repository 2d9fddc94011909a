//! Pool configuration options

use std::time::Duration;

/// Policy knobs for a store pool.
///
/// All fields are optional: the default pool keeps no warm stores, grows
/// without bound, never reclaims idle stores and blocks check-outs
/// indefinitely.
///
/// # Examples
///
/// ```
/// use polystore::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_min(2)
///     .with_max(10)
///     .with_ttl(Duration::from_secs(60))
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.min, 2);
/// assert_eq!(config.max, Some(10));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Minimum number of warm stores kept alive.
    pub min: usize,

    /// Maximum number of live stores; `None` means unbounded.
    pub max: Option<usize>,

    /// Idle lifetime after which a store above `min` is closed; `None`
    /// disables reclamation.
    pub ttl: Option<Duration>,

    /// Longest a check-out may block before failing; `None` blocks
    /// indefinitely.
    pub timeout: Option<Duration>,
}

impl PoolConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum warm pool size.
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Bound the number of live stores.
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Close stores left idle longer than `ttl`, down to the minimum.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Fail a check-out that has waited longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
