//! Pool statistics and metrics export

#[cfg(feature = "metrics")]
use std::collections::HashMap;
use std::time::Duration;

/// A consistent point-in-time snapshot of pool occupancy and scheduling
/// state.
///
/// # Examples
///
/// ```
/// use polystore::adapters::Memory;
/// use polystore::{PoolConfig, PoolManager};
///
/// # fn main() -> polystore::Result<()> {
/// let manager = PoolManager::new(Memory::new(), PoolConfig::new().with_min(2))?;
///
/// let stats = manager.stats();
/// assert_eq!(stats.stores, 2);
/// assert_eq!(stats.available, 2);
/// assert_eq!(stats.waiting, 0);
/// # manager.stop();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolStats {
    /// Live stores, checked out plus idle.
    pub stores: usize,

    /// Idle stores ready for check-out.
    pub available: usize,

    /// Check-out requests currently queued for a store.
    pub waiting: usize,

    /// How long the oldest queued request has been waiting, if any.
    pub longest_wait: Option<Duration>,

    /// Time since the pool last had scheduling work to do.
    pub idle_time: Duration,
}

impl PoolStats {
    /// Stores currently lent out to callers.
    pub fn checked_out(&self) -> usize {
        self.stores - self.available
    }
}

/// Renders [`PoolStats`] in Prometheus exposition format.
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export a snapshot in Prometheus exposition format.
    ///
    /// # Examples
    ///
    /// ```
    /// use polystore::adapters::Memory;
    /// use polystore::{MetricsExporter, PoolConfig, PoolManager};
    ///
    /// # fn main() -> polystore::Result<()> {
    /// let manager = PoolManager::new(Memory::new(), PoolConfig::new())?;
    ///
    /// let output = MetricsExporter::export_prometheus(&manager.stats(), "cache", None);
    /// assert!(output.contains("polystore_pool_stores"));
    /// assert!(output.contains("pool=\"cache\""));
    /// # manager.stop();
    /// # Ok(())
    /// # }
    /// ```
    pub fn export_prometheus(
        stats: &PoolStats,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        output.push_str("# HELP polystore_pool_stores Live stores, checked out plus idle\n");
        output.push_str("# TYPE polystore_pool_stores gauge\n");
        output.push_str(&format!("polystore_pool_stores{{{}}} {}\n", labels, stats.stores));

        output.push_str("# HELP polystore_pool_available Idle stores ready for check-out\n");
        output.push_str("# TYPE polystore_pool_available gauge\n");
        output.push_str(&format!(
            "polystore_pool_available{{{}}} {}\n",
            labels, stats.available
        ));

        output.push_str("# HELP polystore_pool_waiting Queued check-out requests\n");
        output.push_str("# TYPE polystore_pool_waiting gauge\n");
        output.push_str(&format!("polystore_pool_waiting{{{}}} {}\n", labels, stats.waiting));

        output.push_str("# HELP polystore_pool_longest_wait_seconds Wait of the oldest queued request\n");
        output.push_str("# TYPE polystore_pool_longest_wait_seconds gauge\n");
        output.push_str(&format!(
            "polystore_pool_longest_wait_seconds{{{}}} {:.3}\n",
            labels,
            stats.longest_wait.unwrap_or_default().as_secs_f64()
        ));

        output.push_str("# HELP polystore_pool_idle_seconds Time since the pool last had work\n");
        output.push_str("# TYPE polystore_pool_idle_seconds gauge\n");
        output.push_str(&format!(
            "polystore_pool_idle_seconds{{{}}} {:.3}\n",
            labels,
            stats.idle_time.as_secs_f64()
        ));

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}
