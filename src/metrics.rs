//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Metrics snapshot of a pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{BoxError, CorePool, NoopValidator, Pool, PoolConfig};
/// use std::sync::Arc;
///
/// let pool = CorePool::new(
///     PoolConfig::default(),
///     Arc::new(|| Ok::<_, BoxError>(String::from("conn"))),
///     Arc::new(NoopValidator),
/// ).unwrap();
///
/// let entry = pool.borrow().unwrap().unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_borrowed, 1);
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.active_entries, 1);
/// pool.return_entry(Some(entry)).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Successful borrows
    pub total_borrowed: u64,

    /// Returns handed to the pool
    pub total_returned: u64,

    /// Entries created by the pool's factory
    pub total_created: u64,

    /// Failed creation attempts
    pub creation_failures: u64,

    /// Borrows that gave up at their deadline
    pub borrow_timeouts: u64,

    /// Borrows that found no idle entry and were not allowed to create one
    pub pool_empty_events: u64,

    /// Entries rejected by on-demand or background validation
    pub validation_failures: u64,

    /// Entries invalidated for exceeding their maximum age
    pub expired_entries: u64,

    /// Entries currently borrowed
    pub active_entries: usize,

    /// Entries currently idle
    pub idle_entries: usize,

    /// Ratio of borrowed entries to the admission limit (0.0 to 1.0)
    pub utilization: f64,

    /// Admission limit
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_borrowed".to_string(), self.total_borrowed.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("creation_failures".to_string(), self.creation_failures.to_string());
        metrics.insert("borrow_timeouts".to_string(), self.borrow_timeouts.to_string());
        metrics.insert("pool_empty_events".to_string(), self.pool_empty_events.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert("expired_entries".to_string(), self.expired_entries.to_string());
        metrics.insert("active_entries".to_string(), self.active_entries.to_string());
        metrics.insert("idle_entries".to_string(), self.idle_entries.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&PoolMetrics::default(), "db", Some(&tags));
    /// assert!(output.contains("resourcepool_entries_active"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            (
                "resourcepool_entries_active",
                "Currently borrowed entries",
                metrics.active_entries.to_string(),
            ),
            (
                "resourcepool_entries_idle",
                "Currently idle entries",
                metrics.idle_entries.to_string(),
            ),
            (
                "resourcepool_utilization",
                "Pool utilization ratio",
                format!("{:.2}", metrics.utilization),
            ),
        ];
        for (name, help, value) in gauges {
            Self::push_metric(&mut output, name, help, "gauge", &labels, &value);
        }

        let counters = [
            ("resourcepool_borrowed_total", "Total successful borrows", metrics.total_borrowed),
            ("resourcepool_returned_total", "Total returns", metrics.total_returned),
            ("resourcepool_created_total", "Total entries created", metrics.total_created),
            (
                "resourcepool_creation_failures_total",
                "Failed entry creations",
                metrics.creation_failures,
            ),
            (
                "resourcepool_borrow_timeouts_total",
                "Borrows that timed out",
                metrics.borrow_timeouts,
            ),
            ("resourcepool_events_empty_total", "Pool empty events", metrics.pool_empty_events),
            (
                "resourcepool_validation_failures_total",
                "Validation failures",
                metrics.validation_failures,
            ),
            ("resourcepool_expired_total", "Entries expired by age", metrics.expired_entries),
        ];
        for (name, help, value) in counters {
            Self::push_metric(&mut output, name, help, "counter", &labels, &value.to_string());
        }

        output
    }

    fn push_metric(
        output: &mut String,
        name: &str,
        help: &str,
        kind: &str,
        labels: &str,
        value: &str,
    ) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics counters
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_borrowed: AtomicU64,
    pub total_returned: AtomicU64,
    pub total_created: AtomicU64,
    pub creation_failures: AtomicU64,
    pub borrow_timeouts: AtomicU64,
    pub pool_empty_events: AtomicU64,
    pub validation_failures: AtomicU64,
    pub expired_entries: AtomicU64,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add this tracker's validation counters to a snapshot taken elsewhere
    pub fn add_validation_counts(&self, metrics: &mut PoolMetrics) {
        metrics.validation_failures += self.validation_failures.load(Ordering::Relaxed);
        metrics.expired_entries += self.expired_entries.load(Ordering::Relaxed);
    }

    pub fn get_metrics(&self, active: usize, idle: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_borrowed: self.total_borrowed.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            pool_empty_events: self.pool_empty_events.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            expired_entries: self.expired_entries.load(Ordering::Relaxed),
            active_entries: active,
            idle_entries: idle,
            utilization,
            max_capacity: capacity,
        }
    }
}
