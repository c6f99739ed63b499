//! Health monitoring for resource pools

/// Health status of a pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::HealthStatus;
///
/// let health = HealthStatus::new(3, 1, 4);
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_entries, 3);
///
/// let saturated = HealthStatus::new(0, 4, 4);
/// assert!(!saturated.is_healthy());
/// assert_eq!(saturated.warning_count, 2);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle entries count
    pub idle_entries: usize,

    /// Borrowed entries count
    pub active_entries: usize,

    /// Admission limit
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(idle: usize, active: usize, capacity: usize) -> Self {
        let utilization = if capacity > 0 {
            active as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        // Check for high utilization
        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if idle == 0 && capacity > 0 {
            warnings.push("No idle entries".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_entries: idle,
            active_entries: active,
            total_capacity: capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
