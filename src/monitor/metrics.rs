//! Aggregate metrics over one refresh.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{ContainerRecord, ContainerStatsSample, StateBucket};

/// Percentage at which a resource counts as under pressure.
const WARNING_PERCENT: f64 = 70.0;

/// Percentage at which a resource counts as exhausted.
const CRITICAL_PERCENT: f64 = 90.0;

/// Overall health of the monitored host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Nothing needs attention.
    #[default]
    Healthy,
    /// Resources are under pressure or a container is failing.
    Warning,
    /// Resources are nearly exhausted.
    Critical,
}

impl HealthStatus {
    /// The lowercase name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    fn from_percent(percent: f64) -> Self {
        if percent >= CRITICAL_PERCENT {
            Self::Critical
        } else if percent >= WARNING_PERCENT {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// Totals across every container seen in one refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Sum of per-container CPU, where 100 is one busy core.
    pub total_cpu_percent: f64,
    /// Sum of per-container memory use.
    pub total_memory_used_bytes: u64,
    /// Sum of per-container memory limits.
    pub total_memory_limit_bytes: u64,
    /// Containers currently running.
    pub running_count: usize,
    /// Containers that are not running or paused.
    pub stopped_count: usize,
    /// Paused containers.
    pub paused_count: usize,
    /// Every container listed.
    pub total_count: usize,
    /// Overall classification.
    pub health: HealthStatus,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Memory use as a share of the summed limits; zero without limits.
    #[must_use]
    pub fn memory_percent(&self) -> f64 {
        crate::engine::api::memory_percent(
            self.total_memory_used_bytes,
            self.total_memory_limit_bytes,
        )
    }
}

/// Build a snapshot from a container listing and the samples taken for it.
///
/// CPU is judged against the host's capacity: the summed percentage is
/// divided by the largest core count any sample reported.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "CPU totals are percentages; core counts are tiny"
)]
pub fn aggregate<S>(
    containers: &[ContainerRecord],
    samples: &HashMap<String, ContainerStatsSample, S>,
    timestamp: DateTime<Utc>,
) -> MetricsSnapshot
where
    S: std::hash::BuildHasher,
{
    let mut snapshot = MetricsSnapshot {
        total_count: containers.len(),
        timestamp,
        ..MetricsSnapshot::default()
    };
    for container in containers {
        match container.state.bucket() {
            StateBucket::Running => snapshot.running_count += 1,
            StateBucket::Paused => snapshot.paused_count += 1,
            StateBucket::Stopped => snapshot.stopped_count += 1,
        }
    }

    let mut host_cpus = 1_u64;
    for sample in samples.values() {
        snapshot.total_cpu_percent += sample.cpu_percent;
        snapshot.total_memory_used_bytes = snapshot
            .total_memory_used_bytes
            .saturating_add(sample.mem_used_bytes);
        snapshot.total_memory_limit_bytes = snapshot
            .total_memory_limit_bytes
            .saturating_add(sample.mem_limit_bytes);
        host_cpus = host_cpus.max(sample.online_cpus);
    }

    let cpu_health = HealthStatus::from_percent(snapshot.total_cpu_percent / host_cpus as f64);
    let memory_health = HealthStatus::from_percent(snapshot.memory_percent());
    let container_health = if containers.iter().any(|c| c.state.is_unhealthy()) {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };
    snapshot.health = cpu_health.max(memory_health).max(container_health);
    snapshot
}
