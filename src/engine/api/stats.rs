//! Decoding of one-shot container statistics.

use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Memory statistic keys holding reclaimable page cache, by preference.
const CACHE_KEYS: [&str; 3] = ["cache", "inactive_file", "total_inactive_file"];

/// Resource usage of one container at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerStatsSample {
    /// Container the sample belongs to.
    pub container_id: String,
    /// When the sample was decoded.
    pub timestamp: DateTime<Utc>,
    /// CPU use where 100 is one fully busy core.
    pub cpu_percent: f64,
    /// Host CPU time counter at sampling.
    pub cpu_system_usage: u64,
    /// Container CPU time counter at sampling.
    pub cpu_container_usage: u64,
    /// CPUs available to the container.
    pub online_cpus: u64,
    /// Memory in use, excluding page cache.
    pub mem_used_bytes: u64,
    /// Memory limit.
    pub mem_limit_bytes: u64,
    /// `mem_used_bytes` as a share of the limit.
    pub mem_percent: f64,
    /// Page cache excluded from `mem_used_bytes`, when reported.
    pub mem_cache_bytes: Option<u64>,
    /// Bytes received across interfaces.
    pub net_rx_bytes: u64,
    /// Bytes sent across interfaces.
    pub net_tx_bytes: u64,
    /// Packets received across interfaces.
    pub net_rx_packets: u64,
    /// Packets sent across interfaces.
    pub net_tx_packets: u64,
    /// Bytes read across block devices.
    pub block_read_bytes: u64,
    /// Bytes written across block devices.
    pub block_write_bytes: u64,
}

/// CPU use from two counter readings.
///
/// `(container delta / system delta) * online_cpus * 100`, clamped to
/// `[0, 100 * online_cpus]`. Zero when the system counter did not advance.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "percentages are inherently floating point; counters far exceed f64 precision only after centuries of CPU time"
)]
pub fn cpu_percent(
    current_cpu: u64,
    previous_cpu: u64,
    current_system: u64,
    previous_system: u64,
    online_cpus: u64,
) -> f64 {
    let Some(system_delta) = current_system
        .checked_sub(previous_system)
        .filter(|delta| *delta > 0)
    else {
        return 0.0;
    };
    let cpu_delta = current_cpu.saturating_sub(previous_cpu);
    let cpus = online_cpus.max(1) as f64;
    let percent = (cpu_delta as f64 / system_delta as f64) * cpus * 100.0;
    percent.clamp(0.0, 100.0 * cpus)
}

/// Memory use as a percentage of the limit; zero without a limit.
#[must_use]
#[expect(
    clippy::float_arithmetic,
    clippy::cast_precision_loss,
    reason = "percentages are inherently floating point"
)]
pub fn memory_percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    used as f64 / limit as f64 * 100.0
}

/// Turn a raw stats payload into a sample.
#[must_use]
pub fn decode_stats(
    container_id: &str,
    raw: &ContainerStatsResponse,
    timestamp: DateTime<Utc>,
) -> ContainerStatsSample {
    let cpu = raw.cpu_stats.as_ref();
    let precpu = raw.precpu_stats.as_ref();
    let total_usage = |stats: Option<&bollard::models::ContainerCpuStats>| {
        stats
            .and_then(|s| s.cpu_usage.as_ref())
            .and_then(|usage| usage.total_usage)
            .unwrap_or(0)
    };
    let system_usage = |stats: Option<&bollard::models::ContainerCpuStats>| {
        stats.and_then(|s| s.system_cpu_usage).unwrap_or(0)
    };

    let cpu_container_usage = total_usage(cpu);
    let cpu_system_usage = system_usage(cpu);
    let online_cpus = cpu
        .and_then(|s| s.online_cpus)
        .map(u64::from)
        .filter(|count| *count > 0)
        .or_else(|| {
            cpu.and_then(|s| s.cpu_usage.as_ref())
                .and_then(|usage| usage.percpu_usage.as_ref())
                .and_then(|per_cpu| u64::try_from(per_cpu.len()).ok())
                .filter(|count| *count > 0)
        })
        .unwrap_or(1);

    let memory = raw.memory_stats.as_ref();
    let usage = memory.and_then(|m| m.usage).unwrap_or(0);
    let mem_limit_bytes = memory.and_then(|m| m.limit).unwrap_or(0);
    let mem_cache_bytes = memory.and_then(|m| m.stats.as_ref()).and_then(|stats| {
        CACHE_KEYS
            .iter()
            .find_map(|key| stats.get(*key).copied())
    });
    let mem_used_bytes = usage.saturating_sub(mem_cache_bytes.unwrap_or(0));

    let (net_rx_bytes, net_tx_bytes, net_rx_packets, net_tx_packets) = raw
        .networks
        .as_ref()
        .map_or((0, 0, 0, 0), |networks| {
            networks.values().fold((0_u64, 0_u64, 0_u64, 0_u64), |acc, iface| {
                (
                    acc.0.saturating_add(iface.rx_bytes.unwrap_or(0)),
                    acc.1.saturating_add(iface.tx_bytes.unwrap_or(0)),
                    acc.2.saturating_add(iface.rx_packets.unwrap_or(0)),
                    acc.3.saturating_add(iface.tx_packets.unwrap_or(0)),
                )
            })
        });

    let (block_read_bytes, block_write_bytes) = raw
        .blkio_stats
        .as_ref()
        .and_then(|blkio| blkio.io_service_bytes_recursive.as_ref())
        .map_or((0, 0), |entries| {
            entries.iter().fold((0_u64, 0_u64), |(read, write), entry| {
                let value = entry.value.unwrap_or(0);
                match entry.op.as_deref() {
                    Some(op) if op.eq_ignore_ascii_case("read") => (read.saturating_add(value), write),
                    Some(op) if op.eq_ignore_ascii_case("write") => (read, write.saturating_add(value)),
                    _ => (read, write),
                }
            })
        });

    ContainerStatsSample {
        container_id: container_id.to_owned(),
        timestamp,
        cpu_percent: cpu_percent(
            cpu_container_usage,
            total_usage(precpu),
            cpu_system_usage,
            system_usage(precpu),
            online_cpus,
        ),
        cpu_system_usage,
        cpu_container_usage,
        online_cpus,
        mem_used_bytes,
        mem_limit_bytes,
        mem_percent: memory_percent(mem_used_bytes, mem_limit_bytes),
        mem_cache_bytes,
        net_rx_bytes,
        net_tx_bytes,
        net_rx_packets,
        net_tx_packets,
        block_read_bytes,
        block_write_bytes,
    }
}
