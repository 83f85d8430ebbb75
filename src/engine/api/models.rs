//! Container and daemon models decoded from the daemon's JSON payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state reported for a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Frozen by the cgroup freezer.
    Paused,
    /// Being restarted by its restart policy.
    Restarting,
    /// Stopped.
    Exited,
    /// Failed removal left it unusable.
    Dead,
    /// Being removed.
    Removing,
    /// A state this crate does not know.
    #[default]
    Unknown,
}

impl From<String> for ContainerState {
    fn from(value: String) -> Self {
        Self::from_daemon(&value)
    }
}

impl ContainerState {
    /// Parse a daemon state string case-insensitively.
    #[must_use]
    pub fn from_daemon(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" | "stopped" => Self::Exited,
            "dead" => Self::Dead,
            "removing" => Self::Removing,
            _ => Self::Unknown,
        }
    }

    /// The lowercase name the daemon uses for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Removing => "removing",
            Self::Unknown => "unknown",
        }
    }

    /// The summary bucket the state is counted under.
    #[must_use]
    pub const fn bucket(self) -> StateBucket {
        match self {
            Self::Running | Self::Restarting => StateBucket::Running,
            Self::Paused => StateBucket::Paused,
            Self::Created | Self::Exited | Self::Dead | Self::Removing | Self::Unknown => {
                StateBucket::Stopped
            }
        }
    }

    /// Whether the state indicates trouble worth flagging.
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Restarting | Self::Dead)
    }
}

/// Coarse grouping of container states for counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBucket {
    /// Running or restarting.
    Running,
    /// Paused.
    Paused,
    /// Everything else.
    Stopped,
}

/// A published or exposed container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host address the port is bound to.
    #[serde(rename = "IP", default)]
    pub ip: Option<String>,
    /// Port inside the container.
    #[serde(rename = "PrivatePort")]
    pub private_port: u16,
    /// Port on the host, when published.
    #[serde(rename = "PublicPort", default)]
    pub public_port: Option<u16>,
    /// `tcp`, `udp` or `sctp`.
    #[serde(rename = "Type", default)]
    pub protocol: String,
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawContainer")]
pub struct ContainerRecord {
    /// Full container id.
    pub id: String,
    /// Names, each with the daemon's leading `/`.
    pub names: Vec<String>,
    /// Image reference the container was created from.
    pub image: String,
    /// Resolved image id.
    pub image_id: String,
    /// Command line.
    pub command: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Human status such as `Up 2 hours`.
    pub status_text: String,
    /// Port mappings.
    pub ports: Vec<PortMapping>,
    /// Labels.
    pub labels: HashMap<String, String>,
    /// Network mode from the host config.
    pub network_mode: Option<String>,
}

impl ContainerRecord {
    /// The first name without its leading `/`, or the short id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map(|name| name.trim_start_matches('/'))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.short_id())
    }

    /// The first twelve characters of the id.
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id
            .char_indices()
            .nth(12)
            .and_then(|(end, _)| self.id.get(..end))
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawContainer {
    id: String,
    #[serde(default)]
    names: Option<Vec<String>>,
    #[serde(default)]
    image: String,
    #[serde(rename = "ImageID", default)]
    image_id: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    state: ContainerState,
    #[serde(default)]
    status: String,
    #[serde(default)]
    ports: Option<Vec<PortMapping>>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    host_config: Option<RawHostConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawHostConfig {
    #[serde(default)]
    network_mode: Option<String>,
}

impl From<RawContainer> for ContainerRecord {
    fn from(raw: RawContainer) -> Self {
        Self {
            id: raw.id,
            names: raw.names.unwrap_or_default(),
            image: raw.image,
            image_id: raw.image_id,
            command: raw.command,
            created_at: DateTime::from_timestamp(raw.created, 0).unwrap_or_default(),
            state: raw.state,
            status_text: raw.status,
            ports: raw.ports.unwrap_or_default(),
            labels: raw.labels.unwrap_or_default(),
            network_mode: raw
                .host_config
                .and_then(|config| config.network_mode)
                .filter(|mode| !mode.is_empty()),
        }
    }
}

/// Detailed state from a container inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InspectState {
    /// Lifecycle state.
    pub status: ContainerState,
    /// Whether the container is running.
    pub running: bool,
    /// Whether the container is paused.
    pub paused: bool,
    /// Whether the container is restarting.
    pub restarting: bool,
    /// Whether the container is dead.
    pub dead: bool,
    /// Exit code of the last run.
    pub exit_code: i64,
    /// Error message from the last run.
    pub error: String,
    /// Start time as reported by the daemon.
    pub started_at: String,
    /// Finish time as reported by the daemon.
    pub finished_at: String,
    /// Health-check outcome, when the image defines one.
    pub health: Option<InspectHealth>,
}

/// Health-check outcome from a container inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InspectHealth {
    /// `starting`, `healthy` or `unhealthy`.
    pub status: String,
    /// Consecutive failed probes.
    pub failing_streak: u64,
}

/// Selected container configuration from an inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InspectConfig {
    /// Image reference.
    pub image: String,
    /// Hostname inside the container.
    pub hostname: String,
    /// Command arguments.
    pub cmd: Option<Vec<String>>,
    /// Environment as `KEY=value` entries.
    pub env: Option<Vec<String>>,
    /// Labels.
    pub labels: Option<HashMap<String, String>>,
}

/// Result of inspecting a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDetails {
    /// Full container id.
    pub id: String,
    /// Name with leading `/`.
    #[serde(default)]
    pub name: String,
    /// Creation time as reported by the daemon.
    #[serde(default)]
    pub created: String,
    /// Detailed state.
    #[serde(default)]
    pub state: InspectState,
    /// Configuration.
    #[serde(default)]
    pub config: InspectConfig,
    /// How many times the restart policy restarted it.
    #[serde(default)]
    pub restart_count: u64,
}

/// Daemon-wide information from `GET /info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DaemonInfo {
    /// Daemon id.
    #[serde(rename = "ID")]
    pub id: String,
    /// Host name.
    pub name: String,
    /// Daemon version.
    pub server_version: String,
    /// Host operating system description.
    pub operating_system: String,
    /// `linux` or `windows`.
    #[serde(rename = "OSType")]
    pub os_type: String,
    /// Host architecture.
    pub architecture: String,
    /// Host kernel version.
    pub kernel_version: String,
    /// Number of host CPUs.
    #[serde(rename = "NCPU")]
    pub ncpu: u64,
    /// Host memory in bytes.
    pub mem_total: u64,
    /// Total containers.
    pub containers: u64,
    /// Running containers.
    pub containers_running: u64,
    /// Paused containers.
    pub containers_paused: u64,
    /// Stopped containers.
    pub containers_stopped: u64,
    /// Images.
    pub images: u64,
    /// Storage driver.
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ContainerRecord, ContainerState, DaemonInfo, StateBucket};

    const LISTING: &str = r#"[{
        "Id": "8dfafdbc3a40c1e2d3f4a5b6c7d8e9f0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6",
        "Names": ["/web"],
        "Image": "nginx:1.27",
        "ImageID": "sha256:abc",
        "Command": "nginx -g 'daemon off;'",
        "Created": 1700000000,
        "State": "running",
        "Status": "Up 2 hours",
        "Ports": [{"IP": "0.0.0.0", "PrivatePort": 80, "PublicPort": 8080, "Type": "tcp"}],
        "Labels": {"com.example.tier": "frontend"},
        "HostConfig": {"NetworkMode": "bridge"},
        "Mounts": []
    }, {
        "Id": "0123456789abcdef",
        "Names": null,
        "State": "Exited",
        "Ports": null,
        "Labels": null
    }]"#;

    #[rstest]
    fn listing_decodes_docker_payload() {
        let records: Vec<ContainerRecord> = serde_json::from_str(LISTING).expect("listing should decode");

        let [web, bare] = records.as_slice() else {
            panic!("expected two records, got {}", records.len());
        };
        assert_eq!(web.display_name(), "web");
        assert_eq!(web.image_id, "sha256:abc");
        assert_eq!(web.created_at.timestamp(), 1_700_000_000);
        assert_eq!(web.state, ContainerState::Running);
        assert_eq!(web.status_text, "Up 2 hours");
        assert_eq!(web.ports.first().and_then(|port| port.public_port), Some(8080));
        assert_eq!(web.labels.get("com.example.tier").map(String::as_str), Some("frontend"));
        assert_eq!(web.network_mode.as_deref(), Some("bridge"));

        assert_eq!(bare.state, ContainerState::Exited);
        assert!(bare.names.is_empty());
        assert!(bare.ports.is_empty());
        assert_eq!(bare.display_name(), "0123456789ab");
    }

    #[rstest]
    #[case("running", StateBucket::Running)]
    #[case("restarting", StateBucket::Running)]
    #[case("paused", StateBucket::Paused)]
    #[case("created", StateBucket::Stopped)]
    #[case("exited", StateBucket::Stopped)]
    #[case("dead", StateBucket::Stopped)]
    #[case("removing", StateBucket::Stopped)]
    #[case("configured", StateBucket::Stopped)]
    fn states_fall_into_buckets(#[case] raw: &str, #[case] bucket: StateBucket) {
        assert_eq!(ContainerState::from_daemon(raw).bucket(), bucket);
    }

    #[rstest]
    fn info_decodes_upper_case_keys() {
        let info: DaemonInfo = serde_json::from_str(
            r#"{"ID": "abc", "Name": "host", "ServerVersion": "27.1.1", "OSType": "linux", "NCPU": 8, "MemTotal": 16000000000, "ContainersRunning": 3}"#,
        )
        .expect("info should decode");

        assert_eq!(info.server_version, "27.1.1");
        assert_eq!(info.ncpu, 8);
        assert_eq!(info.containers_running, 3);
        assert_eq!(info.os_type, "linux");
    }
}
