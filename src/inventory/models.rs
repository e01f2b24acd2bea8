//! Canonical snapshot types produced by one inventory poll.
//!
//! Every record here is an immutable output of the normalizer/linker for
//! the remainder of a poll. Unknown values are tagged optionals, never
//! silent zeros, so callers can tell "zero bytes" from "not reported".
//! Timestamps are unix epoch seconds.

use std::collections::HashMap;

use crate::scan::ScanStatusSnapshot;

/// Canonical repository/tag marker for an untagged image.
pub const NONE_TAG: &str = "<none>";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineIdentity {
    pub version: String,
    pub api_version: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiskUsageTotals {
    pub used_bytes: u64,
    pub available_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub used_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ImageRecord {
    pub id: String,
    /// All repo:tag references, in engine order. Empty for untagged images.
    pub repo_tags: Vec<String>,
    /// Repository of the first reference, [`NONE_TAG`] when untagged.
    pub repository: String,
    /// Tag of the first reference, [`NONE_TAG`] when untagged.
    pub tag: String,
    pub created: Option<i64>,
    pub size_bytes: u64,
    /// Equals `size_bytes` when the engine reports no virtual size, since
    /// virtual size is defined as the size when no delta data exists.
    pub virtual_size_bytes: u64,
    /// Number of containers based on this image.
    pub containers: u64,
}

/// Fixed container lifecycle states. Anything the engine reports outside
/// this set maps to [`ContainerStatus::Unknown`] instead of failing the
/// poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    Unknown,
}

impl ContainerStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ContainerRecord {
    pub id: String,
    /// First engine-reported name without its leading slash, falling back
    /// to the short id.
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub created: Option<i64>,
    /// Size of the writable layer.
    pub size_rw_bytes: u64,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<MountRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
    pub host_ip: Option<String>,
    /// `None` marks a declared-but-unbound port. Such mappings are retained
    /// on the record; rendering decides whether to show them.
    pub host_port: Option<u16>,
}

impl PortMapping {
    /// Renders `hostPort -> containerPort/proto`, prefixed with the host IP
    /// when it is a specific address rather than the bind-all one. Declared
    /// ports with no bound host port render as `None`.
    pub fn render(&self) -> Option<String> {
        let host_port = self.host_port?;
        let rendered = match self.host_ip.as_deref() {
            Some(ip) if !ip.is_empty() && ip != "0.0.0.0" && ip != "::" => {
                format!(
                    "{ip}:{host_port} -> {}/{}",
                    self.container_port, self.protocol
                )
            }
            _ => format!("{host_port} -> {}/{}", self.container_port, self.protocol),
        };
        Some(rendered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Bind,
    Volume,
    Other,
}

/// A container-scoped mount reference.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MountRef {
    pub kind: MountKind,
    /// Volume name for volume mounts, host-side path otherwise.
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VolumeRecord {
    pub name: String,
    pub driver: String,
    pub created: Option<i64>,
    /// 0 when the engine cannot report volume usage.
    pub size_bytes: u64,
    pub mount_point: String,
    /// Distinct containers mounting this volume, recomputed from the same
    /// poll's container set and never carried over between polls.
    pub containers_using: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BuildCacheEntry {
    pub id: String,
    pub cache_type: String,
    pub size_bytes: u64,
    pub created: Option<i64>,
    pub last_used: Option<i64>,
    pub usage_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageLayerRecord {
    pub id: String,
    pub size_bytes: u64,
    pub in_use: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineEvent {
    pub kind: String,
    pub action: String,
    pub actor_id: String,
    pub timestamp: Option<i64>,
}

/// One container log file on the engine host.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LogFileRecord {
    pub container_id: String,
    pub container_name: String,
    pub log_path: String,
    /// 0 when the path is not accessible from this process.
    pub size_bytes: u64,
}

/// One bind-type mount across the poll's container set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BindMountRecord {
    pub source: String,
    pub destination: String,
    pub container_name: String,
    /// 0 when the source is not accessible from this process.
    pub size_bytes: u64,
}

/// Per-kind rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResourceTotals {
    pub count: u64,
    pub total_size_bytes: u64,
}

/// Storage-layer rollup.
///
/// `dedup_estimate_percent` is an explicit heuristic, not a measured value:
/// the fraction of layers not currently referenced approximates the benefit
/// of layer sharing, capped at 85%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LayerBreakdown {
    pub total_layers: u64,
    pub active_layers: u64,
    pub unused_layers: u64,
    pub total_size_bytes: u64,
    pub dedup_estimate_percent: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageLayerSummary {
    pub breakdown: LayerBreakdown,
    pub layers: Vec<StorageLayerRecord>,
}

/// Recovered-error tallies for one poll. A malformed record or a failed
/// per-container lookup lands here instead of aborting the poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PollWarnings {
    pub skipped_images: u64,
    pub skipped_containers: u64,
    pub skipped_volumes: u64,
    pub skipped_build_cache: u64,
    pub port_lookup_failures: u64,
}

/// The dashboard operation's sole return value. All counts and sizes come
/// from the same poll as the lists they summarize.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DashboardSummary {
    pub engine: EngineIdentity,
    pub disk_usage: DiskUsageTotals,
    pub scan: ScanStatusSnapshot,
    pub images: ResourceTotals,
    pub containers: ResourceTotals,
    pub volumes: ResourceTotals,
    pub build_cache: ResourceTotals,
    pub storage_layers: LayerBreakdown,
    pub logs: ResourceTotals,
    pub bind_mounts: ResourceTotals,
    pub warnings: PollWarnings,
}

/// Volume-usage index for one poll: volume name to distinct container
/// count. Computed once and shared by every volume lookup in the poll.
pub type VolumeUsage = HashMap<String, u64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_known_states() {
        assert_eq!(ContainerStatus::parse("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("Exited"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::parse(" dead "), ContainerStatus::Dead);
    }

    #[test]
    fn test_status_parse_unrecognized_is_unknown() {
        assert_eq!(ContainerStatus::parse("removing"), ContainerStatus::Unknown);
        assert_eq!(ContainerStatus::parse(""), ContainerStatus::Unknown);
    }

    #[test]
    fn test_port_render_with_specific_host_ip() {
        let mapping = PortMapping {
            container_port: 80,
            protocol: "tcp".to_owned(),
            host_ip: Some("127.0.0.1".to_owned()),
            host_port: Some(8080),
        };
        assert_eq!(mapping.render().as_deref(), Some("127.0.0.1:8080 -> 80/tcp"));
    }

    #[test]
    fn test_port_render_elides_bind_all_ip() {
        let mapping = PortMapping {
            container_port: 53,
            protocol: "udp".to_owned(),
            host_ip: Some("0.0.0.0".to_owned()),
            host_port: Some(53),
        };
        assert_eq!(mapping.render().as_deref(), Some("53 -> 53/udp"));
    }

    #[test]
    fn test_port_render_unbound_is_none() {
        let mapping = PortMapping {
            container_port: 9000,
            protocol: "tcp".to_owned(),
            host_ip: None,
            host_port: None,
        };
        assert_eq!(mapping.render(), None);
    }
}
