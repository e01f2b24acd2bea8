//! Cross-resource linking: relationships the engine does not report on any
//! single record.
//!
//! Volume usage comes from one scan of the poll's container mounts; port
//! mappings come from a bounded-concurrency refresh of each container's
//! live state. Per-container failures are absorbed into tallies so one bad
//! container never fails the listing.

use std::collections::{HashMap, HashSet};

use futures::stream::StreamExt;

use crate::engine::EngineClient;
use crate::fsutil;

use super::models::{
    BindMountRecord, ContainerRecord, LogFileRecord, MountKind, VolumeRecord, VolumeUsage,
};
use super::normalize;

/// Upper bound on concurrent per-container inspect round-trips, so a large
/// poll does not overwhelm the engine's API.
const INSPECT_CONCURRENCY: usize = 8;

/// Counts, for every volume name, the distinct containers that mount it as
/// a volume.
///
/// One O(containers x mounts) pass over the poll's container set; the
/// result is shared by every volume lookup in the same poll. Bind mounts
/// never count, even when their source string equals a volume name.
pub fn volume_usage(containers: &[ContainerRecord]) -> VolumeUsage {
    let mut usage: VolumeUsage = HashMap::new();
    for container in containers {
        let mut seen: HashSet<&str> = HashSet::new();
        for mount in &container.mounts {
            if mount.kind != MountKind::Volume || mount.source.is_empty() {
                continue;
            }
            // a container mounting the same volume twice is one user
            if seen.insert(mount.source.as_str()) {
                *usage.entry(mount.source.clone()).or_default() += 1;
            }
        }
    }
    usage
}

pub fn apply_volume_usage(volumes: &mut [VolumeRecord], usage: &VolumeUsage) {
    for volume in volumes {
        volume.containers_using = usage.get(&volume.name).copied().unwrap_or(0);
    }
}

/// Outcome of the per-container refresh pass.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    /// Container id to engine-host log path, for the log-file listing.
    pub log_paths: HashMap<String, String>,
    /// Containers whose lookup failed and were left without ports.
    pub port_lookup_failures: u64,
}

/// Refreshes every container's live state with bounded concurrency.
///
/// Ports use a two-tier strategy. The freshly inspected binding table is
/// the primary view, because the refresh is what captures just-assigned
/// ephemeral host ports that a stale listing misses. When the inspect view
/// is empty
/// (some drivers report no live bindings) the listing's own port table,
/// already on the record, is kept as the fallback. A failed lookup leaves
/// the container with an empty port list and bumps the tally; it never
/// fails the pass.
pub async fn refresh_containers(
    engine: &EngineClient,
    containers: &mut [ContainerRecord],
) -> RefreshOutcome {
    let lookups: Vec<_> = futures::stream::iter(containers.iter().map(|container| {
        let id = container.id.clone();
        async move {
            let inspect = engine.inspect_container(&id).await;
            (id, inspect)
        }
    }))
    .buffer_unordered(INSPECT_CONCURRENCY)
    .collect()
    .await;

    let mut outcome = RefreshOutcome::default();
    let mut fresh = HashMap::with_capacity(lookups.len());
    for (id, inspect) in lookups {
        match inspect {
            Ok(response) => {
                fresh.insert(id, response);
            }
            Err(err) => {
                log::warn!("port lookup failed for container `{id}`: {err}");
                outcome.port_lookup_failures += 1;
            }
        }
    }

    for container in containers.iter_mut() {
        match fresh.remove(&container.id) {
            Some(inspect) => {
                let live = inspect
                    .network_settings
                    .and_then(|settings| settings.ports)
                    .map(|ports| normalize::inspect_ports(&ports))
                    .unwrap_or_default();
                if !live.is_empty() {
                    container.ports = live;
                }
                if let Some(log_path) = inspect.log_path.filter(|path| !path.is_empty()) {
                    outcome.log_paths.insert(container.id.clone(), log_path);
                }
            }
            // every container was looked up, so absence means failure
            None => container.ports.clear(),
        }
    }
    outcome
}

/// One record per bind-type mount across the poll's container set, sized by
/// walking the host-side source where it is visible from this process.
pub async fn bind_mounts(containers: &[ContainerRecord]) -> Vec<BindMountRecord> {
    let sources: Vec<(String, String, String)> = containers
        .iter()
        .flat_map(|container| {
            container
                .mounts
                .iter()
                .filter(|mount| mount.kind == MountKind::Bind)
                .map(|mount| {
                    (
                        mount.source.clone(),
                        mount.destination.clone(),
                        container.name.clone(),
                    )
                })
        })
        .collect();

    tokio::task::spawn_blocking(move || {
        sources
            .into_iter()
            .map(|(source, destination, container_name)| BindMountRecord {
                size_bytes: fsutil::path_size(&source),
                source,
                destination,
                container_name,
            })
            .collect()
    })
    .await
    .expect("bind mount sizing task panicked")
}

/// Log-file records for every container whose refresh reported a log path.
pub async fn log_files(
    containers: &[ContainerRecord],
    log_paths: &HashMap<String, String>,
) -> Vec<LogFileRecord> {
    let entries: Vec<(String, String, String)> = containers
        .iter()
        .filter_map(|container| {
            log_paths.get(&container.id).map(|path| {
                (
                    container.id.clone(),
                    container.name.clone(),
                    path.clone(),
                )
            })
        })
        .collect();

    tokio::task::spawn_blocking(move || {
        entries
            .into_iter()
            .map(|(container_id, container_name, log_path)| LogFileRecord {
                size_bytes: fsutil::file_size(&log_path).unwrap_or_else(|err| {
                    log::debug!("{err}");
                    0
                }),
                container_id,
                container_name,
                log_path,
            })
            .collect()
    })
    .await
    .expect("log sizing task panicked")
}

#[cfg(test)]
mod tests {
    use super::super::models::{ContainerStatus, MountRef};
    use super::*;

    fn container(id: &str, name: &str, mounts: Vec<MountRef>) -> ContainerRecord {
        ContainerRecord {
            id: id.to_owned(),
            name: name.to_owned(),
            image: "img:latest".to_owned(),
            status: ContainerStatus::Running,
            created: None,
            size_rw_bytes: 0,
            ports: Vec::new(),
            mounts,
        }
    }

    fn volume_mount(name: &str) -> MountRef {
        MountRef {
            kind: MountKind::Volume,
            source: name.to_owned(),
            destination: format!("/mnt/{name}"),
        }
    }

    fn bind_mount(source: &str) -> MountRef {
        MountRef {
            kind: MountKind::Bind,
            source: source.to_owned(),
            destination: "/mnt/bind".to_owned(),
        }
    }

    #[test]
    fn test_volume_usage_ignores_bind_mounts_with_matching_source() {
        let containers = vec![
            container("c1", "web-1", vec![volume_mount("app-data")]),
            container("c2", "web-2", vec![volume_mount("app-data")]),
            // same literal string, but as a bind source, not a volume
            container("c3", "cache-1", vec![bind_mount("app-data")]),
        ];
        let usage = volume_usage(&containers);
        assert_eq!(usage.get("app-data").copied(), Some(2));
    }

    #[test]
    fn test_volume_usage_counts_distinct_containers_once() {
        let containers = vec![container(
            "c1",
            "web-1",
            vec![volume_mount("app-data"), volume_mount("app-data")],
        )];
        let usage = volume_usage(&containers);
        assert_eq!(usage.get("app-data").copied(), Some(1));
    }

    #[test]
    fn test_volume_usage_is_iteration_order_independent() {
        let forward = vec![
            container("c1", "a", vec![volume_mount("v1")]),
            container("c2", "b", vec![volume_mount("v1"), volume_mount("v2")]),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(volume_usage(&forward), volume_usage(&reversed));
    }

    #[test]
    fn test_apply_volume_usage_defaults_to_zero() {
        let containers = vec![container("c1", "web-1", vec![volume_mount("app-data")])];
        let usage = volume_usage(&containers);

        let mut volumes = vec![
            VolumeRecord {
                name: "app-data".to_owned(),
                driver: "local".to_owned(),
                created: None,
                size_bytes: 0,
                mount_point: String::new(),
                containers_using: 0,
            },
            VolumeRecord {
                name: "orphan".to_owned(),
                driver: "local".to_owned(),
                created: None,
                size_bytes: 0,
                mount_point: String::new(),
                containers_using: 99,
            },
        ];
        apply_volume_usage(&mut volumes, &usage);
        assert_eq!(volumes[0].containers_using, 1);
        assert_eq!(volumes[1].containers_using, 0);
    }
}
