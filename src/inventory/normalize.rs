//! Resource normalization: raw engine records in, canonical DTOs out.
//!
//! The engine returns differently-shaped and sometimes-absent fields across
//! resource kinds and API versions. This module pins one rule set for all
//! of them, applied uniformly regardless of which raw shape came back:
//!
//! - A missing image `virtual_size` defaults to `size` (virtual size is the
//!   size when no delta data exists, so it is never left unset).
//! - A missing `created` timestamp becomes `None`, not an empty string and
//!   not the poll time.
//! - An unrecognized container state maps to the `unknown` sentinel.
//! - A missing build-cache type defaults to `"unknown"`.
//! - A record without an id cannot be keyed at all: it is skipped and
//!   counted in the per-kind tally. One malformed record never aborts the
//!   rest of its batch.

use bollard::models::{
    BuildCache, ContainerSummary, EventMessage, ImageSummary, MountPoint, MountPointTypeEnum,
    Port, PortMap, Volume,
};
use bollard::system::Version;

use crate::engine::LayerDir;

use super::models::{
    BuildCacheEntry, ContainerRecord, ContainerStatus, EngineEvent, EngineIdentity, ImageRecord,
    MountKind, MountRef, NONE_TAG, PortMapping, StorageLayerRecord, VolumeRecord,
};

/// A normalized batch plus the number of records that had to be skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub skipped: u64,
}

pub fn identity(raw: Version) -> EngineIdentity {
    EngineIdentity {
        version: raw.version.filter(|v| !v.is_empty()).unwrap_or_else(unknown),
        api_version: raw
            .api_version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(unknown),
        platform: raw
            .platform
            .map(|platform| platform.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(unknown),
    }
}

pub fn images(raw: Vec<ImageSummary>) -> Normalized<ImageRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for image in raw {
        if image.id.is_empty() {
            log::warn!("skipping image record without an id");
            skipped += 1;
            continue;
        }
        let (repository, tag) = repo_and_tag(&image.repo_tags);
        let size_bytes = non_negative(image.size);
        records.push(ImageRecord {
            id: image.id,
            repository,
            tag,
            repo_tags: image.repo_tags,
            created: (image.created > 0).then_some(image.created),
            size_bytes,
            virtual_size_bytes: image.virtual_size.map_or(size_bytes, non_negative),
            containers: non_negative(image.containers),
        });
    }
    Normalized { records, skipped }
}

pub fn containers(raw: Vec<ContainerSummary>) -> Normalized<ContainerRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for container in raw {
        let Some(id) = container.id.filter(|id| !id.is_empty()) else {
            log::warn!("skipping container record without an id");
            skipped += 1;
            continue;
        };
        let name = container
            .names
            .unwrap_or_default()
            .first()
            .map(|name| name.trim_start_matches('/').to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| short_id(&id));
        let status = container
            .state
            .as_deref()
            .map_or(ContainerStatus::Unknown, ContainerStatus::parse);
        let mounts = container
            .mounts
            .unwrap_or_default()
            .iter()
            .map(mount_ref)
            .collect();
        let ports = summary_ports(&container.ports.unwrap_or_default());
        records.push(ContainerRecord {
            name,
            image: container.image.or(container.image_id).unwrap_or_default(),
            status,
            created: container.created.filter(|&created| created > 0),
            size_rw_bytes: container.size_rw.map_or(0, non_negative),
            ports,
            mounts,
            id,
        });
    }
    Normalized { records, skipped }
}

pub fn volumes(raw: Vec<Volume>) -> Normalized<VolumeRecord> {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for volume in raw {
        if volume.name.is_empty() {
            log::warn!("skipping volume record without a name");
            skipped += 1;
            continue;
        }
        records.push(VolumeRecord {
            driver: volume.driver,
            created: volume.created_at.map(|created| created.timestamp()),
            size_bytes: volume
                .usage_data
                .map_or(0, |usage| non_negative(usage.size)),
            mount_point: volume.mountpoint,
            // filled by the linker from the same poll's container set
            containers_using: 0,
            name: volume.name,
        });
    }
    Normalized { records, skipped }
}

pub fn build_cache(raw: Vec<BuildCache>) -> Normalized<BuildCacheEntry> {
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for entry in raw {
        let Some(id) = entry.id.filter(|id| !id.is_empty()) else {
            log::warn!("skipping build cache record without an id");
            skipped += 1;
            continue;
        };
        records.push(BuildCacheEntry {
            id,
            cache_type: entry
                .typ
                .map(|typ| typ.to_string())
                .filter(|typ| !typ.is_empty())
                .unwrap_or_else(unknown),
            size_bytes: entry.size.map_or(0, non_negative),
            created: entry.created_at.map(|created| created.timestamp()),
            last_used: entry.last_used_at.map(|last| last.timestamp()),
            usage_count: entry.usage_count.map_or(0, non_negative),
        });
    }
    Normalized { records, skipped }
}

pub fn layers(raw: Vec<LayerDir>) -> Vec<StorageLayerRecord> {
    raw.into_iter()
        .map(|layer| StorageLayerRecord {
            id: layer.id,
            size_bytes: layer.size_bytes,
            in_use: layer.in_use,
        })
        .collect()
}

pub fn events(raw: Vec<EventMessage>) -> Vec<EngineEvent> {
    raw.into_iter()
        .map(|event| EngineEvent {
            kind: event
                .typ
                .map(|typ| typ.to_string())
                .filter(|kind| !kind.is_empty())
                .unwrap_or_else(unknown),
            action: event
                .action
                .filter(|action| !action.is_empty())
                .unwrap_or_else(unknown),
            actor_id: event
                .actor
                .and_then(|actor| actor.id)
                .unwrap_or_default(),
            timestamp: event.time.filter(|&time| time > 0),
        })
        .collect()
}

/// Port mappings from a container listing's port table. This is the
/// fallback tier of the port lookup; the freshly inspected view wins when
/// it is non-empty.
pub fn summary_ports(raw: &[Port]) -> Vec<PortMapping> {
    let mut ports: Vec<PortMapping> = raw
        .iter()
        .map(|port| PortMapping {
            container_port: u16::try_from(port.private_port).unwrap_or(0),
            protocol: protocol_name(port.typ.as_ref().map(ToString::to_string)),
            host_ip: port.ip.clone().filter(|ip| !ip.is_empty()),
            host_port: port.public_port.and_then(|public| u16::try_from(public).ok()),
        })
        .collect();
    sort_ports(&mut ports);
    ports
}

/// Port mappings from an inspect response's network-settings port table.
///
/// Declared-but-unbound ports (a key with no bindings) are retained with no
/// host port rather than dropped; the render rule decides their fate.
pub fn inspect_ports(raw: &PortMap) -> Vec<PortMapping> {
    let mut ports = Vec::with_capacity(raw.len());
    for (exposed, bindings) in raw {
        let (port, protocol) = match exposed.split_once('/') {
            Some((port, protocol)) => (port, protocol),
            None => (exposed.as_str(), "tcp"),
        };
        let Ok(container_port) = port.parse::<u16>() else {
            log::debug!("ignoring malformed exposed port `{exposed}`");
            continue;
        };
        match bindings.as_deref() {
            Some(bindings) if !bindings.is_empty() => {
                for binding in bindings {
                    ports.push(PortMapping {
                        container_port,
                        protocol: protocol.to_owned(),
                        host_ip: binding.host_ip.clone().filter(|ip| !ip.is_empty()),
                        host_port: binding
                            .host_port
                            .as_deref()
                            .and_then(|host_port| host_port.parse().ok()),
                    });
                }
            }
            _ => ports.push(PortMapping {
                container_port,
                protocol: protocol.to_owned(),
                host_ip: None,
                host_port: None,
            }),
        }
    }
    sort_ports(&mut ports);
    ports
}

// the engine hands the port table back as a map; pin a stable order
fn sort_ports(ports: &mut [PortMapping]) {
    ports.sort_by(|a, b| {
        (a.container_port, &a.protocol, a.host_port)
            .cmp(&(b.container_port, &b.protocol, b.host_port))
    });
}

fn mount_ref(raw: &MountPoint) -> MountRef {
    let kind = match raw.typ {
        Some(MountPointTypeEnum::BIND) => MountKind::Bind,
        Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
        _ => MountKind::Other,
    };
    // volume mounts are identified by volume name, everything else by the
    // host-side source path
    let source = match kind {
        MountKind::Volume => raw.name.clone().or_else(|| raw.source.clone()),
        _ => raw.source.clone(),
    }
    .unwrap_or_default();
    MountRef {
        kind,
        source,
        destination: raw.destination.clone().unwrap_or_default(),
    }
}

fn repo_and_tag(repo_tags: &[String]) -> (String, String) {
    // `<none>` marks a genuinely untagged image only; a tagged image keeps
    // its own repo and tag
    let untagged = || (NONE_TAG.to_owned(), NONE_TAG.to_owned());
    let Some(first) = repo_tags
        .first()
        .filter(|reference| reference.as_str() != "<none>:<none>")
    else {
        return untagged();
    };
    match first.rsplit_once(':') {
        // a registry port (`host:5000/app`) is not a tag separator
        Some((repo, tag)) if !repo.is_empty() && !tag.contains('/') => {
            (repo.to_owned(), tag.to_owned())
        }
        _ => (first.clone(), NONE_TAG.to_owned()),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

fn protocol_name(raw: Option<String>) -> String {
    match raw {
        Some(name) if !name.is_empty() => name,
        _ => "tcp".to_owned(),
    }
}

fn unknown() -> String {
    "unknown".to_owned()
}

pub(crate) fn non_negative(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}
