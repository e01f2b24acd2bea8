//! Poll orchestration and the caller-facing operation surface.
//!
//! One poll is a bounded sequence of engine calls: the per-kind listings go
//! out concurrently, the volume-usage link waits for the container and
//! volume listings (the pipeline's one ordering dependency), and the
//! per-container refresh fans out with bounded concurrency. Everything a
//! poll produces is local to that poll and handed to the caller read-only;
//! a dropped caller future abandons the in-flight calls and no partial
//! summary is ever returned.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::{self, EngineClient};
use crate::scan::{ScanGuard, ScanInProgress, ScanStatusSnapshot, ScanTracker};

pub mod aggregate;
pub mod link;
pub mod models;
pub mod normalize;

use models::{
    BindMountRecord, BuildCacheEntry, ContainerRecord, DashboardSummary, DiskUsageTotals,
    EngineEvent, EngineIdentity, ImageRecord, LogFileRecord, PollWarnings, PortMapping,
    StorageLayerRecord, StorageLayerSummary, VolumeRecord,
};
use normalize::Normalized;

type Result<T> = std::result::Result<T, engine::Error>;

/// The resource aggregation engine's operation surface.
///
/// Every listing operation runs against a fresh poll; nothing is cached
/// between calls. Poll-level operations fail only on facade-level
/// connectivity errors; per-record and per-container problems are absorbed
/// into the [`PollWarnings`] tallies.
#[derive(Debug)]
pub struct Inventory {
    engine: EngineClient,
    scan: ScanTracker,
}

impl Inventory {
    pub fn new(engine: EngineClient) -> Self {
        Self {
            engine,
            scan: ScanTracker::default(),
        }
    }

    pub fn engine(&self) -> &EngineClient {
        &self.engine
    }

    /// Runs one full-inventory poll and folds it into the dashboard
    /// summary.
    ///
    /// The pass is tracked by the scan cell when no other scan is running;
    /// a pass that loses that race still completes but leaves the tracker
    /// to the scan that owns it, so this operation never fails with
    /// [`ScanInProgress`].
    ///
    /// # Errors
    ///
    /// Fails with [`engine::Error`] when any engine call of the poll cannot
    /// complete; no partial summary is returned.
    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let guard = self.scan.begin().ok();
        match self.poll().await {
            Ok(outcome) => {
                if let Some(guard) = guard {
                    guard.complete();
                }
                Ok(outcome.into_summary(self.scan.status()))
            }
            Err(err) => {
                if let Some(guard) = guard {
                    guard.fail(err.operation());
                }
                Err(err)
            }
        }
    }

    pub async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        Ok(normalize::images(self.engine.list_images().await?).records)
    }

    pub async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerRecord>> {
        let raw = self.engine.list_containers(include_stopped).await?;
        let mut containers = normalize::containers(raw);
        link::refresh_containers(&self.engine, &mut containers.records).await;
        Ok(containers.records)
    }

    /// Volume records with usage counts from the same poll's container set.
    pub async fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        let (volumes, containers) = tokio::join!(
            self.engine.list_volumes(),
            self.engine.list_containers(true),
        );
        let mut volumes = normalize::volumes(volumes?);
        let containers = normalize::containers(containers?);
        let usage = link::volume_usage(&containers.records);
        link::apply_volume_usage(&mut volumes.records, &usage);
        Ok(volumes.records)
    }

    pub async fn list_build_cache(&self) -> Result<Vec<BuildCacheEntry>> {
        Ok(normalize::build_cache(self.engine.list_build_cache().await?).records)
    }

    pub async fn list_storage_layers(&self) -> Result<StorageLayerSummary> {
        let layers = normalize::layers(self.engine.list_layers().await?);
        Ok(StorageLayerSummary {
            breakdown: aggregate::layer_breakdown(&layers),
            layers,
        })
    }

    /// Port mappings for one container.
    ///
    /// Refresh-then-read: a fresh inspect captures just-assigned ephemeral
    /// host ports that a cached view would miss. When the inspected binding
    /// table is empty the listing's port table is the fallback.
    ///
    /// # Errors
    ///
    /// Fails with [`engine::Error`] when the engine cannot be reached; a
    /// container with no bound ports is an empty list, not an error.
    pub async fn container_ports(&self, id: &str) -> Result<Vec<PortMapping>> {
        let inspect = self.engine.inspect_container(id).await?;
        let live = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .map(|ports| normalize::inspect_ports(&ports))
            .unwrap_or_default();
        if !live.is_empty() {
            return Ok(live);
        }
        let containers = self.engine.list_containers(true).await?;
        Ok(containers
            .into_iter()
            .find(|container| container.id.as_deref() == Some(id))
            .and_then(|container| container.ports)
            .map(|ports| normalize::summary_ports(&ports))
            .unwrap_or_default())
    }

    /// Engine events from the trailing window, most recent first, truncated
    /// to `max_count`.
    pub async fn recent_events(
        &self,
        window_secs: u64,
        max_count: usize,
    ) -> Result<Vec<EngineEvent>> {
        let until = epoch_now();
        let since = until.saturating_sub(window_secs as i64);
        let raw = self.engine.events_window(since, until).await?;
        let mut events = normalize::events(raw);
        // unknown timestamps sink to the end
        events.sort_by_key(|event| std::cmp::Reverse(event.timestamp.unwrap_or(i64::MIN)));
        events.truncate(max_count);
        Ok(events)
    }

    /// Bind-mount records across the current container set.
    pub async fn list_bind_mounts(&self) -> Result<Vec<BindMountRecord>> {
        let containers = normalize::containers(self.engine.list_containers(true).await?);
        Ok(link::bind_mounts(&containers.records).await)
    }

    /// Container log files with their on-disk sizes.
    pub async fn list_log_files(&self) -> Result<Vec<LogFileRecord>> {
        let raw = self.engine.list_containers(true).await?;
        let mut containers = normalize::containers(raw);
        let refresh = link::refresh_containers(&self.engine, &mut containers.records).await;
        Ok(link::log_files(&containers.records, &refresh.log_paths).await)
    }

    /// Marks the start of an externally driven full-inventory pass.
    ///
    /// # Errors
    ///
    /// Returns [`ScanInProgress`] while another scan is running.
    pub fn start_scan(&self) -> std::result::Result<ScanGuard<'_>, ScanInProgress> {
        self.scan.begin()
    }

    pub fn scan_status(&self) -> ScanStatusSnapshot {
        self.scan.status()
    }

    async fn poll(&self) -> Result<PollOutcome> {
        // independent reads go out together; the volume-usage link below
        // needs both the container and the volume listing back first
        let (identity, df, host_disk, images, containers, volumes, layers) = tokio::join!(
            self.engine.identity(),
            self.engine.disk_usage(),
            self.engine.host_disk(),
            self.engine.list_images(),
            self.engine.list_containers(true),
            self.engine.list_volumes(),
            self.engine.list_layers(),
        );
        let identity = normalize::identity(identity?);
        let df = df?;
        let host_disk = host_disk?;
        let images = normalize::images(images?);
        let mut containers = normalize::containers(containers?);
        let mut volumes = normalize::volumes(volumes?);
        let layers = normalize::layers(layers?);
        let build_cache = normalize::build_cache(df.build_cache.clone().unwrap_or_default());

        let usage = link::volume_usage(&containers.records);
        link::apply_volume_usage(&mut volumes.records, &usage);
        let refresh = link::refresh_containers(&self.engine, &mut containers.records).await;
        let bind_mounts = link::bind_mounts(&containers.records).await;
        let logs = link::log_files(&containers.records, &refresh.log_paths).await;

        Ok(PollOutcome {
            identity,
            disk_usage: aggregate::disk_usage(host_disk, &df),
            images,
            containers,
            volumes,
            build_cache,
            layers,
            bind_mounts,
            logs,
            port_lookup_failures: refresh.port_lookup_failures,
        })
    }
}

/// Everything one poll produced, before folding into the summary.
struct PollOutcome {
    identity: EngineIdentity,
    disk_usage: DiskUsageTotals,
    images: Normalized<ImageRecord>,
    containers: Normalized<ContainerRecord>,
    volumes: Normalized<VolumeRecord>,
    build_cache: Normalized<BuildCacheEntry>,
    layers: Vec<StorageLayerRecord>,
    bind_mounts: Vec<BindMountRecord>,
    logs: Vec<LogFileRecord>,
    port_lookup_failures: u64,
}

impl PollOutcome {
    fn into_summary(self, scan: ScanStatusSnapshot) -> DashboardSummary {
        DashboardSummary {
            engine: self.identity,
            disk_usage: self.disk_usage,
            scan,
            images: aggregate::image_totals(&self.images.records),
            containers: aggregate::container_totals(&self.containers.records),
            volumes: aggregate::volume_totals(&self.volumes.records),
            build_cache: aggregate::build_cache_totals(&self.build_cache.records),
            storage_layers: aggregate::layer_breakdown(&self.layers),
            logs: aggregate::log_totals(&self.logs),
            bind_mounts: aggregate::bind_mount_totals(&self.bind_mounts),
            warnings: PollWarnings {
                skipped_images: self.images.skipped,
                skipped_containers: self.containers.skipped,
                skipped_volumes: self.volumes.skipped,
                skipped_build_cache: self.build_cache.skipped,
                port_lookup_failures: self.port_lookup_failures,
            },
        }
    }
}

fn epoch_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::models::{ContainerStatus, EngineIdentity};
    use super::*;

    fn outcome() -> PollOutcome {
        let images = Normalized {
            records: vec![ImageRecord {
                id: "sha256:aaa".to_owned(),
                repo_tags: vec!["nginx:latest".to_owned()],
                repository: "nginx".to_owned(),
                tag: "latest".to_owned(),
                created: Some(1_700_000_000),
                size_bytes: 1000,
                virtual_size_bytes: 1000,
                containers: 1,
            }],
            skipped: 1,
        };
        let containers = Normalized {
            records: vec![
                ContainerRecord {
                    id: "c1".to_owned(),
                    name: "web-1".to_owned(),
                    image: "nginx:latest".to_owned(),
                    status: ContainerStatus::Running,
                    created: None,
                    size_rw_bytes: 64,
                    ports: Vec::new(),
                    mounts: Vec::new(),
                },
                ContainerRecord {
                    id: "c2".to_owned(),
                    name: "web-2".to_owned(),
                    image: "nginx:latest".to_owned(),
                    status: ContainerStatus::Exited,
                    created: None,
                    size_rw_bytes: 36,
                    ports: Vec::new(),
                    mounts: Vec::new(),
                },
            ],
            skipped: 0,
        };
        PollOutcome {
            identity: EngineIdentity {
                version: "27.1.1".to_owned(),
                api_version: "1.44".to_owned(),
                platform: "Docker Engine - Community".to_owned(),
            },
            disk_usage: DiskUsageTotals {
                used_bytes: 100,
                available_bytes: None,
                total_bytes: None,
                used_percent: None,
            },
            images,
            containers,
            volumes: Normalized {
                records: Vec::new(),
                skipped: 0,
            },
            build_cache: Normalized {
                records: Vec::new(),
                skipped: 0,
            },
            layers: vec![
                StorageLayerRecord {
                    id: "l1".to_owned(),
                    size_bytes: 10,
                    in_use: true,
                },
                StorageLayerRecord {
                    id: "l2".to_owned(),
                    size_bytes: 20,
                    in_use: false,
                },
            ],
            bind_mounts: Vec::new(),
            logs: Vec::new(),
            port_lookup_failures: 2,
        }
    }

    #[test]
    fn test_summary_counts_match_the_polled_lists() {
        let outcome = outcome();
        let image_count = outcome.images.records.len() as u64;
        let container_count = outcome.containers.records.len() as u64;
        let layer_count = outcome.layers.len() as u64;

        let summary = outcome.into_summary(ScanTracker::default().status());
        assert_eq!(summary.images.count, image_count);
        assert_eq!(summary.containers.count, container_count);
        assert_eq!(summary.containers.total_size_bytes, 100);
        assert_eq!(summary.storage_layers.total_layers, layer_count);
        assert_eq!(summary.volumes.count, 0);
        assert_eq!(summary.warnings.skipped_images, 1);
        assert_eq!(summary.warnings.port_lookup_failures, 2);
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let summary = outcome().into_summary(ScanTracker::default().status());
        let json = serde_json::to_value(&summary).expect("summary must serialize");
        assert_eq!(json["images"]["count"], 1);
        assert_eq!(json["scan"]["is_scanning"], false);
        assert_eq!(json["storage_layers"]["dedup_estimate_percent"], 50);
    }
}
