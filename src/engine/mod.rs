//! Facade over the container engine's API socket.
//!
//! [`EngineClient`] owns the single connection to the engine daemon. Every
//! other component consumes this facade and never touches the raw transport.
//! Each round-trip runs under a bounded timeout; an elapsed timeout or a
//! transport failure surfaces as [`Error`] tagged with the operation name
//! and is never retried here, since retry policy belongs to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::image::ListImagesOptions;
use bollard::models::{
    BuildCache, ContainerInspectResponse, ContainerSummary, EventMessage, ImageSummary,
    SystemDataUsageResponse, SystemInfo, Volume,
};
use bollard::system::{EventsOptions, Version};
use bollard::volume::ListVolumesOptions;
use futures::stream::{Stream, StreamExt, TryStreamExt};

mod error;
mod layers;

pub use error::{Error, Result};
pub use layers::LayerDir;

/// Default engine API socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Fallback engine data root when the daemon does not report one.
const DEFAULT_DATA_ROOT: &str = "/var/lib/docker";

/// Filesystem totals for the mount holding the engine's data root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostDisk {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// One owned connection to the container engine.
#[derive(Debug, Clone)]
pub struct EngineClient {
    docker: Docker,
    timeout: Duration,
}

impl EngineClient {
    /// Opens a client for the engine socket at `socket`.
    ///
    /// The underlying transport connects lazily, so this succeeding does not
    /// prove the daemon is alive; [`EngineClient::ping`] does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the client cannot be constructed for
    /// the given socket path.
    pub fn connect(socket: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let socket = socket.as_ref();
        let docker = Docker::connect_with_unix(
            &socket.to_string_lossy(),
            timeout.as_secs(),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|source| Error::Connect {
            path: socket.to_path_buf(),
            source,
        })?;
        Ok(Self { docker, timeout })
    }

    /// The per-request timeout this client applies.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = std::result::Result<T, bollard::errors::Error>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(Error::Request { op, source }),
            Err(_) => Err(Error::Timeout {
                op,
                timeout: self.timeout,
            }),
        }
    }

    /// Engine version, API version and platform.
    pub async fn identity(&self) -> Result<Version> {
        self.bounded("version", self.docker.version()).await
    }

    /// Liveness probe. `false` means the daemon did not answer in time.
    pub async fn ping(&self) -> bool {
        match self.bounded("ping", self.docker.ping()).await {
            Ok(_) => true,
            Err(err) => {
                log::warn!("engine ping failed: {err}");
                false
            }
        }
    }

    /// Engine-wide info (storage driver, data root, counts).
    pub async fn info(&self) -> Result<SystemInfo> {
        self.bounded("info", self.docker.info()).await
    }

    /// The engine's disk-usage bundle: per-kind raw listings plus the total
    /// layer bytes.
    pub async fn disk_usage(&self) -> Result<SystemDataUsageResponse> {
        self.bounded("disk_usage", self.docker.df()).await
    }

    pub async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        self.bounded("list_images", self.docker.list_images(Some(options)))
            .await
    }

    pub async fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            size: true,
            ..Default::default()
        };
        self.bounded(
            "list_containers",
            self.docker.list_containers(Some(options)),
        )
        .await
    }

    pub async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let response = self
            .bounded(
                "list_volumes",
                self.docker.list_volumes(None::<ListVolumesOptions<String>>),
            )
            .await?;
        for warning in response.warnings.unwrap_or_default() {
            log::warn!("engine volume listing warning: {warning}");
        }
        Ok(response.volumes.unwrap_or_default())
    }

    /// Build-cache records. The engine has no dedicated endpoint for these;
    /// they are part of the disk-usage bundle.
    pub async fn list_build_cache(&self) -> Result<Vec<BuildCache>> {
        Ok(self.disk_usage().await?.build_cache.unwrap_or_default())
    }

    /// Fresh state for one container. This is the refresh-then-read step of
    /// the port lookup: a new round-trip, never a cached view.
    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse> {
        self.bounded(
            "inspect_container",
            self.docker
                .inspect_container(id, None::<InspectContainerOptions>),
        )
        .await
    }

    /// Raw engine events in `[since_epoch, until_epoch]`, oldest first.
    ///
    /// The stream is finite (bounded by `until_epoch`) and not restartable;
    /// calling again issues a new query. The per-request timeout does not
    /// apply to the stream as a whole; use [`EngineClient::events_window`]
    /// for a bounded collection.
    pub fn events(
        &self,
        since_epoch: i64,
        until_epoch: i64,
    ) -> impl Stream<Item = Result<EventMessage>> + '_ {
        let options = EventsOptions::<String> {
            since: chrono::DateTime::from_timestamp(since_epoch, 0),
            until: chrono::DateTime::from_timestamp(until_epoch, 0),
            filters: HashMap::new(),
        };
        self.docker
            .events(Some(options))
            .map(|item| item.map_err(|source| Error::Request { op: "events", source }))
    }

    /// Collects the full event window under the client timeout.
    pub async fn events_window(
        &self,
        since_epoch: i64,
        until_epoch: i64,
    ) -> Result<Vec<EventMessage>> {
        let collect = self.events(since_epoch, until_epoch).try_collect();
        match tokio::time::timeout(self.timeout, collect).await {
            Ok(events) => events,
            Err(_) => Err(Error::Timeout {
                op: "events",
                timeout: self.timeout,
            }),
        }
    }

    /// Overlay2 layer records from the engine's data root.
    ///
    /// Storage layers are not exposed through the engine API, so this scans
    /// the storage driver's directory on disk. When the daemon's filesystem
    /// is not visible from this process (remote engine) the scan yields an
    /// empty set with a warning instead of failing the poll.
    pub async fn list_layers(&self) -> Result<Vec<LayerDir>> {
        let root = self.data_root().await?;
        let overlay = root.join("overlay2");
        let layers = tokio::task::spawn_blocking(move || layers::scan_layer_dirs(&overlay))
            .await
            .expect("layer scan task panicked");
        Ok(layers)
    }

    /// Filesystem totals for the engine's data root, `None` when the
    /// daemon's filesystem is not visible from this process.
    pub async fn host_disk(&self) -> Result<Option<HostDisk>> {
        let root = self.data_root().await?;
        Ok(statvfs_totals(&root))
    }

    async fn data_root(&self) -> Result<PathBuf> {
        let info = self.info().await?;
        Ok(PathBuf::from(
            info.docker_root_dir
                .filter(|root| !root.is_empty())
                .unwrap_or_else(|| DEFAULT_DATA_ROOT.to_owned()),
        ))
    }
}

fn statvfs_totals(path: &Path) -> Option<HostDisk> {
    if !path.exists() {
        log::debug!(
            "engine data root `{}` is not visible from this process",
            path.display()
        );
        return None;
    }
    match nix::sys::statvfs::statvfs(path) {
        Ok(stat) => {
            let fragment = stat.fragment_size() as u64;
            Some(HostDisk {
                total_bytes: stat.blocks() as u64 * fragment,
                available_bytes: stat.blocks_available() as u64 * fragment,
            })
        }
        Err(err) => {
            log::warn!("statvfs failed for `{}`: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statvfs_totals_missing_path() {
        assert_eq!(statvfs_totals(Path::new("/definitely/does/not/exist")), None);
    }

    #[test]
    fn test_statvfs_totals_reports_nonzero_total() {
        let disk = statvfs_totals(Path::new("/")).expect("statvfs on / should work");
        assert!(disk.total_bytes > 0);
        assert!(disk.available_bytes <= disk.total_bytes);
    }
}
