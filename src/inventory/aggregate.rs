//! Rollups over the normalized, linked entity set of one poll.

use bollard::models::SystemDataUsageResponse;

use crate::engine::HostDisk;

use super::models::{
    BindMountRecord, BuildCacheEntry, ContainerRecord, DiskUsageTotals, ImageRecord,
    LayerBreakdown, LogFileRecord, ResourceTotals, StorageLayerRecord, VolumeRecord,
};
use super::normalize::non_negative;

/// Upper bound on the dedup estimate.
const DEDUP_ESTIMATE_CAP: u64 = 85;

pub fn image_totals(records: &[ImageRecord]) -> ResourceTotals {
    ResourceTotals {
        count: records.len() as u64,
        total_size_bytes: records.iter().map(|record| record.size_bytes).sum(),
    }
}

pub fn container_totals(records: &[ContainerRecord]) -> ResourceTotals {
    ResourceTotals {
        count: records.len() as u64,
        total_size_bytes: records.iter().map(|record| record.size_rw_bytes).sum(),
    }
}

pub fn volume_totals(records: &[VolumeRecord]) -> ResourceTotals {
    ResourceTotals {
        count: records.len() as u64,
        total_size_bytes: records.iter().map(|record| record.size_bytes).sum(),
    }
}

pub fn build_cache_totals(records: &[BuildCacheEntry]) -> ResourceTotals {
    ResourceTotals {
        count: records.len() as u64,
        total_size_bytes: records.iter().map(|record| record.size_bytes).sum(),
    }
}

pub fn log_totals(records: &[LogFileRecord]) -> ResourceTotals {
    ResourceTotals {
        count: records.len() as u64,
        total_size_bytes: records.iter().map(|record| record.size_bytes).sum(),
    }
}

pub fn bind_mount_totals(records: &[BindMountRecord]) -> ResourceTotals {
    ResourceTotals {
        count: records.len() as u64,
        total_size_bytes: records.iter().map(|record| record.size_bytes).sum(),
    }
}

pub fn layer_breakdown(layers: &[StorageLayerRecord]) -> LayerBreakdown {
    let total_layers = layers.len() as u64;
    let active_layers = layers.iter().filter(|layer| layer.in_use).count() as u64;
    let unused_layers = total_layers - active_layers;
    LayerBreakdown {
        total_layers,
        active_layers,
        unused_layers,
        total_size_bytes: layers.iter().map(|layer| layer.size_bytes).sum(),
        dedup_estimate_percent: dedup_estimate(total_layers, unused_layers),
    }
}

/// Heuristic sharing estimate, not a measurement: the fraction of layers
/// not currently referenced approximates how much the copy-on-write driver
/// saves through sharing, capped at [`DEDUP_ESTIMATE_CAP`] percent. 0 when
/// there are no layers.
pub fn dedup_estimate(total_layers: u64, unused_layers: u64) -> u64 {
    if total_layers == 0 {
        return 0;
    }
    (unused_layers * 100 / total_layers).min(DEDUP_ESTIMATE_CAP)
}

/// Disk totals for the dashboard gauge.
///
/// The filesystem view of the engine's data root is preferred when visible
/// (`used = total - available`). Otherwise the engine's own disk-usage
/// bundle provides the used bytes, and total/available/percent stay
/// explicitly unknown rather than silently zero.
pub fn disk_usage(host: Option<HostDisk>, df: &SystemDataUsageResponse) -> DiskUsageTotals {
    match host {
        Some(host) if host.total_bytes > 0 => {
            let used = host.total_bytes.saturating_sub(host.available_bytes);
            DiskUsageTotals {
                used_bytes: used,
                available_bytes: Some(host.available_bytes),
                total_bytes: Some(host.total_bytes),
                used_percent: Some(used as f64 * 100.0 / host.total_bytes as f64),
            }
        }
        _ => DiskUsageTotals {
            used_bytes: df_used_bytes(df),
            available_bytes: None,
            total_bytes: None,
            used_percent: None,
        },
    }
}

fn df_used_bytes(df: &SystemDataUsageResponse) -> u64 {
    let layers = df.layers_size.map_or(0, non_negative);
    let containers: u64 = df
        .containers
        .iter()
        .flatten()
        .filter_map(|container| container.size_rw)
        .map(non_negative)
        .sum();
    let volumes: u64 = df
        .volumes
        .iter()
        .flatten()
        .filter_map(|volume| volume.usage_data.as_ref())
        .map(|usage| non_negative(usage.size))
        .sum();
    let build_cache: u64 = df
        .build_cache
        .iter()
        .flatten()
        .filter_map(|entry| entry.size)
        .map(non_negative)
        .sum();
    layers + containers + volumes + build_cache
}

#[cfg(test)]
mod tests {
    use bollard::models::{ContainerSummary, Volume, VolumeUsageData};

    use super::*;

    fn layer(id: &str, size_bytes: u64, in_use: bool) -> StorageLayerRecord {
        StorageLayerRecord {
            id: id.to_owned(),
            size_bytes,
            in_use,
        }
    }

    #[test]
    fn test_dedup_estimate_zero_layers_is_zero() {
        assert_eq!(dedup_estimate(0, 0), 0);
    }

    #[test]
    fn test_dedup_estimate_scenario_hundred_layers_forty_active() {
        // 100 layers, 40 active -> 60 unused -> min(85, 60) = 60
        assert_eq!(dedup_estimate(100, 60), 60);
    }

    #[test]
    fn test_dedup_estimate_caps_at_85() {
        assert_eq!(dedup_estimate(100, 100), 85);
        assert_eq!(dedup_estimate(10, 9), 85);
    }

    #[test]
    fn test_dedup_estimate_stays_in_range() {
        for total in 0..50u64 {
            for unused in 0..=total {
                let estimate = dedup_estimate(total, unused);
                assert!(estimate <= 85, "estimate {estimate} out of range");
            }
        }
    }

    #[test]
    fn test_layer_breakdown() {
        let layers = vec![
            layer("a", 100, true),
            layer("b", 200, false),
            layer("c", 300, false),
        ];
        let breakdown = layer_breakdown(&layers);
        assert_eq!(breakdown.total_layers, 3);
        assert_eq!(breakdown.active_layers, 1);
        assert_eq!(breakdown.unused_layers, 2);
        assert_eq!(breakdown.total_size_bytes, 600);
        assert_eq!(breakdown.dedup_estimate_percent, 66);
    }

    #[test]
    fn test_totals_count_matches_list_length() {
        let images = vec![
            ImageRecord {
                id: "a".to_owned(),
                repo_tags: Vec::new(),
                repository: "<none>".to_owned(),
                tag: "<none>".to_owned(),
                created: None,
                size_bytes: 10,
                virtual_size_bytes: 10,
                containers: 0,
            },
            ImageRecord {
                id: "b".to_owned(),
                repo_tags: Vec::new(),
                repository: "<none>".to_owned(),
                tag: "<none>".to_owned(),
                created: None,
                size_bytes: 32,
                virtual_size_bytes: 32,
                containers: 0,
            },
        ];
        let totals = image_totals(&images);
        assert_eq!(totals.count, images.len() as u64);
        assert_eq!(totals.total_size_bytes, 42);
    }

    #[test]
    fn test_disk_usage_prefers_host_view() {
        let totals = disk_usage(
            Some(HostDisk {
                total_bytes: 1000,
                available_bytes: 250,
            }),
            &SystemDataUsageResponse::default(),
        );
        assert_eq!(totals.used_bytes, 750);
        assert_eq!(totals.total_bytes, Some(1000));
        assert_eq!(totals.available_bytes, Some(250));
        assert_eq!(totals.used_percent, Some(75.0));
    }

    #[test]
    fn test_disk_usage_degrades_to_df_with_unknowns() {
        let df = SystemDataUsageResponse {
            layers_size: Some(500),
            containers: Some(vec![ContainerSummary {
                size_rw: Some(100),
                ..Default::default()
            }]),
            volumes: Some(vec![Volume {
                usage_data: Some(VolumeUsageData {
                    size: 200,
                    ref_count: 1,
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let totals = disk_usage(None, &df);
        assert_eq!(totals.used_bytes, 800);
        assert_eq!(totals.total_bytes, None);
        assert_eq!(totals.available_bytes, None);
        assert_eq!(totals.used_percent, None);
    }
}
