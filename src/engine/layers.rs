use std::path::Path;

use crate::fsutil;

/// Raw record for one overlay2 layer directory.
///
/// The engine API does not report storage layers, so these come from
/// scanning the storage driver's directory under the engine data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDir {
    pub id: String,
    pub size_bytes: u64,
    pub in_use: bool,
}

/// Scans `overlay_root` for layer directories.
///
/// A layer's size is the walk of its `diff/` tree (the layer's own data,
/// excluding the union view). A layer counts as in use while its `merged/`
/// mount point exists, which the driver only keeps for mounted layers.
///
/// An unreadable root (remote daemon, missing privileges) yields an empty
/// set with a warning instead of an error: the rest of the inventory is
/// still valid without layer data.
pub(super) fn scan_layer_dirs(overlay_root: &Path) -> Vec<LayerDir> {
    let entries = match std::fs::read_dir(overlay_root) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!(
                "storage layer directory `{}` is not readable: {}",
                overlay_root.display(),
                err
            );
            return Vec::new();
        }
    };

    let mut layers = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(id) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        // `l` holds the short-name symlinks, not a layer
        if id == "l" {
            continue;
        }
        let diff = path.join("diff");
        let size_bytes = if diff.is_dir() {
            fsutil::dir_size(&diff).unwrap_or_else(|err| {
                log::debug!("{err}");
                0
            })
        } else {
            0
        };
        let in_use = path.join("merged").is_dir();
        layers.push(LayerDir {
            id,
            size_bytes,
            in_use,
        });
    }
    layers.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then(a.id.cmp(&b.id)));
    layers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_layer(root: &Path, id: &str, diff_bytes: usize, mounted: bool) {
        let layer = root.join(id);
        let diff = layer.join("diff");
        std::fs::create_dir_all(&diff).unwrap();
        std::fs::write(diff.join("data"), vec![0u8; diff_bytes]).unwrap();
        if mounted {
            std::fs::create_dir_all(layer.join("merged")).unwrap();
        }
    }

    #[test]
    fn test_scan_layer_dirs() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        make_layer(dir.path(), "aaa", 100, true);
        make_layer(dir.path(), "bbb", 300, false);
        // the short-name link directory is not a layer
        std::fs::create_dir_all(dir.path().join("l")).unwrap();

        let layers = scan_layer_dirs(dir.path());
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].id, "bbb");
        assert_eq!(layers[0].size_bytes, 300);
        assert!(!layers[0].in_use);
        assert_eq!(layers[1].id, "aaa");
        assert_eq!(layers[1].size_bytes, 100);
        assert!(layers[1].in_use);
    }

    #[test]
    fn test_scan_layer_dirs_missing_root_is_empty() {
        let layers = scan_layer_dirs(Path::new("/definitely/does/not/exist"));
        assert!(layers.is_empty());
    }

    #[test]
    fn test_scan_layer_dirs_layer_without_diff() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("ccc")).unwrap();
        let layers = scan_layer_dirs(dir.path());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].size_bytes, 0);
        assert!(!layers[0].in_use);
    }
}
