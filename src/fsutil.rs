use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error that occurs when a filesystem entry cannot be inspected.
#[derive(Debug, thiserror::Error)]
#[error("failed to inspect `{path}`: {source}")]
pub struct InspectError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Returns the size in bytes of the regular file at `path`.
///
/// # Errors
///
/// Returns an [`InspectError`] if the file metadata cannot be read.
pub fn file_size(path: impl AsRef<Path>) -> Result<u64, InspectError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|source| InspectError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(metadata.len())
}

/// Sums the size in bytes of every regular file under `path`.
///
/// Symlinks are not followed, so layer directories sharing a lower dir are
/// not counted twice. Entries that disappear or become unreadable mid-walk
/// are skipped; only an unreadable root is an error.
///
/// # Errors
///
/// Returns an [`InspectError`] if `path` itself cannot be read.
pub fn dir_size(path: impl AsRef<Path>) -> Result<u64, InspectError> {
    let root = path.as_ref().to_path_buf();
    let mut total = 0u64;
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if dir == root => return Err(InspectError { path: dir, source }),
            Err(err) => {
                log::debug!("skipping unreadable directory `{}`: {}", dir.display(), err);
                continue;
            }
        };
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_dir() {
                stack.push(entry.path());
            } else if metadata.is_file() {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}

/// Size in bytes of whatever lives at `path`: a directory walk for
/// directories, the file length otherwise. Inaccessible paths count as 0.
pub fn path_size(path: impl AsRef<Path>) -> u64 {
    let path = path.as_ref();
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            log::debug!("`{}` is not accessible: {}", path.display(), err);
            return 0;
        }
    };
    if metadata.is_dir() {
        dir_size(path).unwrap_or_else(|err| {
            log::debug!("{err}");
            0
        })
    } else {
        metadata.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("data.bin");
        fs::write(&path, vec![0u8; 1024]).unwrap();
        assert_eq!(file_size(&path).unwrap(), 1024);
    }

    #[test]
    fn test_file_size_missing_path() {
        let err = file_size("/definitely/does/not/exist").unwrap_err();
        assert_eq!(err.path, PathBuf::from("/definitely/does/not/exist"));
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        let nested = dir.path().join("nested/deeper");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("b"), vec![0u8; 250]).unwrap();
        assert_eq!(dir_size(dir.path()).unwrap(), 350);
    }

    #[test]
    fn test_dir_size_empty_dir() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        assert_eq!(dir_size(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_dir_size_missing_root_is_an_error() {
        assert!(dir_size("/definitely/does/not/exist").is_err());
    }

    #[test]
    fn test_path_size_inaccessible_is_zero() {
        assert_eq!(path_size("/definitely/does/not/exist"), 0);
    }

    #[test]
    fn test_path_size_on_file_and_dir() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let file = dir.path().join("f");
        fs::write(&file, vec![0u8; 42]).unwrap();
        assert_eq!(path_size(&file), 42);
        assert_eq!(path_size(dir.path()), 42);
    }
}
