use crate::adapter::StorageAdapter;
use crate::errors::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filesystem-backed adapter storing one file per key under a root
/// directory. Namespace isolation comes from the root itself.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    root: PathBuf,
}

impl FileAdapter {
    /// Construct a new adapter rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::InvalidFieldState {
                    reason: format!("storage key `{key}` contains an unusable path segment"),
                });
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn collect_keys(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(io_error(err)),
        };

        for entry in entries {
            let entry = entry.map_err(io_error)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry.file_type().map_err(io_error)?;
            if file_type.is_dir() {
                self.collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }
        Ok(())
    }
}

fn io_error(err: std::io::Error) -> Error {
    Error::UnhandledBackend {
        code: err.raw_os_error().unwrap_or(-1),
        detail: err.to_string(),
    }
}

impl StorageAdapter for FileAdapter {
    fn load(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for_key(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::ItemNotFound {
                entity: key.to_string(),
            }),
            Err(err) => Err(io_error(err)),
        }
    }

    fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;
        keys.sort();

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push((key.clone(), self.load(&key)?));
        }
        Ok(out)
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for_key(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut file = fs::File::create(&path).map_err(io_error)?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(io_error)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for_key(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::ItemNotFound {
                entity: key.to_string(),
            }),
            Err(err) => Err(io_error(err)),
        }
    }

    fn delete_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(err)),
        }
        fs::create_dir_all(&self.root).map_err(io_error)
    }
}
