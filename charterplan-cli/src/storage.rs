//! File-backed implementations of the core loader and storage traits.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use charterplan_core::{
    Catalog, CatalogError, CatalogLoader, ImportError, SessionRecord, SessionStorage,
};

/// Loads the catalog from a JSON file on disk.
pub struct FileCatalogLoader {
    path: PathBuf,
}

impl FileCatalogLoader {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogFileError {
    #[error("failed to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid catalog {}: {source}", .path.display())]
    Invalid { path: PathBuf, source: CatalogError },
}

impl CatalogLoader for FileCatalogLoader {
    type Error = CatalogFileError;

    fn load_catalog(&self) -> Result<Catalog, Self::Error> {
        let json = fs::read_to_string(&self.path).map_err(|source| CatalogFileError::Io {
            path: self.path.clone(),
            source,
        })?;
        Catalog::from_json(&json).map_err(|source| CatalogFileError::Invalid {
            path: self.path.clone(),
            source,
        })
    }
}

/// Session storage keeping one `<name>.json` file per session under a directory.
pub struct FileSessionStorage {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid session name {0:?}")]
    InvalidName(String),
    #[error("storage error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unreadable session {}: {source}", .path.display())]
    Import { path: PathBuf, source: ImportError },
}

impl FileSessionStorage {
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
        if !valid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.json")))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl SessionStorage for FileSessionStorage {
    type Error = StorageError;

    fn save_session(&self, name: &str, record: &SessionRecord) -> Result<(), Self::Error> {
        let path = self.path_for(name)?;
        let json = record.to_json()?;
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        // Write beside the target and rename so a crash never leaves half a file.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(io_error(&staging))?;
        fs::rename(&staging, &path).map_err(io_error(&path))?;
        log::info!("saved session {name} to {}", path.display());
        Ok(())
    }

    fn load_session(&self, name: &str) -> Result<Option<SessionRecord>, Self::Error> {
        let path = self.path_for(name)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        SessionRecord::from_json(&json)
            .map(Some)
            .map_err(|source| StorageError::Import { path, source })
    }

    fn delete_session(&self, name: &str) -> Result<(), Self::Error> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Err(err) if err.kind() != ErrorKind::NotFound => {
                Err(StorageError::Io { path, source: err })
            }
            _ => Ok(()),
        }
    }
}
