// # File Publisher
//
// File-based implementation of StatePublisher with crash recovery.
//
// ## Purpose
//
// Persists the candidate list across restarts, so that a device that
// reboots comes back to the configuration that last worked, with its test
// history, before any configuration source speaks again. The network
// status and the individually published candidates are written alongside
// for readers on the same host.
//
// ## Layout
//
// ```text
// <dir>/DevicePortConfigList/global.json
// <dir>/DeviceNetworkStatus/global.json
// <dir>/DevicePortConfig/<key>.json
// ```
//
// ## Crash Recovery
//
// - Atomic writes: every object uses write-then-rename
// - Automatic backup: the previous version is kept in `.backup`
// - Recovery: a list file that fails to parse falls back to its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "object": { "current_index": 0, "port_configs": [ ... ] }
// }
// ```

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::{GLOBAL_KEY, PublisherFactory, StatePublisher};
use crate::types::{DeviceNetworkStatus, DevicePortConfig, DevicePortConfigList};

/// Published file format version
const PUBLISH_FILE_VERSION: &str = "1.0";

const LIST_DIR: &str = "DevicePortConfigList";
const STATUS_DIR: &str = "DeviceNetworkStatus";
const PORT_CONFIG_DIR: &str = "DevicePortConfig";

#[derive(Debug, Serialize, serde::Deserialize)]
struct PublishedFile<T> {
    version: String,
    object: T,
}

/// Directory-backed publisher
///
/// # Example
///
/// ```rust,no_run
/// use nim_core::state::FilePublisher;
/// use nim_core::traits::StatePublisher;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let publisher = FilePublisher::new("/persist/status/nim").await?;
///     let restored = publisher.load_port_config_list().await?;
///     println!("restored {} candidates", restored.map(|l| l.len()).unwrap_or(0));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FilePublisher {
    dir: PathBuf,
    // Serializes writers so backup and rename of one object never interleave
    write_lock: Mutex<()>,
}

impl FilePublisher {
    /// Create the publisher, creating the directory layout if needed
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();

        for sub in [LIST_DIR, STATUS_DIR, PORT_CONFIG_DIR] {
            let path = dir.join(sub);
            fs::create_dir_all(&path).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create publish directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn object_path(&self, sub: &str, key: &str) -> PathBuf {
        self.dir.join(sub).join(format!("{}.json", key))
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Write `object` to `path` atomically, keeping the previous version
    async fn write_object<T: Serialize>(&self, path: &Path, object: &T) -> Result<(), Error> {
        let file = PublishedFile {
            version: PUBLISH_FILE_VERSION.to_string(),
            object,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::publish(format!("Failed to serialize {}: {}", path.display(), e)))?;

        let _guard = self.write_lock.lock().await;

        let temp_path = Self::temp_path(path);
        {
            let mut f = fs::File::create(&temp_path).await.map_err(|e| {
                Error::publish(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            f.write_all(json.as_bytes()).await.map_err(|e| {
                Error::publish(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            f.flush().await.map_err(|e| {
                Error::publish(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if fs::try_exists(path).await.unwrap_or(false) {
            if let Err(e) = fs::copy(path, Self::backup_path(path)).await {
                tracing::warn!("Failed to create backup of {}: {}", path.display(), e);
            }
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::publish(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("Published {}", path.display());
        Ok(())
    }

    async fn read_object<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!("Published file does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::publish(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let file: PublishedFile<T> = serde_json::from_str(&content)?;
        if file.version != PUBLISH_FILE_VERSION {
            tracing::warn!(
                "Published file version mismatch in {}: expected {}, got {}. \
                Attempting to load anyway.",
                path.display(),
                PUBLISH_FILE_VERSION,
                file.version
            );
        }
        Ok(Some(file.object))
    }

    /// Read `path`, falling back to its backup when the file is corrupted
    async fn read_with_recovery<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
        match Self::read_object(path).await {
            Ok(object) => Ok(object),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "{} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );
                let backup_path = Self::backup_path(path);
                match Self::read_object(&backup_path).await {
                    Ok(Some(object)) => {
                        tracing::info!("Recovered {} from backup", path.display());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore {} from backup: {}",
                                path.display(),
                                restore_err
                            );
                        }
                        Ok(Some(object))
                    }
                    Ok(None) => {
                        tracing::warn!("No backup file found. Starting with nothing.");
                        Ok(None)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with nothing.",
                            backup_err
                        );
                        Ok(None)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl StatePublisher for FilePublisher {
    async fn publish_port_config_list(&self, list: &DevicePortConfigList) -> Result<(), Error> {
        let path = self.object_path(LIST_DIR, GLOBAL_KEY);
        self.write_object(&path, list).await
    }

    async fn load_port_config_list(&self) -> Result<Option<DevicePortConfigList>, Error> {
        let path = self.object_path(LIST_DIR, GLOBAL_KEY);
        let list: Option<DevicePortConfigList> = Self::read_with_recovery(&path).await?;
        if let Some(list) = &list {
            tracing::debug!("Loaded persisted list: {} candidates", list.len());
        }
        Ok(list)
    }

    async fn publish_network_status(&self, status: &DeviceNetworkStatus) -> Result<(), Error> {
        let path = self.object_path(STATUS_DIR, GLOBAL_KEY);
        self.write_object(&path, status).await
    }

    async fn network_status(&self) -> Result<Option<DeviceNetworkStatus>, Error> {
        let path = self.object_path(STATUS_DIR, GLOBAL_KEY);
        Self::read_with_recovery(&path).await
    }

    async fn publish_port_config(&self, key: &str, dpc: &DevicePortConfig) -> Result<(), Error> {
        let path = self.object_path(PORT_CONFIG_DIR, key);
        self.write_object(&path, dpc).await
    }

    async fn unpublish_port_config(&self, key: &str) -> Result<(), Error> {
        let path = self.object_path(PORT_CONFIG_DIR, key);
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::publish(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every publish is written through
        Ok(())
    }
}

/// Factory registered under "file"
///
/// Expects the serialized `PublisherConfig::File`, i.e. `{"type": "file", "dir": ...}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilePublisherFactory;

#[async_trait]
impl PublisherFactory for FilePublisherFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn StatePublisher>, Error> {
        let dir = config
            .get("dir")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::config("File publisher requires a 'dir'"))?;
        Ok(Box::new(FilePublisher::new(dir).await?))
    }
}
