// # File Route Info Store
//
// File-based implementation of RouteInfoStore with crash recovery.
//
// ## Purpose
//
// Keeps the operator route baseline and the discovered-route timestamps
// across daemon restarts, so routes learned before a restart can still be
// found stale afterwards.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "route_info": {
//     "control": ["10.0.0.0/8"],
//     "discovered": {
//       "example.com": {
//         "routes": { "192.0.2.1/32": "2025-01-09T12:00:00Z" },
//         "last_cleanup": "2025-01-09T12:00:00Z"
//       }
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::route_store::{RouteInfo, RouteInfoStore};

/// Route info file format version
const ROUTE_FILE_VERSION: &str = "1.0";

/// File-based route info store with crash recovery
///
/// Every update is written through to disk immediately. If a write fails the
/// snapshot stays cached and marked dirty, and the next update or
/// [`RouteInfoStore::flush`] retries it.
#[derive(Debug)]
pub struct FileRouteInfoStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    info: RouteInfo,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RouteFileFormat {
    version: String,
    route_info: RouteInfo,
}

impl FileRouteInfoStore {
    /// Create or load a file route info store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing file
    /// 3. If it is corrupt, try the backup (and restore the main file from it)
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        if path.is_dir() {
            return Err(Error::invalid_input(format!(
                "Route file path {} is a directory",
                path.display()
            )));
        }

        let info = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState { info, dirty: false })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<RouteInfo, Error> {
        let err = match Self::load(path).await {
            Ok(info) => {
                tracing::debug!(
                    "Loaded route info: {} control routes, {} domains",
                    info.control.len(),
                    info.discovered.len()
                );
                return Ok(info);
            }
            Err(Error::Json(e)) => e,
            Err(e) => return Err(e),
        };

        tracing::warn!(
            "Route file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty route info.");
            return Ok(RouteInfo::default());
        }

        match Self::load(&backup_path).await {
            Ok(info) => {
                tracing::info!("Recovered route info from backup");
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore route file from backup: {}", e);
                }
                Ok(info)
            }
            Err(e) => {
                tracing::error!("Backup also unreadable: {}. Starting with empty route info.", e);
                Ok(RouteInfo::default())
            }
        }
    }

    async fn load(path: &Path) -> Result<RouteInfo, Error> {
        if !path.exists() {
            tracing::debug!("Route file does not exist: {}", path.display());
            return Ok(RouteInfo::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::route_store(format!("Failed to read route file {}: {}", path.display(), e))
        })?;

        let file: RouteFileFormat = serde_json::from_str(&content)?;

        if file.version != ROUTE_FILE_VERSION {
            tracing::warn!(
                "Route file version mismatch: expected {}, got {}. Attempting to load anyway.",
                ROUTE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.route_info)
    }

    /// Write the cached snapshot atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let file = RouteFileFormat {
            version: ROUTE_FILE_VERSION.to_string(),
            route_info: state.info.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::route_store(format!("Failed to serialize route info: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut tmp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::route_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            tmp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::route_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            tmp.sync_all().await.map_err(|e| {
                Error::route_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::route_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("Route info written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RouteInfoStore for FileRouteInfoStore {
    async fn read_route_info(&self) -> Result<RouteInfo, Error> {
        Ok(self.state.read().await.info.clone())
    }

    async fn update_route_info(&self, info: &RouteInfo) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            state.info = info.clone();
            state.dirty = true;
        }

        // Immediate write for durability
        self.write_state().await
    }

    async fn flush(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}
