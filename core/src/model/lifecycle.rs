//! Model lifecycle: the single published artifact slot
//!
//! Readers take a snapshot handle and keep using it for the whole request even
//! if a newer artifact is published meanwhile. Publishing first persists the
//! artifact (when a store is configured) and then swaps the slot, so a failed
//! write never replaces the current model.

use arc_swap::ArcSwapOption;
use std::fs;
use std::io::{ErrorKind, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::artifact::ModelArtifact;
use crate::error::{CoreError, CoreResult};

/// Shared, immutable view of a published artifact
#[derive(Debug, Clone)]
pub struct ArtifactHandle(Arc<ModelArtifact>);

impl ArtifactHandle {
    pub fn id(&self) -> Uuid {
        self.0.id
    }
}

impl Deref for ArtifactHandle {
    type Target = ModelArtifact;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Observable state of the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Empty,
    Ready(Uuid),
}

impl LifecycleState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleState::Ready(_))
    }
}

/// On-disk home of the published artifact
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored artifact via write, fsync, rename and a directory fsync
    pub fn persist(&self, artifact: &ModelArtifact) -> CoreResult<()> {
        let bytes = artifact.encode()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| CoreError::internal("create artifact directory", e))?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file =
            fs::File::create(&temp_path).map_err(|e| CoreError::internal("create artifact", e))?;
        file.write_all(&bytes)
            .map_err(|e| CoreError::internal("write artifact", e))?;
        file.sync_all()
            .map_err(|e| CoreError::internal("sync artifact", e))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            CoreError::internal("install artifact", e)
        })?;
        sync_parent(&self.path).map_err(|e| CoreError::internal("sync artifact directory", e))?;

        debug!("Persisted artifact {} to {}", artifact.id, self.path.display());
        Ok(())
    }

    /// Read the stored artifact; `None` when nothing has been stored yet
    pub fn load(&self) -> CoreResult<Option<ModelArtifact>> {
        match fs::read(&self.path) {
            Ok(bytes) => ModelArtifact::decode(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::internal("read artifact", e)),
        }
    }
}

/// Flush the directory entry of `path` so a completed rename survives a crash
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Owner of the currently published artifact
pub struct ModelLifecycleManager {
    slot: ArcSwapOption<ModelArtifact>,
    store: Option<ArtifactStore>,
    publish_lock: Mutex<()>,
}

impl ModelLifecycleManager {
    /// Memory-only lifecycle, starting empty
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            store: None,
            publish_lock: Mutex::new(()),
        }
    }

    /// Persistent lifecycle; restores a previously published artifact if one exists
    pub fn open(store: ArtifactStore) -> CoreResult<Self> {
        let restored = store.load()?;
        match &restored {
            Some(artifact) => info!(
                "Restored model {} from {}",
                artifact.id,
                store.path().display()
            ),
            None => info!("No model artifact at {}, starting untrained", store.path().display()),
        }

        Ok(Self {
            slot: ArcSwapOption::new(restored.map(Arc::new)),
            store: Some(store),
            publish_lock: Mutex::new(()),
        })
    }

    pub fn state(&self) -> LifecycleState {
        match &*self.slot.load() {
            Some(artifact) => LifecycleState::Ready(artifact.id),
            None => LifecycleState::Empty,
        }
    }

    /// Make `artifact` the current model
    pub fn publish(&self, artifact: ModelArtifact) -> CoreResult<ArtifactHandle> {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(store) = &self.store {
            if let Err(e) = store.persist(&artifact) {
                warn!("Keeping previous model, artifact {} not persisted: {}", artifact.id, e);
                return Err(e);
            }
        }

        let published = Arc::new(artifact);
        self.slot.store(Some(Arc::clone(&published)));
        info!("Published model {}", published.id);
        Ok(ArtifactHandle(published))
    }

    /// Snapshot of the current model
    pub fn acquire_read(&self) -> CoreResult<ArtifactHandle> {
        self.slot
            .load_full()
            .map(ArtifactHandle)
            .ok_or(CoreError::NoModelTrained)
    }
}

impl Default for ModelLifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
