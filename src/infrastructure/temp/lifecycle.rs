//! Temp file ownership with exactly-once release.
//!
//! Every request owns one temp file. The file is deleted by the first of:
//! an explicit [`ReleaseHandle::release`] call from any clone of the handle,
//! or the drop of the last clone. Crash leftovers are left to the OS temp
//! directory conventions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempPath;
use tracing::{debug, warn};

use crate::domain::errors::ProxyError;

const TEMP_PREFIX: &str = "media-proxy-";

/// Creates request-scoped temp files.
#[derive(Debug, Clone, Default)]
pub struct TempAllocator {
    dir: Option<PathBuf>,
}

impl TempAllocator {
    /// Allocates in `dir`, or the OS temp directory when `None`.
    #[must_use]
    pub const fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Creates an empty temp file.
    ///
    /// # Errors
    /// Returns error if the file cannot be created.
    pub fn acquire(&self) -> Result<TempResource, ProxyError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);

        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();

        debug!(path = %path.display(), "Allocated temp file");

        Ok(TempResource {
            path,
            release: ReleaseHandle {
                slot: Arc::new(Mutex::new(Some(temp_path))),
            },
        })
    }
}

/// A temp file plus the handle that deletes it.
#[derive(Debug)]
pub struct TempResource {
    path: PathBuf,
    release: ReleaseHandle,
}

impl TempResource {
    /// Returns the file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a clone of the release handle.
    #[must_use]
    pub fn release_handle(&self) -> ReleaseHandle {
        self.release.clone()
    }

    /// Deletes the file now. See [`ReleaseHandle::release`].
    pub fn release(&self) -> bool {
        self.release.release()
    }
}

/// Shared, idempotent deleter for one temp file.
#[derive(Clone)]
pub struct ReleaseHandle {
    slot: Arc<Mutex<Option<TempPath>>>,
}

impl ReleaseHandle {
    /// Deletes the file if no one has yet.
    ///
    /// Returns true only for the call that performed the deletion.
    /// Removal failures are logged, never raised.
    pub fn release(&self) -> bool {
        let Some(temp_path) = self.slot.lock().take() else {
            return false;
        };

        let path = temp_path.to_path_buf();
        match temp_path.close() {
            Ok(()) => debug!(path = %path.display(), "Released temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
        }
        true
    }

    /// Returns true once the file has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.slot.lock().is_none()
    }
}

impl std::fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("released", &self.is_released())
            .finish()
    }
}
