//! Process-wide registry of open database files.
//!
//! A database file is owned by exactly one [`crate::Database`] at a time.
//! Opening a path that is already registered fails instead of handing out a
//! second writer over the same bytes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use parking_lot::Mutex;

use nd_common::error::{NdError, NdResult};

static OPEN_FILES: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Registration of one open file. Unregisters on drop.
#[derive(Debug)]
pub(crate) struct OpenFileGuard {
    path: PathBuf,
}

impl OpenFileGuard {
    /// Registers `path`, which must already be canonical.
    pub(crate) fn register(path: &Path) -> NdResult<Self> {
        let mut open = OPEN_FILES.lock();
        if !open.insert(path.to_path_buf()) {
            return Err(NdError::AlreadyOpen {
                path: path.display().to_string(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for OpenFileGuard {
    fn drop(&mut self) {
        OPEN_FILES.lock().remove(&self.path);
    }
}
