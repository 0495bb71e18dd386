//! Change notifications.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// What a write transaction changed.
///
/// Accumulated by the session while the write lock is held and handed to
/// listeners when the outermost write lock is released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvent {
    cleared_files: BTreeSet<PathBuf>,
    written_files: BTreeSet<PathBuf>,
    reloaded: bool,
    cleared: bool,
}

impl ChangeEvent {
    /// Creates an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes that the index content for `path` was removed.
    pub fn file_cleared(&mut self, path: impl AsRef<Path>) {
        self.cleared_files.insert(path.as_ref().to_path_buf());
    }

    /// Notes that the index content for `path` was (re)written.
    pub fn file_written(&mut self, path: impl AsRef<Path>) {
        self.written_files.insert(path.as_ref().to_path_buf());
    }

    /// Notes that the whole index was reloaded from disk.
    pub fn set_reloaded(&mut self) {
        self.reloaded = true;
    }

    /// Notes that the whole index was emptied.
    pub fn set_cleared(&mut self) {
        self.cleared = true;
    }

    /// Returns the files whose content was removed.
    pub fn cleared_files(&self) -> &BTreeSet<PathBuf> {
        &self.cleared_files
    }

    /// Returns the files whose content was written.
    pub fn written_files(&self) -> &BTreeSet<PathBuf> {
        &self.written_files
    }

    /// Returns true if the index was reloaded.
    pub fn is_reloaded(&self) -> bool {
        self.reloaded
    }

    /// Returns true if the index was emptied.
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.cleared_files.is_empty()
            && self.written_files.is_empty()
            && !self.reloaded
            && !self.cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates() {
        let mut event = ChangeEvent::new();
        assert!(event.is_empty());

        event.file_written("src/a.rs");
        event.file_written("src/a.rs");
        event.file_cleared("src/b.rs");
        assert!(!event.is_empty());
        assert_eq!(event.written_files().len(), 1);
        assert!(event.cleared_files().contains(Path::new("src/b.rs")));

        let mut flags = ChangeEvent::new();
        flags.set_cleared();
        assert!(!flags.is_empty());
        assert!(flags.is_cleared());
        assert!(!flags.is_reloaded());
    }
}
