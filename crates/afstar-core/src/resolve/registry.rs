use std::collections::HashMap;

use crate::directory::DirectoryEntry;
use crate::dump::ROOT_VNODE;

/// Archive path of a volume's root directory
pub const ROOT_PATH: &str = ".";

/// Map: vnode id -> path.
///
/// Directories map to their full archive path, leaves to their bare name
/// (joined with the parent's path when the entry is written).
#[derive(Debug, Default)]
pub struct PathRegistry {
    paths: HashMap<u32, String>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path or name for `id`. A later registration replaces an
    /// earlier one.
    pub fn register(&mut self, id: u32, value: impl Into<String>) {
        self.paths.insert(id, value.into());
    }

    /// Look up `id`. The root vnode always resolves to [`ROOT_PATH`].
    pub fn resolve(&self, id: u32) -> Option<&str> {
        if id == ROOT_VNODE {
            return Some(ROOT_PATH);
        }
        self.paths.get(&id).map(String::as_str)
    }

    /// Register the children of the directory at `parent_path`; returns how
    /// many were registered
    pub fn register_children(&mut self, parent_path: &str, entries: &[DirectoryEntry]) -> usize {
        for entry in entries {
            if entry.is_directory() {
                self.register(entry.vnode, format!("{}/{}", parent_path, entry.name));
            } else {
                self.register(entry.vnode, entry.name.clone());
            }
        }
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
