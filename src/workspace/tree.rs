use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{Result, WorkspaceError};
use super::path;

/// Kind of a tree entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "directory"),
        }
    }
}

/// A directory in the workspace listing.
///
/// Directories carry no path of their own; a path is derived by walking from
/// the root, so renaming an ancestor implicitly moves every descendant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directory {
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub dirs: Vec<Directory>,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            dirs: Vec::new(),
        }
    }

    pub fn dir(&self, name: &str) -> Option<&Directory> {
        self.dirs.iter().find(|d| d.name == name)
    }

    pub fn dir_mut(&mut self, name: &str) -> Option<&mut Directory> {
        self.dirs.iter_mut().find(|d| d.name == name)
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.files.iter().any(|f| f == name)
    }

    /// True if a file or a directory named `name` lives directly in this directory.
    pub fn has_entry(&self, name: &str) -> bool {
        self.has_file(name) || self.dir(name).is_some()
    }

    pub fn has(&self, name: &str, kind: EntryKind) -> bool {
        match kind {
            EntryKind::File => self.has_file(name),
            EntryKind::Directory => self.dir(name).is_some(),
        }
    }

    /// Paths of every file in this subtree, with `prefix` as this directory's own path.
    ///
    /// Direct files come first, then each child directory in order.
    pub fn file_paths(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_file_paths(prefix, &mut out);
        out
    }

    fn collect_file_paths(&self, prefix: &str, out: &mut Vec<String>) {
        out.extend(self.files.iter().map(|f| path::join(prefix, f)));
        for dir in &self.dirs {
            dir.collect_file_paths(&path::join(prefix, &dir.name), out);
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.iter().map(Directory::file_count).sum::<usize>()
    }

    /// Check that no directory holds two entries with the same name.
    pub fn validate(&self, prefix: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let names = self.files.iter().chain(self.dirs.iter().map(|d| &d.name));
        for name in names {
            path::validate_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(WorkspaceError::Validation(format!(
                    "duplicate entry '{}'",
                    path::join(prefix, name)
                )));
            }
        }
        for dir in &self.dirs {
            dir.validate(&path::join(prefix, &dir.name))?;
        }
        Ok(())
    }
}

/// Entry taken out of the tree by `WorkspaceTree::remove_entry`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedEntry {
    File(String),
    Directory(Directory),
}

/// The workspace directory hierarchy with in-place structural mutation.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceTree {
    root: Directory,
}

impl WorkspaceTree {
    /// Build a tree from a remote listing, rejecting ambiguous names.
    pub fn from_listing(root: Directory) -> Result<Self> {
        root.validate("")?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    /// Immutable copy of the current tree for observers.
    pub fn snapshot(&self) -> Directory {
        self.root.clone()
    }

    pub fn directory(&self, dir_path: &str) -> Result<&Directory> {
        path::resolve_dir(&self.root, dir_path)
    }

    pub fn contains(&self, entry_path: &str, kind: EntryKind) -> bool {
        let (_, name) = path::split_parent(entry_path);
        if name.is_empty() {
            return false;
        }
        path::resolve(&self.root, entry_path)
            .map(|dir| dir.has(name, kind))
            .unwrap_or(false)
    }

    pub fn contains_file(&self, file_path: &str) -> bool {
        self.contains(file_path, EntryKind::File)
    }

    /// Every file path in the workspace, derived from the current structure.
    pub fn file_paths(&self) -> Vec<String> {
        self.root.file_paths("")
    }

    /// File paths inside the directory at `dir_path`.
    pub fn file_paths_under(&self, dir_path: &str) -> Result<Vec<String>> {
        Ok(self.directory(dir_path)?.file_paths(dir_path.trim_matches(path::SEPARATOR)))
    }

    /// Append `name` to the files of the directory at `dir_path`.
    pub fn insert_file(&mut self, dir_path: &str, name: &str) -> Result<()> {
        let dir = path::resolve_dir_mut(&mut self.root, dir_path)?;
        if dir.has_entry(name) {
            return Err(WorkspaceError::Conflict(path::join(dir_path, name)));
        }
        dir.files.push(name.to_string());
        Ok(())
    }

    /// Append a whole directory subtree to the directory at `dir_path`.
    pub fn insert_directory(&mut self, dir_path: &str, subtree: Directory) -> Result<()> {
        path::validate_name(&subtree.name)?;
        subtree.validate(&path::join(dir_path, &subtree.name))?;
        let dir = path::resolve_dir_mut(&mut self.root, dir_path)?;
        if dir.has_entry(&subtree.name) {
            return Err(WorkspaceError::Conflict(path::join(dir_path, &subtree.name)));
        }
        dir.dirs.push(subtree);
        Ok(())
    }

    /// Remove the file or directory at `entry_path`. A removed directory is returned
    /// whole so the caller can dispose whatever it cached for its descendants.
    pub fn remove_entry(&mut self, entry_path: &str, kind: EntryKind) -> Result<RemovedEntry> {
        let (parent, name) = path::split_parent(entry_path);
        let dir = path::resolve_dir_mut(&mut self.root, parent)?;
        match kind {
            EntryKind::File => {
                let idx = dir
                    .files
                    .iter()
                    .position(|f| f == name)
                    .ok_or_else(|| WorkspaceError::not_found(entry_path))?;
                Ok(RemovedEntry::File(dir.files.remove(idx)))
            }
            EntryKind::Directory => {
                let idx = dir
                    .dirs
                    .iter()
                    .position(|d| d.name == name)
                    .ok_or_else(|| WorkspaceError::not_found(entry_path))?;
                Ok(RemovedEntry::Directory(dir.dirs.remove(idx)))
            }
        }
    }

    /// Rename the entry at `entry_path` in place, keeping its position among siblings.
    pub fn rename_entry(&mut self, entry_path: &str, new_name: &str, kind: EntryKind) -> Result<()> {
        path::validate_name(new_name)?;
        let (parent, name) = path::split_parent(entry_path);
        let dir = path::resolve_dir_mut(&mut self.root, parent)?;
        if !dir.has(name, kind) {
            return Err(WorkspaceError::not_found(entry_path));
        }
        if name != new_name && dir.has_entry(new_name) {
            return Err(WorkspaceError::Conflict(path::join(parent, new_name)));
        }
        match kind {
            EntryKind::File => {
                if let Some(file) = dir.files.iter_mut().find(|f| f.as_str() == name) {
                    *file = new_name.to_string();
                }
            }
            EntryKind::Directory => {
                if let Some(sub) = dir.dir_mut(name) {
                    sub.name = new_name.to_string();
                }
            }
        }
        Ok(())
    }
}
