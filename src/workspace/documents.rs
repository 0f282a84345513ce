use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{Result, WorkspaceError};
use super::path;

/// Identity of one content handle. A renamed file gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Editable text of one file
#[derive(Debug, Clone)]
pub struct TextBuffer {
    text: String,
    version: u64,
    saved_version: u64,
    last_saved: Option<DateTime<Utc>>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            version: 0,
            saved_version: 0,
            last_saved: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if the text changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.version != self.saved_version
    }

    pub fn mark_saved(&mut self) {
        self.saved_version = self.version;
        self.last_saved = Some(Utc::now());
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }
}

/// A content handle bound to the path it was created for.
#[derive(Debug)]
pub struct DocumentHandle {
    id: DocumentId,
    path: String,
    buffer: TextBuffer,
}

impl DocumentHandle {
    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut TextBuffer {
        &mut self.buffer
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }
}

/// Owner of every live document handle, keyed by file path.
#[derive(Debug, Default)]
pub struct DocumentCache {
    handles: HashMap<String, DocumentHandle>,
    paths: HashMap<DocumentId, String>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.handles.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Result<&DocumentHandle> {
        self.handles
            .get(path)
            .ok_or_else(|| WorkspaceError::not_found(path))
    }

    pub fn get_mut(&mut self, path: &str) -> Result<&mut DocumentHandle> {
        self.handles
            .get_mut(path)
            .ok_or_else(|| WorkspaceError::not_found(path))
    }

    pub fn path_of(&self, id: DocumentId) -> Option<&str> {
        self.paths.get(&id).map(String::as_str)
    }

    pub fn get_by_id(&self, id: DocumentId) -> Option<&DocumentHandle> {
        self.path_of(id).and_then(|path| self.handles.get(path))
    }

    /// Create and register a handle for `path`. Never replaces an existing handle.
    pub fn put(&mut self, path: &str, content: impl Into<String>) -> Result<DocumentId> {
        if self.handles.contains_key(path) {
            return Err(WorkspaceError::Conflict(format!(
                "document already open for '{}'",
                path
            )));
        }
        let id = DocumentId::new();
        self.handles.insert(
            path.to_string(),
            DocumentHandle {
                id,
                path: path.to_string(),
                buffer: TextBuffer::new(content),
            },
        );
        self.paths.insert(id, path.to_string());
        log::debug!("document {} created for {}", id, path);
        Ok(id)
    }

    /// Destroy and unregister the handle for `path`.
    pub fn remove(&mut self, path: &str) -> Result<DocumentId> {
        let handle = self
            .handles
            .remove(path)
            .ok_or_else(|| WorkspaceError::not_found(path))?;
        self.paths.remove(&handle.id);
        log::debug!("document {} disposed ({})", handle.id, path);
        Ok(handle.id)
    }

    /// Rebind a document to `new_path`: a fresh handle takes over the text and the
    /// old one is destroyed. Returns `(old_id, new_id)` so callers holding the old
    /// id can swap it out.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> Result<(DocumentId, DocumentId)> {
        if old_path == new_path {
            let id = self.get(old_path)?.id;
            return Ok((id, id));
        }
        if self.handles.contains_key(new_path) {
            return Err(WorkspaceError::Conflict(format!(
                "document already open for '{}'",
                new_path
            )));
        }
        let text = self.get(old_path)?.text().to_string();
        let new_id = self.put(new_path, text)?;
        let old_id = self.remove(old_path)?;
        Ok((old_id, new_id))
    }

    /// Paths of every handle at or below `prefix`.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .handles
            .keys()
            .filter(|p| path::is_within(p, prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Dispose every handle.
    pub fn clear(&mut self) -> usize {
        let count = self.handles.len();
        self.handles.clear();
        self.paths.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut cache = DocumentCache::new();
        let id = cache.put("src/a.ts", "let a = 1;").unwrap();

        let handle = cache.get("src/a.ts").unwrap();
        assert_eq!(handle.id(), id);
        assert_eq!(handle.text(), "let a = 1;");
        assert_eq!(cache.path_of(id), Some("src/a.ts"));
        assert!(matches!(cache.get("src/b.ts"), Err(WorkspaceError::NotFound(_))));
    }

    #[test]
    fn test_put_refuses_silent_replace() {
        let mut cache = DocumentCache::new();
        cache.put("a.ts", "one").unwrap();
        assert!(matches!(cache.put("a.ts", "two"), Err(WorkspaceError::Conflict(_))));
        assert_eq!(cache.get("a.ts").unwrap().text(), "one");
    }

    #[test]
    fn test_remove_requires_existing() {
        let mut cache = DocumentCache::new();
        let id = cache.put("a.ts", "").unwrap();
        assert_eq!(cache.remove("a.ts").unwrap(), id);
        assert!(cache.get_by_id(id).is_none());
        assert!(matches!(cache.remove("a.ts"), Err(WorkspaceError::NotFound(_))));
    }

    #[test]
    fn test_rename_creates_fresh_handle_with_text() {
        let mut cache = DocumentCache::new();
        cache.put("src/a.ts", "original").unwrap();
        cache.get_mut("src/a.ts").unwrap().buffer_mut().set_text("edited");

        let (old_id, new_id) = cache.rename("src/a.ts", "src/b.ts").unwrap();
        assert_ne!(old_id, new_id);
        assert!(!cache.contains("src/a.ts"));

        let handle = cache.get("src/b.ts").unwrap();
        assert_eq!(handle.id(), new_id);
        assert_eq!(handle.path(), "src/b.ts");
        assert_eq!(handle.text(), "edited");
        assert!(!handle.buffer().is_dirty());
    }

    #[test]
    fn test_rename_onto_existing_fails_without_change() {
        let mut cache = DocumentCache::new();
        cache.put("a.ts", "a").unwrap();
        cache.put("b.ts", "b").unwrap();
        assert!(cache.rename("a.ts", "b.ts").is_err());
        assert_eq!(cache.get("a.ts").unwrap().text(), "a");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_paths_under() {
        let mut cache = DocumentCache::new();
        cache.put("src/a.ts", "").unwrap();
        cache.put("src/lib/b.ts", "").unwrap();
        cache.put("srcx/c.ts", "").unwrap();
        assert_eq!(cache.paths_under("src"), vec!["src/a.ts", "src/lib/b.ts"]);
        assert_eq!(cache.clear(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_buffer_dirty_tracking() {
        let mut buffer = TextBuffer::new("x");
        assert!(!buffer.is_dirty());
        buffer.set_text("y");
        assert!(buffer.is_dirty());
        buffer.mark_saved();
        assert!(!buffer.is_dirty());
        assert!(buffer.last_saved().is_some());
    }
}
