use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{try_join, try_join_all, BoxFuture, FutureExt};
use tokio::sync::broadcast;

use super::config::SyncConfig;
use super::events::{EventBus, TabEntry, TabsSnapshot, WorkspaceEvent};
use crate::archive::{ArchiveCodec, NewEntry};
use crate::remote::{RemoteStore, WorkspaceInfo};
use crate::workspace::path;
use crate::workspace::{
    Directory, DocumentCache, DocumentHandle, EntryKind, NamingPolicy, RemovedEntry, Result, TabSet,
    WorkspaceError, WorkspaceTree,
};

/// Per-session knobs for a `SyncEngine`
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub naming: NamingPolicy,
    pub codec: ArchiveCodec,
    /// Bus the engine publishes on. Subscribe before `open` to see the initial tree.
    pub events: EventBus,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl EngineOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            naming: config.naming_policy(),
            codec: ArchiveCodec::new(config.compression),
            events: EventBus::new(),
        }
    }
}

/// Log and wrap a failure that happened after the remote store accepted a change.
fn inconsistent(operation: &'static str, cause: impl std::fmt::Display) -> WorkspaceError {
    log::warn!("{} confirmed remotely but not applied locally: {}", operation, cause);
    WorkspaceError::consistency(operation, cause)
}

/// Fetch the text of every file under `dir`.
///
/// Files of one directory are fetched concurrently and start before its
/// subdirectories, which are themselves populated concurrently.
fn fetch_contents<'a>(
    store: &'a dyn RemoteStore,
    workspace: &'a str,
    dir: &'a Directory,
    dir_path: String,
) -> BoxFuture<'a, Result<Vec<(String, String)>>> {
    async move {
        let files = try_join_all(dir.files.iter().map(|name| {
            let file_path = path::join(&dir_path, name);
            async move {
                let text = store.read_file(workspace, &file_path).await?;
                Ok::<_, WorkspaceError>((file_path, text))
            }
        }));
        let subdirs = try_join_all(
            dir.dirs
                .iter()
                .map(|sub| fetch_contents(store, workspace, sub, path::join(&dir_path, &sub.name))),
        );
        let (mut contents, nested) = try_join(files, subdirs).await?;
        contents.extend(nested.into_iter().flatten());
        Ok(contents)
    }
    .boxed()
}

/// Owns the tree, documents and tabs of one open workspace and keeps them in
/// step with the remote store.
///
/// Every mutation asks the store first; local state is only touched once the
/// store has accepted the change.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    workspace_id: String,
    info: WorkspaceInfo,
    tree: WorkspaceTree,
    documents: DocumentCache,
    tabs: TabSet,
    naming: NamingPolicy,
    codec: ArchiveCodec,
    events: EventBus,
}

impl SyncEngine {
    /// Open a workspace: fetch metadata, the tree, and the text of every file.
    pub async fn open(
        store: Arc<dyn RemoteStore>,
        workspace_id: &str,
        token: Option<&str>,
        options: EngineOptions,
    ) -> Result<Self> {
        let info = store.workspace_info(workspace_id, token).await?;
        let (tree, documents) = Self::load(store.as_ref(), workspace_id).await?;

        log::info!(
            "opened workspace {} ({} files)",
            info.name,
            documents.len()
        );

        let engine = Self {
            store,
            workspace_id: workspace_id.to_string(),
            info,
            tree,
            documents,
            tabs: TabSet::new(),
            naming: options.naming,
            codec: options.codec,
            events: options.events,
        };
        engine.emit_tree();
        Ok(engine)
    }

    async fn load(store: &dyn RemoteStore, workspace_id: &str) -> Result<(WorkspaceTree, DocumentCache)> {
        let listing = store.fetch_tree(workspace_id).await?;
        let tree = WorkspaceTree::from_listing(listing)?;
        let contents = fetch_contents(store, workspace_id, tree.root(), String::new()).await?;

        let mut documents = DocumentCache::new();
        for (file_path, text) in contents {
            documents.put(&file_path, text)?;
        }
        Ok((tree, documents))
    }

    // ===== Accessors =====

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn info(&self) -> &WorkspaceInfo {
        &self.info
    }

    pub fn tree(&self) -> &WorkspaceTree {
        &self.tree
    }

    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    pub fn document(&self, file_path: &str) -> Result<&DocumentHandle> {
        self.documents.get(&path::canonical(file_path))
    }

    pub fn naming(&self) -> &NamingPolicy {
        &self.naming
    }

    pub fn codec(&self) -> &ArchiveCodec {
        &self.codec
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn tabs_snapshot(&self) -> TabsSnapshot {
        let entry = |id| {
            self.documents.path_of(id).map(|p| TabEntry {
                id,
                path: p.to_string(),
            })
        };
        TabsSnapshot {
            tabs: self.tabs.tabs().iter().filter_map(|id| entry(*id)).collect(),
            active: self.tabs.active().and_then(entry),
        }
    }

    pub fn active_path(&self) -> Option<&str> {
        self.tabs.active().and_then(|id| self.documents.path_of(id))
    }

    fn emit_tree(&self) {
        self.events
            .emit(WorkspaceEvent::TreeChanged(Arc::new(self.tree.snapshot())));
    }

    fn emit_tabs(&self) {
        self.events.emit(WorkspaceEvent::TabsChanged(self.tabs_snapshot()));
    }

    /// Fail with `NotFound` or `Conflict` unless `name` can be created in `dir`.
    fn ensure_free(&self, dir: &str, name: &str) -> Result<()> {
        let parent = self.tree.directory(dir)?;
        let entry_path = path::join(dir, name);
        if parent.has_entry(name) || self.documents.contains(&entry_path) {
            return Err(WorkspaceError::Conflict(format!("{} already exists", entry_path)));
        }
        Ok(())
    }

    // ===== Tabs and editing =====

    /// Show a document: open its tab if needed and make it active.
    pub fn activate(&mut self, file_path: &str) -> Result<()> {
        let id = self.documents.get(&path::canonical(file_path))?.id();
        self.tabs.activate(id);
        self.emit_tabs();
        Ok(())
    }

    pub fn activate_none(&mut self) {
        self.tabs.deactivate();
        self.emit_tabs();
    }

    pub fn open_tab(&mut self, file_path: &str) -> Result<()> {
        let id = self.documents.get(&path::canonical(file_path))?.id();
        if self.tabs.open(id) {
            self.emit_tabs();
        }
        Ok(())
    }

    pub fn close_tab(&mut self, file_path: &str) -> Result<()> {
        let id = self.documents.get(&path::canonical(file_path))?.id();
        if self.tabs.close(id) {
            self.emit_tabs();
        }
        Ok(())
    }

    /// Replace the text of an open document. Nothing is sent until it is written.
    pub fn edit_document(&mut self, file_path: &str, text: impl Into<String>) -> Result<()> {
        self.documents
            .get_mut(&path::canonical(file_path))?
            .buffer_mut()
            .set_text(text);
        Ok(())
    }

    /// Push the active document's text to the store.
    pub async fn write_active_document(&mut self) -> Result<()> {
        let active = self
            .active_path()
            .map(str::to_string)
            .ok_or_else(|| WorkspaceError::not_found("no active document"))?;
        self.write_document(&active).await
    }

    pub async fn write_document(&mut self, file_path: &str) -> Result<()> {
        let file_path = &path::canonical(file_path);
        let text = self.documents.get(file_path)?.text().to_string();
        self.store
            .write_file(&self.workspace_id, file_path, &text)
            .await?;

        self.documents
            .get_mut(file_path)
            .map_err(|e| inconsistent("write", e))?
            .buffer_mut()
            .mark_saved();

        log::info!("saved {}", file_path);
        self.events.emit(WorkspaceEvent::DocumentSaved {
            path: file_path.to_string(),
        });
        Ok(())
    }

    // ===== Creation =====

    /// Create an empty file named `name` in `dir`.
    pub async fn create_file(&mut self, dir: &str, name: &str) -> Result<NewEntry> {
        self.create_file_entry(dir, name, None).await
    }

    /// Create a file in `dir` carrying `content` as its initial payload.
    pub async fn create_file_with_content(&mut self, dir: &str, name: &str, content: Bytes) -> Result<NewEntry> {
        self.create_file_entry(dir, name, Some(content)).await
    }

    async fn create_file_entry(&mut self, dir: &str, raw_name: &str, payload: Option<Bytes>) -> Result<NewEntry> {
        let dir = &path::canonical(dir);
        path::validate_name(raw_name)?;
        let name = self.naming.normalize(dir, raw_name);
        path::validate_name(&name)?;
        self.ensure_free(dir, &name)?;

        let file_path = path::join(dir, &name);
        self.store
            .create_entry(&self.workspace_id, &file_path, EntryKind::File, payload)
            .await?;

        // The store may seed new files, so read back what it holds.
        let content = self
            .store
            .read_file(&self.workspace_id, &file_path)
            .await
            .map_err(|e| inconsistent("create file", e))?;

        let entry = NewEntry {
            name,
            path: file_path,
            content,
        };
        self.apply_new_files(dir, std::slice::from_ref(&entry))
            .map_err(|e| inconsistent("create file", e))?;

        log::info!("created file {}", entry.path);
        self.emit_tree();
        Ok(entry)
    }

    fn apply_new_files(&mut self, dir: &str, entries: &[NewEntry]) -> Result<()> {
        for entry in entries {
            self.tree.insert_file(dir, &entry.name)?;
            self.documents.put(&entry.path, entry.content.clone())?;
        }
        Ok(())
    }

    /// Upload loose files into `dir` as one flat archive.
    pub async fn create_files(&mut self, dir: &str, files: Vec<(String, Vec<u8>)>) -> Result<Vec<NewEntry>> {
        if files.is_empty() {
            return Err(WorkspaceError::Validation("no files to upload".to_string()));
        }
        let dir = &path::canonical(dir);

        let mut entries = Vec::with_capacity(files.len());
        let mut named = Vec::with_capacity(files.len());
        for (raw_name, data) in files {
            path::validate_name(&raw_name)?;
            let name = self.naming.normalize(dir, &raw_name);
            entries.push(NewEntry {
                path: path::join(dir, &name),
                name: name.clone(),
                content: String::from_utf8_lossy(&data).into_owned(),
            });
            named.push((name, data));
        }
        self.check_uploads(dir, &entries)?;

        let archive = self.codec.pack_flat(&named)?;
        self.upload_entries(dir, archive, entries).await
    }

    /// Upload a user-supplied flat archive into `dir`.
    ///
    /// An archive containing folders is rejected before anything is sent.
    pub async fn create_files_from_archive(&mut self, dir: &str, archive: &[u8]) -> Result<Vec<NewEntry>> {
        let dir = &path::canonical(dir);
        let entries = self.codec.unpack_flat(archive, dir, &self.naming)?;
        if entries.is_empty() {
            return Err(WorkspaceError::Validation("archive is empty".to_string()));
        }
        self.check_uploads(dir, &entries)?;

        let repacked = self.codec.repack_flat(archive, &entries)?;
        self.upload_entries(dir, repacked, entries).await
    }

    fn check_uploads(&self, dir: &str, entries: &[NewEntry]) -> Result<()> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.name == entry.name) {
                return Err(WorkspaceError::Validation(format!("duplicate upload name '{}'", entry.name)));
            }
            self.ensure_free(dir, &entry.name)?;
        }
        Ok(())
    }

    async fn upload_entries(&mut self, dir: &str, archive: Vec<u8>, entries: Vec<NewEntry>) -> Result<Vec<NewEntry>> {
        self.store
            .upload_archive(&self.workspace_id, dir, Bytes::from(archive))
            .await?;

        self.apply_new_files(dir, &entries)
            .map_err(|e| inconsistent("upload", e))?;

        log::info!("uploaded {} files to {}", entries.len(), dir);
        self.emit_tree();
        Ok(entries)
    }

    /// Create an empty directory named `name` in `dir`. Returns its path.
    pub async fn create_directory(&mut self, dir: &str, name: &str) -> Result<String> {
        let dir = &path::canonical(dir);
        path::validate_name(name)?;
        let name = self.naming.normalize(dir, name);
        path::validate_name(&name)?;
        self.ensure_free(dir, &name)?;

        let dir_path = path::join(dir, &name);
        self.store
            .create_entry(&self.workspace_id, &dir_path, EntryKind::Directory, None)
            .await?;

        self.tree
            .insert_directory(dir, Directory::new(name))
            .map_err(|e| inconsistent("create directory", e))?;

        log::info!("created directory {}", dir_path);
        self.emit_tree();
        Ok(dir_path)
    }

    /// Create a directory in `dir` from an archive that may contain nested folders.
    /// The directory is named after the archive, without its extension.
    pub async fn create_directory_from_archive(
        &mut self,
        dir: &str,
        archive_name: &str,
        archive: &[u8],
    ) -> Result<Directory> {
        let dir = &path::canonical(dir);
        let unpacked = self
            .codec
            .unpack_as_directory(archive, dir, archive_name, &self.naming)?;
        self.ensure_free(dir, &unpacked.root.name)?;

        let dir_path = path::join(dir, &unpacked.root.name);
        self.store
            .create_entry(
                &self.workspace_id,
                &dir_path,
                EntryKind::Directory,
                Some(Bytes::from(unpacked.archive)),
            )
            .await?;

        self.tree
            .insert_directory(dir, unpacked.root.clone())
            .map_err(|e| inconsistent("create directory", e))?;
        for entry in unpacked.files {
            self.documents
                .put(&entry.path, entry.content)
                .map_err(|e| inconsistent("create directory", e))?;
        }

        log::info!("created directory {} from {}", dir_path, archive_name);
        self.emit_tree();
        Ok(unpacked.root)
    }

    // ===== Removal and renaming =====

    /// Delete a file or a whole directory.
    pub async fn delete(&mut self, entry_path: &str, kind: EntryKind) -> Result<()> {
        let entry_path = &path::canonical(entry_path);
        if !self.tree.contains(entry_path, kind) {
            return Err(WorkspaceError::not_found(entry_path));
        }

        self.store
            .delete_entry(&self.workspace_id, entry_path, kind)
            .await?;

        let removed = self
            .tree
            .remove_entry(entry_path, kind)
            .map_err(|e| inconsistent("delete", e))?;
        let doomed = match removed {
            RemovedEntry::File(_) => vec![entry_path.to_string()],
            RemovedEntry::Directory(dir) => dir.file_paths(entry_path),
        };

        let mut tabs_changed = false;
        let mut missing = Vec::new();
        for file_path in doomed {
            match self.documents.remove(&file_path) {
                Ok(id) => tabs_changed |= self.tabs.close(id),
                Err(_) => missing.push(file_path),
            }
        }

        if tabs_changed {
            self.emit_tabs();
        }
        self.emit_tree();

        if !missing.is_empty() {
            return Err(inconsistent(
                "delete",
                format!("no document for {}", missing.join(", ")),
            ));
        }
        log::info!("deleted {} {}", kind, entry_path);
        Ok(())
    }

    /// Rename a file or directory in place. Returns the new path.
    ///
    /// Every document under a renamed directory is rebound to its new path and
    /// open tabs follow their documents.
    pub async fn rename(&mut self, entry_path: &str, new_name: &str, kind: EntryKind) -> Result<String> {
        path::validate_name(new_name)?;
        let entry_path = &path::canonical(entry_path);
        if !self.tree.contains(entry_path, kind) {
            return Err(WorkspaceError::not_found(entry_path));
        }

        let (parent, old_name) = path::split_parent(entry_path);
        let new_path = path::join(parent, new_name);
        if old_name == new_name {
            return Ok(new_path);
        }
        self.ensure_free(parent, new_name)?;

        let moved = match kind {
            EntryKind::File => vec![entry_path.to_string()],
            EntryKind::Directory => self.tree.file_paths_under(entry_path)?,
        };

        self.store
            .rename_entry(&self.workspace_id, entry_path, kind, new_name)
            .await?;

        self.tree
            .rename_entry(entry_path, new_name, kind)
            .map_err(|e| inconsistent("rename", e))?;

        let mut tabs_changed = false;
        let mut failures = Vec::new();
        for old in moved {
            let Some(new) = path::rebase(&old, entry_path, &new_path) else {
                continue;
            };
            match self.documents.rename(&old, &new) {
                Ok((old_id, new_id)) => tabs_changed |= self.tabs.replace(old_id, new_id),
                Err(e) => failures.push(e.to_string()),
            }
        }

        if tabs_changed {
            self.emit_tabs();
        }
        self.emit_tree();

        if !failures.is_empty() {
            return Err(inconsistent("rename", failures.join("; ")));
        }
        log::info!("renamed {} {} -> {}", kind, entry_path, new_path);
        Ok(new_path)
    }

    // ===== Bulk export =====

    /// Archive every file in the workspace at its path, without a root folder.
    pub fn download_all(&self) -> Result<Vec<u8>> {
        self.download_directory("")
    }

    /// Archive the directory at `dir_path`, entries relative to it.
    pub fn download_directory(&self, dir_path: &str) -> Result<Vec<u8>> {
        let dir_path = &path::canonical(dir_path);
        let dir = self.tree.directory(dir_path)?;
        self.codec.pack(dir, dir_path, |file_path| {
            Ok(self.documents.get(file_path)?.text().to_string())
        })
    }

    /// Suggested file name for `download_all`
    pub fn download_name(&self) -> String {
        format!("{}.zip", self.info.name)
    }

    // ===== Recovery and teardown =====

    /// Re-fetch the tree and every document from the store, discarding local
    /// edits. Tabs and the active document survive if their path still exists.
    pub async fn resync(&mut self) -> Result<()> {
        let (tree, documents) = Self::load(self.store.as_ref(), &self.workspace_id).await?;

        let open_paths: Vec<String> = self
            .tabs
            .tabs()
            .iter()
            .filter_map(|id| self.documents.path_of(*id).map(str::to_string))
            .collect();
        let active_path = self.active_path().map(str::to_string);

        let new_ids: HashMap<String, _> = open_paths
            .iter()
            .filter_map(|p| documents.get(p).ok().map(|h| (p.clone(), h.id())))
            .collect();

        let mut tabs = TabSet::new();
        for p in &open_paths {
            if let Some(id) = new_ids.get(p) {
                tabs.open(*id);
            }
        }
        if let Some(id) = active_path.and_then(|p| documents.get(&p).ok().map(|h| h.id())) {
            tabs.activate(id);
        }

        let disposed = self.documents.clear();
        self.documents = documents;
        self.tree = tree;
        self.tabs = tabs;

        log::info!(
            "resynced {}: {} documents replaced by {}",
            self.workspace_id,
            disposed,
            self.documents.len()
        );
        self.emit_tabs();
        self.emit_tree();
        Ok(())
    }

    /// Dispose every document and tab and tell observers the workspace is gone.
    pub fn close(mut self) {
        self.tabs.clear();
        let disposed = self.documents.clear();
        log::info!("closed {} ({} documents disposed)", self.workspace_id, disposed);
        self.events.emit(WorkspaceEvent::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn listing() -> Directory {
        Directory {
            name: "demo".to_string(),
            files: vec!["README.md".to_string()],
            dirs: vec![
                Directory {
                    name: "src".to_string(),
                    files: vec!["a.ts".to_string(), "b.ts".to_string()],
                    dirs: vec![Directory {
                        name: "util".to_string(),
                        files: vec!["c.ts".to_string()],
                        dirs: vec![],
                    }],
                },
                Directory {
                    name: "routes".to_string(),
                    files: vec![],
                    dirs: vec![Directory::new("pages")],
                },
            ],
        }
    }

    fn store() -> Arc<MemoryRemoteStore> {
        Arc::new(MemoryRemoteStore::new().with_workspace(
            "demo",
            listing(),
            [
                ("README.md", "# demo"),
                ("src/a.ts", "export const a = 1;"),
                ("src/b.ts", "export const b = 2;"),
                ("src/util/c.ts", "export const c = 3;"),
            ],
        ))
    }

    async fn open(store: &Arc<MemoryRemoteStore>) -> SyncEngine {
        let store: Arc<dyn RemoteStore> = store.clone();
        SyncEngine::open(store, "demo", None, EngineOptions::default())
            .await
            .unwrap()
    }

    fn assert_paths_match_tree(engine: &SyncEngine) {
        let mut tree_paths = engine.tree().file_paths();
        tree_paths.sort();
        assert_eq!(tree_paths, engine.documents().paths_under(""));
    }

    #[tokio::test]
    async fn test_open_populates_documents() {
        let store = store();
        let engine = open(&store).await;

        assert_eq!(engine.info().name, "demo");
        assert_eq!(engine.documents().len(), 4);
        assert_eq!(engine.document("src/util/c.ts").unwrap().text(), "export const c = 3;");
        assert_paths_match_tree(&engine);

        let calls = store.calls();
        assert_eq!(calls[0], "workspace_info demo");
        assert_eq!(calls[1], "fetch_tree demo");
        assert_eq!(calls.len(), 6);
    }

    #[tokio::test]
    async fn test_open_reads_parent_files_before_subdirectories() {
        let store = store();
        let _engine = open(&store).await;

        let calls = store.calls();
        let position = |call: &str| calls.iter().position(|c| c == call).unwrap();
        let readme = position("read_file README.md");
        for nested in ["read_file src/a.ts", "read_file src/b.ts", "read_file src/util/c.ts"] {
            assert!(readme < position(nested), "{} read before README.md", nested);
        }
        assert!(position("read_file src/b.ts") < position("read_file src/util/c.ts"));
    }

    #[tokio::test]
    async fn test_open_emits_initial_tree_to_early_subscribers() {
        let store: Arc<dyn RemoteStore> = store();
        let options = EngineOptions::default();
        let mut rx = options.events.subscribe();
        let _engine = SyncEngine::open(store, "demo", Some("tok"), options).await.unwrap();

        match rx.recv().await.unwrap() {
            WorkspaceEvent::TreeChanged(tree) => assert_eq!(tree.dirs.len(), 2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_fails_cleanly_when_a_file_cannot_be_read() {
        let store = store();
        store.fail_next("read_file");
        let remote: Arc<dyn RemoteStore> = store.clone();
        let result = SyncEngine::open(remote, "demo", None, EngineOptions::default()).await;
        assert!(matches!(result, Err(WorkspaceError::Remote(_))));
    }

    #[tokio::test]
    async fn test_create_file_normalizes_in_route_namespace() {
        let store = store();
        let mut engine = open(&store).await;

        let entry = engine.create_file("routes/pages", "My Page").await.unwrap();
        assert_eq!(entry.name, "my-page");
        assert_eq!(entry.path, "routes/pages/my-page");
        assert!(engine.tree().contains_file("routes/pages/my-page"));
        assert!(engine.document("routes/pages/my-page").is_ok());

        let plain = engine.create_file("src", "My Page").await.unwrap();
        assert_eq!(plain.path, "src/My Page");
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_create_file_rejects_separator_without_remote_call() {
        let store = store();
        let mut engine = open(&store).await;
        store.clear_calls();

        let result = engine.create_file("src", "a/b.ts").await;
        assert!(matches!(result, Err(WorkspaceError::InvalidName(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_file_conflict_and_missing_dir_are_clean() {
        let store = store();
        let mut engine = open(&store).await;
        store.clear_calls();

        assert!(matches!(engine.create_file("src", "a.ts").await, Err(WorkspaceError::Conflict(_))));
        assert!(matches!(engine.create_file("nope", "x.ts").await, Err(WorkspaceError::NotFound(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_local_state_untouched() {
        let store = store();
        let mut engine = open(&store).await;
        let before = engine.tree().snapshot();

        store.fail_next("create_entry");
        let err = engine.create_file("src", "new.ts").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Remote(_)));
        assert!(err.is_clean_failure());
        assert_eq!(engine.tree().snapshot(), before);
        assert!(!engine.documents().contains("src/new.ts"));
    }

    #[tokio::test]
    async fn test_failure_after_remote_success_is_a_consistency_error() {
        let store = store();
        let mut engine = open(&store).await;

        store.fail_next("read_file");
        let err = engine.create_file("src", "new.ts").await.unwrap_err();
        assert!(err.is_consistency());
        assert!(store.tree("demo").unwrap().dir("src").unwrap().has_file("new.ts"));
        assert!(!engine.tree().contains_file("src/new.ts"));

        engine.resync().await.unwrap();
        assert!(engine.tree().contains_file("src/new.ts"));
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_create_file_with_content_reads_back() {
        let store = store();
        let mut engine = open(&store).await;

        let entry = engine
            .create_file_with_content("", "notes.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(entry.content, "hello");
        assert_eq!(engine.document("notes.txt").unwrap().text(), "hello");
    }

    #[tokio::test]
    async fn test_create_files_uploads_flat_archive() {
        let store = store();
        let mut engine = open(&store).await;

        let entries = engine
            .create_files(
                "routes",
                vec![
                    ("About Us.svelte".to_string(), b"<about/>".to_vec()),
                    ("Contact.svelte".to_string(), b"<contact/>".to_vec()),
                ],
            )
            .await
            .unwrap();

        assert_eq!(entries[0].path, "routes/about-us.svelte");
        assert_eq!(engine.tree().directory("routes").unwrap().files, vec!["about-us.svelte", "contact.svelte"]);
        assert_eq!(store.file("demo", "routes/about-us.svelte").as_deref(), Some("<about/>"));
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_create_files_rejects_names_that_collide_after_normalization() {
        let store = store();
        let mut engine = open(&store).await;
        store.clear_calls();

        let result = engine
            .create_files(
                "routes",
                vec![("My Page".to_string(), vec![]), ("my-page".to_string(), vec![])],
            )
            .await;
        assert!(matches!(result, Err(WorkspaceError::Validation(_))));
        assert!(matches!(engine.create_files("src", vec![]).await, Err(WorkspaceError::Validation(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_nested_flat_archive_is_rejected_before_remote_call() {
        let store = store();
        let mut engine = open(&store).await;
        let nested = engine
            .codec
            .pack(
                &Directory {
                    name: String::new(),
                    files: vec![],
                    dirs: vec![Directory {
                        name: "a".to_string(),
                        files: vec!["b".to_string()],
                        dirs: vec![],
                    }],
                },
                "",
                |_| Ok(String::new()),
            )
            .unwrap();
        store.clear_calls();

        let result = engine.create_files_from_archive("src", &nested).await;
        assert!(matches!(result, Err(WorkspaceError::Validation(_))));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_files_from_archive() {
        let store = store();
        let mut engine = open(&store).await;
        let archive = engine
            .codec
            .pack_flat(&[("d.ts".to_string(), b"d".to_vec()), ("e.ts".to_string(), b"e".to_vec())])
            .unwrap();

        let entries = engine.create_files_from_archive("src/util", &archive).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(engine.document("src/util/e.ts").unwrap().text(), "e");
        assert_eq!(store.file("demo", "src/util/d.ts").as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_create_directory() {
        let store = store();
        let mut engine = open(&store).await;
        let mut rx = engine.subscribe();

        let created = engine.create_directory("routes", "Blog Posts").await.unwrap();
        assert_eq!(created, "routes/blog-posts");
        assert!(engine.tree().directory("routes/blog-posts").is_ok());
        assert!(matches!(rx.recv().await.unwrap(), WorkspaceEvent::TreeChanged(_)));

        assert!(matches!(
            engine.create_directory("routes", "blog-posts").await,
            Err(WorkspaceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_create_directory_from_archive() {
        let store = store();
        let mut engine = open(&store).await;
        let source = Directory {
            name: String::new(),
            files: vec!["Index.svelte".to_string()],
            dirs: vec![Directory {
                name: "First Post".to_string(),
                files: vec!["Body.md".to_string()],
                dirs: vec![],
            }],
        };
        let archive = engine.codec.pack(&source, "", |p| Ok(format!("content of {}", p))).unwrap();

        let root = engine
            .create_directory_from_archive("routes", "My Blog.zip", &archive)
            .await
            .unwrap();

        assert_eq!(root.name, "my-blog");
        assert_eq!(
            engine.document("routes/my-blog/first-post/body.md").unwrap().text(),
            "content of First Post/Body.md"
        );
        assert_eq!(
            store.file("demo", "routes/my-blog/first-post/body.md").as_deref(),
            Some("content of First Post/Body.md")
        );
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_delete_directory_disposes_descendants() {
        let store = store();
        let mut engine = open(&store).await;
        engine.activate("src/util/c.ts").unwrap();
        engine.open_tab("README.md").unwrap();

        engine.delete("src", EntryKind::Directory).await.unwrap();

        for gone in ["src/a.ts", "src/b.ts", "src/util/c.ts"] {
            assert!(matches!(engine.document(gone), Err(WorkspaceError::NotFound(_))));
        }
        let tabs = engine.tabs_snapshot();
        assert_eq!(tabs.paths(), vec!["README.md"]);
        assert_eq!(tabs.active, None);
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_delete_missing_entry_makes_no_remote_call() {
        let store = store();
        let mut engine = open(&store).await;
        store.clear_calls();

        let result = engine.delete("src/zzz.ts", EntryKind::File).await;
        assert!(matches!(result, Err(WorkspaceError::NotFound(_))));
        assert!(matches!(
            engine.delete("src/a.ts", EntryKind::Directory).await,
            Err(WorkspaceError::NotFound(_))
        ));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_missing_document_still_applies_locally() {
        let store = store();
        let mut engine = open(&store).await;
        engine.activate("src/a.ts").unwrap();
        engine.documents.remove("src/b.ts").unwrap();
        let mut rx = engine.subscribe();

        let err = engine.delete("src", EntryKind::Directory).await.unwrap_err();
        assert!(err.is_consistency());

        assert!(!engine.tree().contains("src", EntryKind::Directory));
        assert!(matches!(engine.document("src/util/c.ts"), Err(WorkspaceError::NotFound(_))));
        let tabs = engine.tabs_snapshot();
        assert!(tabs.tabs.is_empty());
        assert_eq!(tabs.active, None);
        assert!(store.tree("demo").unwrap().dirs.iter().all(|d| d.name != "src"));

        match rx.recv().await.unwrap() {
            WorkspaceEvent::TabsChanged(snapshot) => assert!(snapshot.tabs.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            WorkspaceEvent::TreeChanged(root) => assert!(root.dirs.iter().all(|d| d.name != "src")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rename_with_missing_document_still_applies_locally() {
        let store = store();
        let mut engine = open(&store).await;
        engine.activate("src/a.ts").unwrap();
        engine.documents.remove("src/b.ts").unwrap();
        let mut rx = engine.subscribe();

        let err = engine.rename("src", "lib", EntryKind::Directory).await.unwrap_err();
        assert!(err.is_consistency());

        assert!(engine.tree().contains("lib", EntryKind::Directory));
        assert!(!engine.tree().contains("src", EntryKind::Directory));
        assert_eq!(engine.document("lib/util/c.ts").unwrap().text(), "export const c = 3;");
        let tabs = engine.tabs_snapshot();
        assert_eq!(tabs.paths(), vec!["lib/a.ts"]);
        assert_eq!(tabs.active.unwrap().path, "lib/a.ts");

        match rx.recv().await.unwrap() {
            WorkspaceEvent::TabsChanged(snapshot) => assert_eq!(snapshot.paths(), vec!["lib/a.ts"]),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            WorkspaceEvent::TreeChanged(root) => assert!(root.dirs.iter().any(|d| d.name == "lib")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slash_decorated_paths_address_the_same_entries() {
        let store = store();
        let mut engine = open(&store).await;
        engine.activate("src/a.ts").unwrap();

        engine.delete("/src/a.ts", EntryKind::File).await.unwrap();
        assert!(matches!(engine.document("src/a.ts"), Err(WorkspaceError::NotFound(_))));
        let tabs = engine.tabs_snapshot();
        assert!(tabs.tabs.is_empty());
        assert_eq!(tabs.active, None);

        let new_path = engine.rename("src/b.ts/", "z.ts", EntryKind::File).await.unwrap();
        assert_eq!(new_path, "src/z.ts");
        assert_eq!(engine.document("src/z.ts").unwrap().text(), "export const b = 2;");
        assert_eq!(store.file("demo", "src/z.ts").as_deref(), Some("export const b = 2;"));

        engine.open_tab("/src/z.ts").unwrap();
        engine.edit_document("src/z.ts/", "edited").unwrap();
        engine.write_document("/src//z.ts").await.unwrap();
        assert_eq!(store.file("demo", "src/z.ts").as_deref(), Some("edited"));
        assert_eq!(engine.tabs_snapshot().paths(), vec!["src/z.ts"]);

        let created = engine.create_file("/src/", "n.ts").await.unwrap();
        assert_eq!(created.path, "src/n.ts");
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_rename_directory_rebinds_documents_and_tabs() {
        let store = store();
        let mut engine = open(&store).await;
        engine.open_tab("README.md").unwrap();
        engine.activate("src/util/c.ts").unwrap();
        engine.edit_document("src/util/c.ts", "edited").unwrap();

        let new_path = engine.rename("src", "lib", EntryKind::Directory).await.unwrap();
        assert_eq!(new_path, "lib");

        assert!(engine.tree().contains_file("lib/util/c.ts"));
        assert!(matches!(engine.document("src/a.ts"), Err(WorkspaceError::NotFound(_))));
        assert_eq!(engine.document("lib/a.ts").unwrap().text(), "export const a = 1;");
        assert_eq!(engine.document("lib/util/c.ts").unwrap().text(), "edited");

        let tabs = engine.tabs_snapshot();
        assert_eq!(tabs.paths(), vec!["README.md", "lib/util/c.ts"]);
        assert_eq!(tabs.active.unwrap().path, "lib/util/c.ts");
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_rename_file_keeps_tab_position() {
        let store = store();
        let mut engine = open(&store).await;
        engine.open_tab("src/a.ts").unwrap();
        engine.open_tab("src/b.ts").unwrap();
        let mut rx = engine.subscribe();

        engine.rename("src/a.ts", "z.ts", EntryKind::File).await.unwrap();

        assert_eq!(engine.tabs_snapshot().paths(), vec!["src/z.ts", "src/b.ts"]);
        match rx.recv().await.unwrap() {
            WorkspaceEvent::TabsChanged(snapshot) => assert_eq!(snapshot.paths()[0], "src/z.ts"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(store.file("demo", "src/z.ts").as_deref(), Some("export const a = 1;"));
    }

    #[tokio::test]
    async fn test_rename_onto_existing_name_is_rejected() {
        let store = store();
        let mut engine = open(&store).await;
        store.clear_calls();

        assert!(matches!(
            engine.rename("src/a.ts", "b.ts", EntryKind::File).await,
            Err(WorkspaceError::Conflict(_))
        ));
        assert!(matches!(
            engine.rename("src/a.ts", "x/y.ts", EntryKind::File).await,
            Err(WorkspaceError::InvalidName(_))
        ));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_active_tab_clears_active() {
        let store = store();
        let mut engine = open(&store).await;
        engine.open_tab("src/a.ts").unwrap();
        engine.open_tab("src/b.ts").unwrap();
        engine.activate("src/a.ts").unwrap();

        engine.close_tab("src/a.ts").unwrap();
        let tabs = engine.tabs_snapshot();
        assert_eq!(tabs.paths(), vec!["src/b.ts"]);
        assert!(tabs.active.is_none());
    }

    #[tokio::test]
    async fn test_write_active_document() {
        let store = store();
        let mut engine = open(&store).await;

        assert!(matches!(
            engine.write_active_document().await,
            Err(WorkspaceError::NotFound(_))
        ));

        engine.activate("src/a.ts").unwrap();
        engine.edit_document("src/a.ts", "export const a = 42;").unwrap();
        assert!(engine.document("src/a.ts").unwrap().buffer().is_dirty());

        let mut rx = engine.subscribe();
        engine.write_active_document().await.unwrap();

        assert_eq!(store.file("demo", "src/a.ts").as_deref(), Some("export const a = 42;"));
        assert!(!engine.document("src/a.ts").unwrap().buffer().is_dirty());
        match rx.recv().await.unwrap() {
            WorkspaceEvent::DocumentSaved { path } => assert_eq!(path, "src/a.ts"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_round_trip() {
        let store = store();
        let engine = open(&store).await;

        let archive = engine.download_all().unwrap();
        assert_eq!(engine.download_name(), "demo.zip");

        let unpacked = engine
            .codec
            .unpack_as_directory(&archive, "", "demo.zip", &NamingPolicy::default())
            .unwrap();
        assert_eq!(unpacked.root.files, engine.tree().root().files);
        assert_eq!(unpacked.root.dirs, engine.tree().root().dirs);
        for entry in unpacked.files {
            let original = entry.path.trim_start_matches("demo/");
            assert_eq!(engine.document(original).unwrap().text(), entry.content);
        }
    }

    #[tokio::test]
    async fn test_download_directory_is_relative() {
        let store = store();
        let engine = open(&store).await;

        let archive = engine.download_directory("src/util").unwrap();
        let entries = engine
            .codec
            .unpack_flat(&archive, "", &NamingPolicy::default())
            .unwrap();
        assert_eq!(entries[0].name, "c.ts");
        assert!(matches!(engine.download_directory("nope"), Err(WorkspaceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resync_keeps_surviving_tabs() {
        let store = store();
        let mut engine = open(&store).await;
        engine.open_tab("src/a.ts").unwrap();
        engine.activate("src/b.ts").unwrap();

        store
            .delete_entry("demo", "src/a.ts", EntryKind::File)
            .await
            .unwrap();
        engine.resync().await.unwrap();

        let tabs = engine.tabs_snapshot();
        assert_eq!(tabs.paths(), vec!["src/b.ts"]);
        assert_eq!(tabs.active.unwrap().path, "src/b.ts");
        assert_paths_match_tree(&engine);
    }

    #[tokio::test]
    async fn test_close_emits_closed() {
        let store = store();
        let engine = open(&store).await;
        let mut rx = engine.subscribe();
        engine.close();
        assert!(matches!(rx.recv().await.unwrap(), WorkspaceEvent::Closed));
    }
}
