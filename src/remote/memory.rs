use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{RemoteError, RemoteStore, WorkspaceInfo};
use crate::archive::ArchiveCodec;
use crate::workspace::{path, Directory, EntryKind, NamingPolicy, WorkspaceError, WorkspaceTree};

struct StoredWorkspace {
    info: WorkspaceInfo,
    tree: WorkspaceTree,
    files: HashMap<String, String>,
}

#[derive(Default)]
struct MemoryState {
    workspaces: HashMap<String, StoredWorkspace>,
    calls: Vec<String>,
    failures: Vec<String>,
}

/// In-process store that keeps workspaces in memory.
///
/// Every call is recorded, and `fail_next` makes the next call of an operation fail,
/// which lets hosts and tests exercise error paths without a server.
#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
}

impl From<WorkspaceError> for RemoteError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::NotFound(p) => RemoteError::NotFound(p),
            other => RemoteError::Rejected(other.to_string()),
        }
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workspace with the given listing and file contents.
    pub fn with_workspace<I, P, C>(self, name: &str, root: Directory, files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        self.insert_workspace(name, root, files);
        self
    }

    /// An invalid listing is logged and dropped, leaving the workspace unknown.
    pub fn insert_workspace<I, P, C>(&self, name: &str, root: Directory, files: I)
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let tree = match WorkspaceTree::from_listing(root) {
            Ok(tree) => tree,
            Err(e) => {
                log::warn!("dropping invalid listing for workspace {}: {}", name, e);
                return;
            }
        };
        let mut contents: HashMap<String, String> = files
            .into_iter()
            .map(|(p, c)| (p.into(), c.into()))
            .collect();
        for file_path in tree.file_paths() {
            contents.entry(file_path).or_default();
        }

        let workspace = StoredWorkspace {
            info: WorkspaceInfo {
                name: name.to_string(),
                token: None,
            },
            tree,
            files: contents,
        };
        self.state
            .lock()
            .unwrap()
            .workspaces
            .insert(name.to_string(), workspace);
    }

    /// Make the next call of `operation` (e.g. `"read_file"`) fail.
    pub fn fail_next(&self, operation: &str) {
        self.state.lock().unwrap().failures.push(operation.to_string());
    }

    /// Recorded calls as `"operation path"` strings, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn file(&self, workspace: &str, file_path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.workspaces.get(workspace)?.files.get(file_path).cloned()
    }

    pub fn tree(&self, workspace: &str) -> Option<Directory> {
        let state = self.state.lock().unwrap();
        state.workspaces.get(workspace).map(|w| w.tree.snapshot())
    }

    /// Record the call, honour injected failures, then run `f` against the workspace.
    fn record<T>(
        &self,
        operation: &str,
        workspace: &str,
        target: &str,
        f: impl FnOnce(&mut StoredWorkspace) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}", operation, target));

        if let Some(idx) = state.failures.iter().position(|op| op == operation) {
            state.failures.remove(idx);
            return Err(RemoteError::Server {
                status: 500,
                message: format!("injected failure for {}", operation),
            });
        }

        let stored = state
            .workspaces
            .get_mut(workspace)
            .ok_or_else(|| RemoteError::NotFound(workspace.to_string()))?;
        f(stored)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn workspace_info(&self, workspace: &str, token: Option<&str>) -> Result<WorkspaceInfo, RemoteError> {
        self.record("workspace_info", workspace, workspace, |w| {
            let mut info = w.info.clone();
            if let Some(token) = token {
                info.token = Some(token.to_string());
            }
            Ok(info)
        })
    }

    async fn fetch_tree(&self, workspace: &str) -> Result<Directory, RemoteError> {
        self.record("fetch_tree", workspace, workspace, |w| Ok(w.tree.snapshot()))
    }

    async fn read_file(&self, workspace: &str, file_path: &str) -> Result<String, RemoteError> {
        self.record("read_file", workspace, file_path, |w| {
            w.files
                .get(file_path)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(file_path.to_string()))
        })
    }

    async fn write_file(&self, workspace: &str, file_path: &str, content: &str) -> Result<(), RemoteError> {
        self.record("write_file", workspace, file_path, |w| {
            if !w.tree.contains_file(file_path) {
                return Err(RemoteError::NotFound(file_path.to_string()));
            }
            w.files.insert(file_path.to_string(), content.to_string());
            Ok(())
        })
    }

    async fn create_entry(
        &self,
        workspace: &str,
        entry_path: &str,
        kind: EntryKind,
        payload: Option<Bytes>,
    ) -> Result<(), RemoteError> {
        self.record("create_entry", workspace, entry_path, |w| {
            let (parent, name) = path::split_parent(entry_path);
            match kind {
                EntryKind::File => {
                    w.tree.insert_file(parent, name)?;
                    let content = payload
                        .map(|data| String::from_utf8_lossy(&data).into_owned())
                        .unwrap_or_default();
                    w.files.insert(entry_path.to_string(), content);
                }
                EntryKind::Directory => {
                    let subtree = match payload {
                        Some(archive) => {
                            let unpacked = ArchiveCodec::default().unpack_as_directory(
                                &archive,
                                parent,
                                &format!("{}.zip", name),
                                &NamingPolicy::default(),
                            )?;
                            for entry in unpacked.files {
                                w.files.insert(entry.path, entry.content);
                            }
                            Directory {
                                name: name.to_string(),
                                ..unpacked.root
                            }
                        }
                        None => Directory::new(name),
                    };
                    w.tree.insert_directory(parent, subtree)?;
                }
            }
            Ok(())
        })
    }

    async fn upload_archive(&self, workspace: &str, dir: &str, archive: Bytes) -> Result<(), RemoteError> {
        self.record("upload_archive", workspace, dir, |w| {
            let entries = ArchiveCodec::default().unpack_flat(&archive, dir, &NamingPolicy::default())?;
            let target = w.tree.directory(dir)?;
            if let Some(clash) = entries.iter().find(|e| target.has_entry(&e.name)) {
                return Err(RemoteError::Rejected(format!("{} already exists", clash.path)));
            }
            for entry in entries {
                w.tree.insert_file(dir, &entry.name)?;
                w.files.insert(entry.path, entry.content);
            }
            Ok(())
        })
    }

    async fn delete_entry(&self, workspace: &str, entry_path: &str, kind: EntryKind) -> Result<(), RemoteError> {
        self.record("delete_entry", workspace, entry_path, |w| {
            w.tree.remove_entry(entry_path, kind)?;
            w.files.retain(|p, _| !path::is_within(p, entry_path));
            Ok(())
        })
    }

    async fn rename_entry(
        &self,
        workspace: &str,
        entry_path: &str,
        kind: EntryKind,
        new_name: &str,
    ) -> Result<(), RemoteError> {
        self.record("rename_entry", workspace, entry_path, |w| {
            w.tree.rename_entry(entry_path, new_name, kind)?;
            let (parent, _) = path::split_parent(entry_path);
            let new_path = path::join(parent, new_name);
            let moved: Vec<String> = w
                .files
                .keys()
                .filter(|p| path::is_within(p, entry_path))
                .cloned()
                .collect();
            for old in moved {
                if let (Some(content), Some(new)) = (w.files.remove(&old), path::rebase(&old, entry_path, &new_path)) {
                    w.files.insert(new, content);
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryRemoteStore {
        let root = Directory {
            name: "demo".to_string(),
            files: vec!["index.ts".to_string()],
            dirs: vec![Directory {
                name: "src".to_string(),
                files: vec!["a.ts".to_string()],
                dirs: vec![],
            }],
        };
        MemoryRemoteStore::new().with_workspace("demo", root, [("src/a.ts", "a")])
    }

    #[tokio::test]
    async fn test_rename_directory_moves_contents() {
        let store = store();
        store
            .rename_entry("demo", "src", EntryKind::Directory, "lib")
            .await
            .unwrap();
        assert_eq!(store.file("demo", "lib/a.ts").as_deref(), Some("a"));
        assert_eq!(store.file("demo", "src/a.ts"), None);
        assert_eq!(store.file("demo", "index.ts").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = store();
        store.fail_next("read_file");
        assert!(store.read_file("demo", "src/a.ts").await.is_err());
        assert_eq!(store.read_file("demo", "src/a.ts").await.unwrap(), "a");
        assert_eq!(store.calls(), vec!["read_file src/a.ts", "read_file src/a.ts"]);
    }

    #[tokio::test]
    async fn test_invalid_listing_is_not_stored() {
        let root = Directory {
            name: "broken".to_string(),
            files: vec!["a.ts".to_string(), "a.ts".to_string()],
            dirs: vec![],
        };
        let store = MemoryRemoteStore::new().with_workspace("broken", root, [("a.ts", "a")]);

        assert!(store.tree("broken").is_none());
        let err = store.fetch_tree("broken").await;
        assert!(matches!(err, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let store = store();
        store
            .create_entry("demo", "src/b.ts", EntryKind::File, Some(Bytes::from_static(b"b")))
            .await
            .unwrap();
        assert_eq!(store.file("demo", "src/b.ts").as_deref(), Some("b"));

        let err = store.create_entry("demo", "src/b.ts", EntryKind::File, None).await;
        assert!(matches!(err, Err(RemoteError::Rejected(_))));

        store.delete_entry("demo", "src", EntryKind::Directory).await.unwrap();
        assert_eq!(store.file("demo", "src/b.ts"), None);
        assert!(store.tree("demo").unwrap().dirs.is_empty());
    }
}
