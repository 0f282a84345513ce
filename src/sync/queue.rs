use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::engine::{EngineOptions, SyncEngine};
use super::events::{EventBus, TabsSnapshot, WorkspaceEvent};
use crate::archive::NewEntry;
use crate::remote::{RemoteStore, WorkspaceInfo};
use crate::workspace::{Directory, EntryKind, Result, WorkspaceError};

/// Pending operations before senders start waiting
const QUEUE_CAPACITY: usize = 32;

type Job = Box<dyn for<'a> FnOnce(&'a mut SyncEngine) -> BoxFuture<'a, ()> + Send>;

/// Pins the higher-ranked signature so closures passed in infer it.
fn job<F>(f: F) -> Job
where
    F: for<'a> FnOnce(&'a mut SyncEngine) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

enum QueueMessage {
    Run(Job),
    Close(oneshot::Sender<()>),
}

/// Cloneable handle to a workspace whose engine runs on its own task.
///
/// Operations from every clone are applied one at a time, in the order they
/// were submitted, so each sees the state the previous one left behind.
#[derive(Clone)]
pub struct WorkspaceHandle {
    sender: mpsc::Sender<QueueMessage>,
    events: EventBus,
    info: WorkspaceInfo,
}

impl WorkspaceHandle {
    /// Open a workspace and start its queue.
    pub async fn open(
        store: Arc<dyn RemoteStore>,
        workspace_id: &str,
        token: Option<&str>,
        options: EngineOptions,
    ) -> Result<Self> {
        let engine = SyncEngine::open(store, workspace_id, token, options).await?;
        Ok(Self::spawn(engine))
    }

    /// Move `engine` onto a new task and return a handle to it.
    pub fn spawn(engine: SyncEngine) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let events = engine.event_bus().clone();
        let info = engine.info().clone();

        tokio::spawn(queue_loop(engine, rx));

        Self {
            sender: tx,
            events,
            info,
        }
    }

    pub fn info(&self) -> &WorkspaceInfo {
        &self.info
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    /// Queue `f` against the engine and wait for its result.
    pub async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut SyncEngine) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let queued = job(move |engine| {
            async move {
                let _ = reply.send(f(engine).await);
            }
            .boxed()
        });
        self.sender
            .send(QueueMessage::Run(queued))
            .await
            .map_err(|_| WorkspaceError::Closed)?;
        rx.await.map_err(|_| WorkspaceError::Closed)?
    }

    pub async fn create_file(&self, dir: &str, name: &str) -> Result<NewEntry> {
        let (dir, name) = (dir.to_string(), name.to_string());
        self.run(move |engine| async move { engine.create_file(&dir, &name).await }.boxed())
            .await
    }

    pub async fn create_file_with_content(&self, dir: &str, name: &str, content: Bytes) -> Result<NewEntry> {
        let (dir, name) = (dir.to_string(), name.to_string());
        self.run(move |engine| {
            async move { engine.create_file_with_content(&dir, &name, content).await }.boxed()
        })
        .await
    }

    pub async fn create_files(&self, dir: &str, files: Vec<(String, Vec<u8>)>) -> Result<Vec<NewEntry>> {
        let dir = dir.to_string();
        self.run(move |engine| async move { engine.create_files(&dir, files).await }.boxed())
            .await
    }

    pub async fn create_files_from_archive(&self, dir: &str, archive: Vec<u8>) -> Result<Vec<NewEntry>> {
        let dir = dir.to_string();
        self.run(move |engine| {
            async move { engine.create_files_from_archive(&dir, &archive).await }.boxed()
        })
        .await
    }

    pub async fn create_directory(&self, dir: &str, name: &str) -> Result<String> {
        let (dir, name) = (dir.to_string(), name.to_string());
        self.run(move |engine| async move { engine.create_directory(&dir, &name).await }.boxed())
            .await
    }

    pub async fn create_directory_from_archive(
        &self,
        dir: &str,
        archive_name: &str,
        archive: Vec<u8>,
    ) -> Result<Directory> {
        let (dir, archive_name) = (dir.to_string(), archive_name.to_string());
        self.run(move |engine| {
            async move {
                engine
                    .create_directory_from_archive(&dir, &archive_name, &archive)
                    .await
            }
            .boxed()
        })
        .await
    }

    pub async fn delete(&self, entry_path: &str, kind: EntryKind) -> Result<()> {
        let entry_path = entry_path.to_string();
        self.run(move |engine| async move { engine.delete(&entry_path, kind).await }.boxed())
            .await
    }

    pub async fn rename(&self, entry_path: &str, new_name: &str, kind: EntryKind) -> Result<String> {
        let (entry_path, new_name) = (entry_path.to_string(), new_name.to_string());
        self.run(move |engine| {
            async move { engine.rename(&entry_path, &new_name, kind).await }.boxed()
        })
        .await
    }

    pub async fn activate(&self, file_path: &str) -> Result<()> {
        let file_path = file_path.to_string();
        self.run(move |engine| async move { engine.activate(&file_path) }.boxed())
            .await
    }

    pub async fn activate_none(&self) -> Result<()> {
        self.run(|engine| {
            async move {
                engine.activate_none();
                Ok(())
            }
            .boxed()
        })
        .await
    }

    pub async fn open_tab(&self, file_path: &str) -> Result<()> {
        let file_path = file_path.to_string();
        self.run(move |engine| async move { engine.open_tab(&file_path) }.boxed())
            .await
    }

    pub async fn close_tab(&self, file_path: &str) -> Result<()> {
        let file_path = file_path.to_string();
        self.run(move |engine| async move { engine.close_tab(&file_path) }.boxed())
            .await
    }

    pub async fn edit_document(&self, file_path: &str, text: String) -> Result<()> {
        let file_path = file_path.to_string();
        self.run(move |engine| async move { engine.edit_document(&file_path, text) }.boxed())
            .await
    }

    pub async fn document_text(&self, file_path: &str) -> Result<String> {
        let file_path = file_path.to_string();
        self.run(move |engine| {
            async move { engine.document(&file_path).map(|doc| doc.text().to_string()) }.boxed()
        })
        .await
    }

    pub async fn write_document(&self, file_path: &str) -> Result<()> {
        let file_path = file_path.to_string();
        self.run(move |engine| async move { engine.write_document(&file_path).await }.boxed())
            .await
    }

    pub async fn write_active_document(&self) -> Result<()> {
        self.run(|engine| async move { engine.write_active_document().await }.boxed())
            .await
    }

    pub async fn tree_snapshot(&self) -> Result<Directory> {
        self.run(|engine| async move { Ok(engine.tree().snapshot()) }.boxed())
            .await
    }

    pub async fn tabs_snapshot(&self) -> Result<TabsSnapshot> {
        self.run(|engine| async move { Ok(engine.tabs_snapshot()) }.boxed())
            .await
    }

    pub async fn download_all(&self) -> Result<Vec<u8>> {
        self.run(|engine| async move { engine.download_all() }.boxed())
            .await
    }

    pub async fn download_directory(&self, dir_path: &str) -> Result<Vec<u8>> {
        let dir_path = dir_path.to_string();
        self.run(move |engine| async move { engine.download_directory(&dir_path) }.boxed())
            .await
    }

    pub async fn resync(&self) -> Result<()> {
        self.run(|engine| async move { engine.resync().await }.boxed())
            .await
    }

    /// Finish queued work, dispose the engine and stop the task.
    /// Later calls on any clone fail with `WorkspaceError::Closed`.
    pub async fn close(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.sender
            .send(QueueMessage::Close(done))
            .await
            .map_err(|_| WorkspaceError::Closed)?;
        rx.await.map_err(|_| WorkspaceError::Closed)
    }
}

async fn queue_loop(mut engine: SyncEngine, mut rx: mpsc::Receiver<QueueMessage>) {
    log::debug!("workspace queue started for {}", engine.workspace_id());

    while let Some(message) = rx.recv().await {
        match message {
            QueueMessage::Run(job) => job(&mut engine).await,
            QueueMessage::Close(done) => {
                rx.close();
                engine.close();
                let _ = done.send(());
                return;
            }
        }
    }

    // Every handle was dropped
    engine.close();
}
