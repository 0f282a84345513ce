//! Client-side workspace sync for a browser IDE backend.
//!
//! A `SyncEngine` mirrors one remote workspace: the directory tree, a text
//! document per file, and the editor tabs that point at them. Mutations go to
//! the `RemoteStore` first and are applied locally only once the store accepts
//! them.

pub mod archive;
pub mod remote;
pub mod sync;
pub mod workspace;

pub use archive::{ArchiveCodec, Compression, NewEntry};
pub use remote::{HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteStore, WorkspaceInfo};
pub use sync::{EngineOptions, SyncConfig, SyncEngine, WorkspaceEvent, WorkspaceHandle};
pub use workspace::{Directory, EntryKind, NamingPolicy, WorkspaceError};
