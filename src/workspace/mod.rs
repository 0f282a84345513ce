mod documents;
mod error;
pub mod naming;
pub mod path;
mod tabs;
mod tree;

pub use documents::{DocumentCache, DocumentHandle, DocumentId, TextBuffer};
pub use error::{Result, WorkspaceError};
pub use naming::{NamingPolicy, NamingRule};
pub use tabs::TabSet;
pub use tree::{Directory, EntryKind, RemovedEntry, WorkspaceTree};
