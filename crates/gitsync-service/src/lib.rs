//! Coordinates open documents with the resolvers and the periodic git sync.

pub mod editor;
pub mod file;
pub mod service;
pub mod tracker;

pub use editor::{
    DiskEditor, DiskNotebookEditor, DiskTextEditor, Document, MemoryEditor, MemoryNotebookEditor,
    MemoryTextEditor, NotebookEditor, TextEditor,
};
pub use file::{NotebookFile, SyncFile, TextFile};
pub use service::{StatusUpdate, SyncService};
pub use tracker::FileTracker;
