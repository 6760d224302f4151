pub mod notebook;
pub mod prompt;
pub mod text;

pub use notebook::{
    merge_metadata, merge_notebooks, ChangeOrigin, ConflictMapEntry, NotebookCursor,
    NotebookMergeResult, NotebookResolver, Side,
};
pub use prompt::{ConflictChoice, ConflictPrompt, ConflictReport, FixedPrompt};
pub use text::{ResolverState, TextResolver};
