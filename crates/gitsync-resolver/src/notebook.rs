//! Three-way resolver for notebook documents.
//!
//! Cells are linearized into one line stream per version with a per-merge
//! divider line between cells, merged with diff3, then split back into cells.
//! While walking the merged hunks every output line is traced back to the cell
//! it came from in each version; those anchor cells decide which version's
//! cell type, metadata and outputs survive.

use std::sync::Arc;

use serde_json::{Map, Value};

use gitsync_core::token::generate_token;
use gitsync_core::{Cell, CursorPosition, Notebook, Origin, Result, Signal, SyncError, VersionSet};
use merge_engine::{diff3_hunks, ConflictMarkers, Diff3Hunk, MergeScenario, PatternRegistry};

use crate::prompt::{ConflictChoice, ConflictPrompt, ConflictReport};
use crate::text::{byte_offset, locate_token, ResolverState};

/// Which side of the merge a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Unmodified,
    Added,
    Removed,
    Modified,
    Conflict,
}

/// Classification of a run of lines in the merged cell stream.
///
/// `start` and `len` index the merged stream, dividers included. Removals
/// have `len == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMapEntry {
    pub start: usize,
    pub len: usize,
    pub origin: ChangeOrigin,
    pub side: Option<Side>,
}

/// Cursor inside a notebook: a cell index and a position in its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotebookCursor {
    pub cell: usize,
    pub position: CursorPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotebookMergeResult {
    pub cells: Vec<Cell>,
    pub conflict: bool,
    /// Source lines of each output cell.
    pub source: Vec<Vec<String>>,
    pub conflict_map: Vec<ConflictMapEntry>,
    /// Notebook-level metadata.
    pub metadata: Map<String, Value>,
}

/// Key-level three-way merge of two JSON objects against their base.
///
/// A key changed on one side takes that side's value (deletions included);
/// a key changed differently on both sides keeps the local value.
pub fn merge_metadata(
    base: &Map<String, Value>,
    local: &Map<String, Value>,
    remote: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    let keys = local.keys().chain(remote.keys()).chain(base.keys());
    for key in keys {
        if merged.contains_key(key) {
            continue;
        }
        let (b, l, r) = (base.get(key), local.get(key), remote.get(key));
        let value = if l == r || r == b {
            l
        } else if l == b {
            r
        } else {
            l
        };
        if let Some(value) = value {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// One version's cells flattened into lines.
struct CellStream<'a> {
    lines: Vec<&'a str>,
    /// Cell index of each line; `None` for divider lines.
    cell_of: Vec<Option<usize>>,
}

impl<'a> CellStream<'a> {
    fn new(notebook: &'a Notebook, divider: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut cell_of = Vec::new();
        for (index, cell) in notebook.cells.iter().enumerate() {
            if index > 0 {
                lines.push(divider);
                cell_of.push(None);
            }
            for line in cell.source.split('\n') {
                lines.push(line);
                cell_of.push(Some(index));
            }
        }
        Self { lines, cell_of }
    }

    fn cell_at(&self, position: usize) -> Option<usize> {
        self.cell_of.get(position).copied().flatten()
    }
}

/// An output cell under construction.
#[derive(Default)]
struct PendingCell {
    lines: Vec<String>,
    base: Option<usize>,
    local: Option<usize>,
    remote: Option<usize>,
    local_changed: bool,
    remote_changed: bool,
    conflict: bool,
}

impl PendingCell {
    fn anchor(&mut self, origin: Origin, cell: Option<usize>) {
        let slot = match origin {
            Origin::Base => &mut self.base,
            Origin::Local => &mut self.local,
            Origin::Remote => &mut self.remote,
        };
        if slot.is_none() {
            *slot = cell;
        }
    }

    fn is_empty(&self) -> bool {
        self.lines.is_empty()
            && !self.conflict
            && self.base.is_none()
            && self.local.is_none()
            && self.remote.is_none()
    }
}

/// Walks diff3 hunks over the three cell streams, cutting output cells at
/// divider lines.
struct CellWalker<'a> {
    divider: &'a str,
    base: &'a CellStream<'a>,
    local: &'a CellStream<'a>,
    remote: &'a CellStream<'a>,
    pending: PendingCell,
    done: Vec<PendingCell>,
    conflict_map: Vec<ConflictMapEntry>,
    position: usize,
}

impl<'a> CellWalker<'a> {
    fn finish_cell(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            self.done.push(pending);
        }
    }

    fn record(&mut self, len: usize, origin: ChangeOrigin, side: Option<Side>) {
        self.conflict_map.push(ConflictMapEntry {
            start: self.position,
            len,
            origin,
            side,
        });
        self.position += len;
    }

    fn stable(&mut self, lines: &[String], at: (usize, usize, usize)) {
        for (k, line) in lines.iter().enumerate() {
            if line == self.divider {
                self.finish_cell();
                continue;
            }
            self.pending.anchor(Origin::Base, self.base.cell_at(at.0 + k));
            self.pending.anchor(Origin::Local, self.local.cell_at(at.1 + k));
            self.pending.anchor(Origin::Remote, self.remote.cell_at(at.2 + k));
            self.pending.lines.push(line.clone());
        }
        self.record(lines.len(), ChangeOrigin::Unmodified, None);
    }

    /// Lines taken from one side (or both, for identical changes) in place
    /// of `base_len` base lines starting at `at.0`.
    fn changed(
        &mut self,
        base_len: usize,
        lines: &[String],
        side: Side,
        at: (usize, usize, usize),
    ) {
        // The first replaced base cell, so an edited cell is not mistaken for
        // an added one. The unchanged side still holds the base lines here.
        let replaced = (at.0..at.0 + base_len).find_map(|i| self.base.cell_at(i));
        let untouched = match side {
            Side::Local => (at.2..at.2 + base_len)
                .find_map(|i| self.remote.cell_at(i))
                .map(|cell| (Origin::Remote, cell)),
            Side::Remote => (at.1..at.1 + base_len)
                .find_map(|i| self.local.cell_at(i))
                .map(|cell| (Origin::Local, cell)),
            Side::Both => None,
        };
        let mut first = true;
        for (k, line) in lines.iter().enumerate() {
            if line == self.divider {
                self.finish_cell();
                continue;
            }
            if first {
                first = false;
                self.pending.anchor(Origin::Base, replaced);
                if let Some((origin, cell)) = untouched {
                    self.pending.anchor(origin, Some(cell));
                }
            }
            if side != Side::Remote {
                self.pending.anchor(Origin::Local, self.local.cell_at(at.1 + k));
                self.pending.local_changed = true;
            }
            if side != Side::Local {
                self.pending.anchor(Origin::Remote, self.remote.cell_at(at.2 + k));
                self.pending.remote_changed = true;
            }
            self.pending.lines.push(line.clone());
        }
        let origin = if base_len == 0 {
            ChangeOrigin::Added
        } else if lines.is_empty() {
            ChangeOrigin::Removed
        } else {
            ChangeOrigin::Modified
        };
        self.record(lines.len(), origin, Some(side));
    }

    fn conflict(&mut self, left: &[String], right: &[String], at: (usize, usize)) {
        let markers = ConflictMarkers::labelled();
        let mut emitted = 0;
        self.pending.conflict = true;
        self.pending.lines.push(markers.start.clone());
        for (k, line) in left.iter().enumerate() {
            if line != self.divider {
                self.pending.anchor(Origin::Local, self.local.cell_at(at.0 + k));
                self.pending.lines.push(line.clone());
                emitted += 1;
            }
        }
        self.pending.lines.push(markers.divider.clone());
        for (k, line) in right.iter().enumerate() {
            if line != self.divider {
                self.pending.anchor(Origin::Remote, self.remote.cell_at(at.1 + k));
                self.pending.lines.push(line.clone());
                emitted += 1;
            }
        }
        self.pending.lines.push(markers.end.clone());
        self.record(emitted + 3, ChangeOrigin::Conflict, None);
    }
}

/// Merge the cells and metadata of three notebook versions.
pub fn merge_notebooks(base: &Notebook, local: &Notebook, remote: &Notebook) -> NotebookMergeResult {
    merge_notebooks_with(base, local, remote, &PatternRegistry::new())
}

fn merge_notebooks_with(
    base: &Notebook,
    local: &Notebook,
    remote: &Notebook,
    patterns: &PatternRegistry,
) -> NotebookMergeResult {
    let divider = format!("<gitsync-cell-divider {}>", generate_token());
    let streams = (
        CellStream::new(base, &divider),
        CellStream::new(local, &divider),
        CellStream::new(remote, &divider),
    );
    let hunks = diff3_hunks(&MergeScenario::new(
        &streams.0.lines[..],
        &streams.1.lines[..],
        &streams.2.lines[..],
    ));

    let mut walker = CellWalker {
        divider: &divider,
        base: &streams.0,
        local: &streams.1,
        remote: &streams.2,
        pending: PendingCell::default(),
        done: Vec::new(),
        conflict_map: Vec::new(),
        position: 0,
    };
    let mut conflict = false;
    let (mut b, mut l, mut r) = (0usize, 0usize, 0usize);

    for hunk in &hunks {
        match hunk {
            Diff3Hunk::Stable(lines) => walker.stable(lines, (b, l, r)),
            Diff3Hunk::LeftChanged { base, left } => {
                walker.changed(base.len(), left, Side::Local, (b, l, r))
            }
            Diff3Hunk::RightChanged { base, right } => {
                walker.changed(base.len(), right, Side::Remote, (b, l, r))
            }
            Diff3Hunk::BothChanged { base, lines } => {
                walker.changed(base.len(), lines, Side::Both, (b, l, r))
            }
            Diff3Hunk::Conflict { base, left, right } => {
                let scenario = MergeScenario::new(&base[..], &left[..], &right[..]);
                match patterns.try_resolve(&scenario) {
                    Some(lines) if &lines == left => {
                        walker.changed(base.len(), left, Side::Local, (b, l, r))
                    }
                    Some(lines) if &lines == right => {
                        walker.changed(base.len(), right, Side::Remote, (b, l, r))
                    }
                    _ => {
                        conflict = true;
                        walker.conflict(left, right, (l, r));
                    }
                }
            }
        }
        let (db, dl, dr) = hunk.consumed();
        b += db;
        l += dl;
        r += dr;
    }
    walker.finish_cell();

    let source: Vec<Vec<String>> = walker.done.iter().map(|p| p.lines.clone()).collect();
    let cells = walker
        .done
        .iter()
        .map(|pending| build_cell(pending, base, local, remote))
        .collect();

    NotebookMergeResult {
        cells,
        conflict,
        source,
        conflict_map: walker.conflict_map,
        metadata: merge_metadata(&base.metadata, &local.metadata, &remote.metadata),
    }
}

fn build_cell(pending: &PendingCell, base: &Notebook, local: &Notebook, remote: &Notebook) -> Cell {
    let source = pending.lines.join("\n");
    if pending.conflict {
        return Cell::markdown(source);
    }

    let b = pending.base.and_then(|i| base.cells.get(i));
    let l = pending.local.and_then(|i| local.cells.get(i));
    let r = pending.remote.and_then(|i| remote.cells.get(i));

    let template = if pending.remote_changed && !pending.local_changed {
        r.or(l).or(b)
    } else {
        l.or(r).or(b)
    };
    let mut cell = template.cloned().unwrap_or_else(|| Cell::code(""));

    if let (Some(b), Some(l), Some(r)) = (b, l, r) {
        cell.metadata = merge_metadata(&b.metadata, &l.metadata, &r.metadata);
    }
    if b.is_none() {
        // Added cells have not been trusted on this machine yet.
        cell.metadata.remove("trusted");
    }
    cell.source = source;
    cell
}

/// Three-way resolver for one notebook.
pub struct NotebookResolver {
    path: String,
    versions: VersionSet<Notebook>,
    merged: Option<Notebook>,
    token: Option<String>,
    requested: Option<NotebookCursor>,
    cursor: Option<NotebookCursor>,
    state: ResolverState,
    conflict: bool,
    conflict_state: Arc<Signal<bool>>,
    patterns: PatternRegistry,
}

impl NotebookResolver {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            versions: VersionSet::new(),
            merged: None,
            token: None,
            requested: None,
            cursor: None,
            state: ResolverState::Clean,
            conflict: false,
            conflict_state: Arc::new(Signal::new()),
            patterns: PatternRegistry::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: PatternRegistry) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn add_version(&mut self, content: Notebook, origin: Origin) {
        self.versions.set(origin, content);
    }

    pub fn versions(&self) -> &VersionSet<Notebook> {
        &self.versions
    }

    pub fn state(&self) -> ResolverState {
        self.state
    }

    pub fn merged(&self) -> Option<&Notebook> {
        self.merged.as_ref()
    }

    pub fn conflict(&self) -> bool {
        self.conflict
    }

    pub fn conflict_state(&self) -> Arc<Signal<bool>> {
        self.conflict_state.clone()
    }

    pub fn clear_conflict(&mut self) {
        self.state = ResolverState::Clean;
        self.set_conflict(false);
    }

    pub fn cursor(&self) -> Option<NotebookCursor> {
        self.cursor
    }

    /// Embed a fresh token into the local version. The cell index is clamped
    /// to the last cell; a notebook without cells gets no token.
    pub fn set_cursor_token(&mut self, cursor: NotebookCursor) -> Result<()> {
        let mut local = self.clean_local()?;
        let Some(last) = local.cells.len().checked_sub(1) else {
            self.versions.local = Some(local);
            self.token = None;
            self.requested = None;
            return Ok(());
        };
        let cell_index = cursor.cell.min(last);
        let token = generate_token();
        let source = &mut local.cells[cell_index].source;
        let offset = byte_offset(source, cursor.position);
        source.insert_str(offset, &token);

        self.versions.local = Some(local);
        self.token = Some(token);
        self.requested = Some(NotebookCursor {
            cell: cell_index,
            position: cursor.position,
        });
        Ok(())
    }

    /// Merge local and remote against base. See [`crate::TextResolver::merge_versions`].
    pub async fn merge_versions(
        &mut self,
        prompt: &dyn ConflictPrompt,
    ) -> Result<Option<Notebook>> {
        let base = self.versions.require(Origin::Base)?.clone();
        let tagged = self.versions.require(Origin::Local)?.clone();
        let remote = self.versions.require(Origin::Remote)?.clone();
        let local = self.clean_local()?;

        self.state = ResolverState::Merging;
        self.versions.local = Some(local.clone());
        self.cursor = None;

        if local == remote {
            self.versions.base = Some(remote);
            self.merged = None;
            self.token = None;
            self.state = ResolverState::Resolved;
            self.set_conflict(false);
            return Ok(None);
        }

        let mut result = merge_notebooks_with(&base, &tagged, &remote, &self.patterns);
        if result.conflict && tagged != local {
            let untagged = merge_notebooks_with(&base, &local, &remote, &self.patterns);
            if !untagged.conflict {
                result = untagged;
            }
        }
        let (merged, merged_cursor) = self.take_token(assemble(&local, result.cells, result.metadata));

        if !result.conflict {
            self.cursor = merged_cursor.or(self.requested);
            self.versions.base = Some(merged.clone());
            self.merged = Some(merged.clone());
            self.state = ResolverState::Resolved;
            self.set_conflict(false);
            tracing::debug!(path = %self.path, cells = merged.cells.len(), "Merged notebook without conflict");
            return Ok(Some(merged));
        }

        let report = ConflictReport {
            path: self.path.clone(),
            marked: outline(&merged),
            local: outline(&local),
            remote: outline(&remote),
        };
        let choice = prompt.choose(&report).await;
        tracing::info!(path = %self.path, choice = %choice, "Notebook conflict settled");

        let merged = match choice {
            ConflictChoice::KeepLocal => {
                let (_, cursor) = self.take_token(tagged);
                self.cursor = cursor;
                self.set_conflict(false);
                self.state = ResolverState::Resolved;
                local
            }
            ConflictChoice::KeepRemote => {
                self.cursor = self.requested;
                self.set_conflict(false);
                self.state = ResolverState::Resolved;
                remote.clone()
            }
            ConflictChoice::ViewDiff => {
                self.cursor = merged_cursor;
                self.set_conflict(true);
                self.state = ResolverState::Conflicted;
                merged
            }
            ConflictChoice::Ignore => {
                self.token = None;
                self.set_conflict(true);
                self.state = ResolverState::Conflicted;
                return Err(SyncError::ConflictIgnored {
                    path: self.path.clone(),
                });
            }
        };

        self.token = None;
        self.versions.base = Some(remote);
        self.merged = Some(merged.clone());
        Ok(Some(merged))
    }

    fn clean_local(&self) -> Result<Notebook> {
        let mut local = self.versions.require(Origin::Local)?.clone();
        if let Some(token) = &self.token {
            for cell in &mut local.cells {
                if cell.source.contains(token.as_str()) {
                    cell.source = cell.source.replace(token.as_str(), "");
                }
            }
        }
        Ok(local)
    }

    fn take_token(&self, mut notebook: Notebook) -> (Notebook, Option<NotebookCursor>) {
        let Some(token) = &self.token else {
            return (notebook, None);
        };
        let mut found = None;
        for (index, cell) in notebook.cells.iter_mut().enumerate() {
            if !cell.source.contains(token.as_str()) {
                continue;
            }
            let (source, position) = locate_token(&cell.source, token);
            cell.source = source;
            if found.is_none() {
                found = position.map(|position| NotebookCursor {
                    cell: index,
                    position,
                });
            }
        }
        (notebook, found)
    }

    fn set_conflict(&mut self, conflict: bool) {
        if self.conflict != conflict {
            self.conflict = conflict;
            self.conflict_state.emit(&conflict);
        }
    }
}

fn assemble(like: &Notebook, cells: Vec<Cell>, metadata: Map<String, Value>) -> Notebook {
    Notebook {
        cells,
        metadata,
        nbformat: like.nbformat,
        nbformat_minor: like.nbformat_minor,
    }
}

/// Plain-text view of a notebook for conflict prompts.
fn outline(notebook: &Notebook) -> String {
    notebook
        .cells
        .iter()
        .enumerate()
        .map(|(i, cell)| format!("[{}] {}\n{}", i, cell.cell_type, cell.source))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::FixedPrompt;
    use serde_json::json;

    fn notebook(cells: Vec<Cell>) -> Notebook {
        Notebook::new(cells)
    }

    #[test]
    fn test_identical_notebooks_roundtrip() {
        let nb = notebook(vec![
            Cell::markdown("# Title\nintro").with_metadata("tags", json!(["a"])),
            Cell::code("x = 1\ny = 2\n"),
            Cell::code(""),
        ]);
        let result = merge_notebooks(&nb, &nb, &nb);
        assert!(!result.conflict);
        assert_eq!(result.cells, nb.cells);
        assert_eq!(result.source.len(), 3);
        assert!(result
            .conflict_map
            .iter()
            .all(|e| e.origin == ChangeOrigin::Unmodified));
    }

    #[test]
    fn test_empty_notebooks() {
        let nb = notebook(Vec::new());
        let result = merge_notebooks(&nb, &nb, &nb);
        assert!(!result.conflict);
        assert!(result.cells.is_empty());
    }

    #[test]
    fn test_cell_added_on_each_side() {
        let base = notebook(vec![Cell::code("a"), Cell::code("b")]);
        let local = notebook(vec![
            Cell::markdown("new local").with_metadata("trusted", json!(true)),
            Cell::code("a"),
            Cell::code("b"),
        ]);
        let remote = notebook(vec![Cell::code("a"), Cell::code("b"), Cell::code("new remote")]);

        let result = merge_notebooks(&base, &local, &remote);
        assert!(!result.conflict);
        let sources: Vec<&str> = result.cells.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["new local", "a", "b", "new remote"]);
        assert_eq!(result.cells[0].cell_type, "markdown");
        assert!(!result.cells[0].metadata.contains_key("trusted"));
        assert!(result
            .conflict_map
            .iter()
            .any(|e| e.origin == ChangeOrigin::Added && e.side == Some(Side::Remote)));
    }

    #[test]
    fn test_cell_removed_remotely() {
        let base = notebook(vec![Cell::code("a"), Cell::code("b"), Cell::code("c")]);
        let remote = notebook(vec![Cell::code("a"), Cell::code("c")]);
        let result = merge_notebooks(&base, &base, &remote);
        assert!(!result.conflict);
        let sources: Vec<&str> = result.cells.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "c"]);
        assert!(result
            .conflict_map
            .iter()
            .any(|e| e.origin == ChangeOrigin::Removed && e.len == 0));
    }

    #[test]
    fn test_remote_edit_keeps_remote_cell() {
        let base = notebook(vec![Cell::code("a"), Cell::code("print(1)")]);
        let mut edited = Cell::code("print(2)");
        edited
            .extra
            .insert("execution_count".into(), json!(7));
        let remote = notebook(vec![Cell::code("a"), edited.clone()]);

        let result = merge_notebooks(&base, &base, &remote);
        assert!(!result.conflict);
        assert_eq!(result.cells[1], edited);
    }

    #[test]
    fn test_conflicting_edit_becomes_markdown_cell() {
        let base = notebook(vec![Cell::code("a"), Cell::code("x = 0")]);
        let local = notebook(vec![Cell::code("a"), Cell::code("x = 1")]);
        let remote = notebook(vec![Cell::code("a"), Cell::code("x = 2")]);

        let result = merge_notebooks(&base, &local, &remote);
        assert!(result.conflict);
        assert_eq!(result.cells.len(), 2);
        assert_eq!(result.cells[0].source, "a");
        let marked = &result.cells[1];
        assert_eq!(marked.cell_type, "markdown");
        assert_eq!(
            marked.source,
            "<<<<<<<<< LOCAL\nx = 1\n=========\nx = 2\n>>>>>>>>> REMOTE"
        );
        assert!(result
            .conflict_map
            .iter()
            .any(|e| e.origin == ChangeOrigin::Conflict && e.len == 5));
    }

    #[test]
    fn test_cell_metadata_merged_per_key() {
        let base = notebook(vec![Cell::code("a").with_metadata("collapsed", json!(false))]);
        let local = notebook(vec![Cell::code("a")
            .with_metadata("collapsed", json!(false))
            .with_metadata("tags", json!(["mine"]))]);
        let remote = notebook(vec![Cell::code("a").with_metadata("collapsed", json!(true))]);

        let result = merge_notebooks(&base, &local, &remote);
        let metadata = &result.cells[0].metadata;
        assert_eq!(metadata.get("collapsed"), Some(&json!(true)));
        assert_eq!(metadata.get("tags"), Some(&json!(["mine"])));
    }

    #[test]
    fn test_source_edit_keeps_other_side_metadata() {
        let base = notebook(vec![Cell::markdown("a"), Cell::code("x = 0")]);
        let local = notebook(vec![Cell::markdown("a"), Cell::code("x = 1")]);
        let remote = notebook(vec![
            Cell::markdown("a"),
            Cell::code("x = 0").with_metadata("tags", json!(["remote"])),
        ]);

        let result = merge_notebooks(&base, &local, &remote);
        assert!(!result.conflict);
        assert_eq!(result.cells[1].source, "x = 1");
        assert_eq!(result.cells[1].metadata.get("tags"), Some(&json!(["remote"])));

        // Same edit mirrored: remote rewrites the source, local tags the cell.
        let result = merge_notebooks(&base, &remote, &local);
        assert!(!result.conflict);
        assert_eq!(result.cells[1].source, "x = 1");
        assert_eq!(result.cells[1].metadata.get("tags"), Some(&json!(["remote"])));
    }

    #[test]
    fn test_merge_metadata_rules() {
        let base = json!({"keep": 1, "gone": 1, "both": 1}).as_object().cloned().unwrap();
        let local = json!({"keep": 1, "both": 2, "new": "l"}).as_object().cloned().unwrap();
        let remote = json!({"keep": 1, "gone": 1, "both": 3}).as_object().cloned().unwrap();
        let merged = merge_metadata(&base, &local, &remote);
        assert_eq!(
            Value::Object(merged),
            json!({"keep": 1, "both": 2, "new": "l"})
        );
    }

    #[tokio::test]
    async fn test_resolver_identical_adopts_base() {
        let nb = notebook(vec![Cell::code("a")]);
        let mut resolver = NotebookResolver::new("a.ipynb");
        resolver.add_version(notebook(Vec::new()), Origin::Base);
        resolver.add_version(nb.clone(), Origin::Local);
        resolver.add_version(nb.clone(), Origin::Remote);
        let out = resolver
            .merge_versions(&FixedPrompt(ConflictChoice::Ignore))
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(resolver.versions().base.as_ref(), Some(&nb));
    }

    #[tokio::test]
    async fn test_resolver_tracks_cursor_across_cells() {
        let base = notebook(vec![Cell::code("a"), Cell::code("value = 1")]);
        let remote = notebook(vec![Cell::markdown("intro"), Cell::code("a"), Cell::code("value = 1")]);
        let mut resolver = NotebookResolver::new("a.ipynb");
        resolver.add_version(base.clone(), Origin::Base);
        resolver.add_version(base.clone(), Origin::Local);
        resolver.add_version(remote.clone(), Origin::Remote);
        resolver
            .set_cursor_token(NotebookCursor {
                cell: 1,
                position: CursorPosition::new(0, 5),
            })
            .unwrap();

        let merged = resolver
            .merge_versions(&FixedPrompt(ConflictChoice::Ignore))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merged.cells, remote.cells);
        assert_eq!(
            resolver.cursor(),
            Some(NotebookCursor {
                cell: 2,
                position: CursorPosition::new(0, 5),
            })
        );
        assert_eq!(resolver.versions().base.as_ref(), Some(&merged));
    }

    #[tokio::test]
    async fn test_resolver_view_diff_sets_conflict() {
        let base = notebook(vec![Cell::code("x = 0")]);
        let mut resolver = NotebookResolver::new("a.ipynb");
        resolver.add_version(base, Origin::Base);
        resolver.add_version(notebook(vec![Cell::code("x = 1")]), Origin::Local);
        resolver.add_version(notebook(vec![Cell::code("x = 2")]), Origin::Remote);

        let merged = resolver
            .merge_versions(&FixedPrompt(ConflictChoice::ViewDiff))
            .await
            .unwrap()
            .unwrap();
        assert!(resolver.conflict());
        assert_eq!(merged.cells[0].cell_type, "markdown");

        resolver.clear_conflict();
        assert!(!resolver.conflict());
    }

    #[tokio::test]
    async fn test_resolver_ignore_errors() {
        let mut resolver = NotebookResolver::new("a.ipynb");
        resolver.add_version(notebook(vec![Cell::code("x = 0")]), Origin::Base);
        resolver.add_version(notebook(vec![Cell::code("x = 1")]), Origin::Local);
        resolver.add_version(notebook(vec![Cell::code("x = 2")]), Origin::Remote);
        let err = resolver
            .merge_versions(&FixedPrompt(ConflictChoice::Ignore))
            .await
            .unwrap_err();
        assert!(err.is_conflict_ignored());
        assert!(resolver.conflict());
    }
}
