//! Core types for the merge engine.
//!
//! A three-way merge is described by a [`MergeScenario`] (base, left, right)
//! and produces a sequence of [`Diff3Hunk`]s. Left is the local side of a
//! synchronization, right the remote side.

/// The three-way merge scenario: base, left, and right revisions.
#[derive(Debug, Clone)]
pub struct MergeScenario<T> {
    pub base: T,
    pub left: T,
    pub right: T,
}

impl<T> MergeScenario<T> {
    pub fn new(base: T, left: T, right: T) -> Self {
        Self { base, left, right }
    }
}

/// A line-level hunk from diff3.
///
/// Every hunk except `Stable` carries the base lines it replaces, so callers
/// can track positions in all three inputs while walking the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff3Hunk {
    /// All three versions agree.
    Stable(Vec<String>),
    /// Only left changed from base.
    LeftChanged { base: Vec<String>, left: Vec<String> },
    /// Only right changed from base.
    RightChanged { base: Vec<String>, right: Vec<String> },
    /// Both sides made the same change.
    BothChanged { base: Vec<String>, lines: Vec<String> },
    /// Both changed differently.
    Conflict {
        base: Vec<String>,
        left: Vec<String>,
        right: Vec<String>,
    },
}

impl Diff3Hunk {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Diff3Hunk::Conflict { .. })
    }

    /// Lines this hunk contributes to a clean merge. Empty for conflicts.
    pub fn merged_lines(&self) -> &[String] {
        match self {
            Diff3Hunk::Stable(lines) => lines,
            Diff3Hunk::LeftChanged { left, .. } => left,
            Diff3Hunk::RightChanged { right, .. } => right,
            Diff3Hunk::BothChanged { lines, .. } => lines,
            Diff3Hunk::Conflict { .. } => &[],
        }
    }

    /// Number of (base, left, right) input lines consumed by this hunk.
    pub fn consumed(&self) -> (usize, usize, usize) {
        match self {
            Diff3Hunk::Stable(lines) => (lines.len(), lines.len(), lines.len()),
            Diff3Hunk::LeftChanged { base, left } => (base.len(), left.len(), base.len()),
            Diff3Hunk::RightChanged { base, right } => (base.len(), base.len(), right.len()),
            Diff3Hunk::BothChanged { base, lines } => (base.len(), lines.len(), lines.len()),
            Diff3Hunk::Conflict { base, left, right } => (base.len(), left.len(), right.len()),
        }
    }
}

/// Marker lines framing a conflict region in rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictMarkers {
    pub start: String,
    pub divider: String,
    pub end: String,
}

impl ConflictMarkers {
    /// Markers with the LOCAL/REMOTE labels shown to users.
    pub fn labelled() -> Self {
        Self {
            start: "<<<<<<<<< LOCAL".into(),
            divider: "=========".into(),
            end: ">>>>>>>>> REMOTE".into(),
        }
    }

    /// True if `line` is one of the three marker lines.
    pub fn is_marker(&self, line: &str) -> bool {
        line == self.start || line == self.divider || line == self.end
    }
}

impl Default for ConflictMarkers {
    fn default() -> Self {
        Self {
            start: "<<<<<<<<<".into(),
            divider: "=========".into(),
            end: ">>>>>>>>>".into(),
        }
    }
}

/// Result of a full three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    pub conflict: bool,
    pub hunks: Vec<Diff3Hunk>,
}

impl MergeOutput {
    pub fn new(hunks: Vec<Diff3Hunk>) -> Self {
        let conflict = hunks.iter().any(Diff3Hunk::is_conflict);
        Self { conflict, hunks }
    }

    /// Recompute `conflict` after hunks were rewritten.
    pub fn refresh(&mut self) {
        self.conflict = self.hunks.iter().any(Diff3Hunk::is_conflict);
    }

    /// Flatten the hunks into output lines, framing conflicts with `markers`.
    pub fn lines(&self, markers: &ConflictMarkers) -> Vec<String> {
        let mut out = Vec::new();
        for hunk in &self.hunks {
            match hunk {
                Diff3Hunk::Conflict { left, right, .. } => {
                    out.push(markers.start.clone());
                    out.extend(left.iter().cloned());
                    out.push(markers.divider.clone());
                    out.extend(right.iter().cloned());
                    out.push(markers.end.clone());
                }
                other => out.extend(other.merged_lines().iter().cloned()),
            }
        }
        out
    }

    /// Render as text joined by `separator`.
    pub fn render(&self, separator: &str, markers: &ConflictMarkers) -> String {
        self.lines(markers).join(separator)
    }
}
