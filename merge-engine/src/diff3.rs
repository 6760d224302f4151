//! Three-way text merge (diff3 algorithm).
//!
//! Uses the `similar` crate for LCS matching of base against each side, then
//! walks the three inputs partitioning them into stable regions (a base line
//! matched in both sides at the current position) and the unstable regions in
//! between, which are classified by which sides departed from base.
//!
//! References:
//! - Khanna, Kuber, Pierce (2007), "A Formal Investigation of Diff3"
//! - GNU diff3 implementation

use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::types::{Diff3Hunk, MergeOutput, MergeScenario};

/// Run a three-way merge over pre-split lines.
///
/// Returns a sequence of hunks, each being either stable (all agree),
/// a one-sided change, an identical change on both sides, or a conflict.
pub fn diff3_hunks(scenario: &MergeScenario<&[&str]>) -> Vec<Diff3Hunk> {
    let base = scenario.base;
    let left = scenario.left;
    let right = scenario.right;

    let left_match = match_base(base, left);
    let right_match = match_base(base, right);

    let (mut b, mut l, mut r) = (0usize, 0usize, 0usize);
    let mut hunks = Vec::new();

    while b < base.len() || l < left.len() || r < right.len() {
        let mut run = 0;
        while b + run < base.len()
            && left_match[b + run] == Some(l + run)
            && right_match[b + run] == Some(r + run)
        {
            run += 1;
        }
        if run > 0 {
            hunks.push(Diff3Hunk::Stable(owned(&base[b..b + run])));
            b += run;
            l += run;
            r += run;
            continue;
        }

        // Next base line matched on both sides closes the unstable region.
        let (nb, nl, nr) = (b..base.len())
            .find_map(|o| match (left_match[o], right_match[o]) {
                (Some(lo), Some(ro)) if lo >= l && ro >= r => Some((o, lo, ro)),
                _ => None,
            })
            .unwrap_or((base.len(), left.len(), right.len()));

        if let Some(hunk) = classify(&base[b..nb], &left[l..nl], &right[r..nr]) {
            hunks.push(hunk);
        }
        b = nb;
        l = nl;
        r = nr;
    }

    coalesce_hunks(hunks)
}

/// Perform a full three-way merge of text split on `separator`.
pub fn diff3_merge(scenario: &MergeScenario<&str>, separator: &str) -> MergeOutput {
    let base: Vec<&str> = scenario.base.split(separator).collect();
    let left: Vec<&str> = scenario.left.split(separator).collect();
    let right: Vec<&str> = scenario.right.split(separator).collect();
    MergeOutput::new(diff3_hunks(&MergeScenario::new(&base[..], &left[..], &right[..])))
}

/// Merge `local` and `remote` against their common `base`.
///
/// Argument order follows the sync engine's convention (local first).
pub fn merge(local: &str, base: &str, remote: &str, separator: &str) -> MergeOutput {
    diff3_merge(&MergeScenario::new(base, local, remote), separator)
}

/// Extract all conflict regions from a three-way merge.
pub fn extract_conflicts(output: &MergeOutput) -> Vec<MergeScenario<Vec<String>>> {
    output
        .hunks
        .iter()
        .filter_map(|h| match h {
            Diff3Hunk::Conflict { base, left, right } => {
                Some(MergeScenario::new(base.clone(), left.clone(), right.clone()))
            }
            _ => None,
        })
        .collect()
}

/// For each base line, the index of the line it is matched with in `other`.
fn match_base(base: &[&str], other: &[&str]) -> Vec<Option<usize>> {
    let mut matched = vec![None; base.len()];
    for op in capture_diff_slices(Algorithm::Myers, base, other) {
        if let DiffOp::Equal {
            old_index,
            new_index,
            len,
        } = op
        {
            for k in 0..len {
                matched[old_index + k] = Some(new_index + k);
            }
        }
    }
    matched
}

fn classify(base: &[&str], left: &[&str], right: &[&str]) -> Option<Diff3Hunk> {
    if base.is_empty() && left.is_empty() && right.is_empty() {
        return None;
    }
    let hunk = match (left == base, right == base) {
        (true, true) => Diff3Hunk::Stable(owned(base)),
        (true, false) => Diff3Hunk::RightChanged {
            base: owned(base),
            right: owned(right),
        },
        (false, true) => Diff3Hunk::LeftChanged {
            base: owned(base),
            left: owned(left),
        },
        (false, false) if left == right => Diff3Hunk::BothChanged {
            base: owned(base),
            lines: owned(left),
        },
        (false, false) => Diff3Hunk::Conflict {
            base: owned(base),
            left: owned(left),
            right: owned(right),
        },
    };
    Some(hunk)
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| (*s).to_string()).collect()
}

fn coalesce_hunks(hunks: Vec<Diff3Hunk>) -> Vec<Diff3Hunk> {
    let mut result: Vec<Diff3Hunk> = Vec::new();
    for hunk in hunks {
        match (result.last_mut(), hunk) {
            (Some(Diff3Hunk::Stable(existing)), Diff3Hunk::Stable(new)) => existing.extend(new),
            (_, hunk) => result.push(hunk),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConflictMarkers;

    #[test]
    fn test_no_conflict() {
        let base = "line1\nline2\nline3\n";
        let left = "line1\nmodified_left\nline3\n";
        let right = "line1\nline2\nline3_right\n";
        let output = merge(left, base, right, "\n");
        assert!(!output.conflict);
        assert_eq!(
            output.render("\n", &ConflictMarkers::default()),
            "line1\nmodified_left\nline3_right\n"
        );
    }

    #[test]
    fn test_identical_changes() {
        let output = merge("line1\nchanged\n", "line1\nline2\n", "line1\nchanged\n", "\n");
        assert!(!output.conflict);
        assert!(output
            .hunks
            .iter()
            .any(|h| matches!(h, Diff3Hunk::BothChanged { .. })));
        assert_eq!(
            output.render("\n", &ConflictMarkers::default()),
            "line1\nchanged\n"
        );
    }

    #[test]
    fn test_conflict_detection() {
        let output = merge("b\n", "a\n", "c\n", "\n");
        assert!(output.conflict);
        let conflicts = extract_conflicts(&output);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].base, vec!["a".to_string()]);
        assert_eq!(conflicts[0].left, vec!["b".to_string()]);
        assert_eq!(conflicts[0].right, vec!["c".to_string()]);
    }

    #[test]
    fn test_both_append_conflicts() {
        let output = merge("a\nX\n", "a\n", "a\nY\n", "\n");
        assert!(output.conflict);
        assert_eq!(
            output.render("\n", &ConflictMarkers::labelled()),
            "a\n<<<<<<<<< LOCAL\nX\n=========\nY\n>>>>>>>>> REMOTE\n"
        );
    }

    #[test]
    fn test_identity_merge_reproduces_input() {
        let text = "alpha\nbeta\n\ngamma";
        let output = merge(text, text, text, "\n");
        assert!(!output.conflict);
        assert_eq!(output.hunks.len(), 1);
        assert_eq!(output.render("\n", &ConflictMarkers::default()), text);
    }

    #[test]
    fn test_deletion_and_insertion_on_different_sides() {
        let base = "one\ntwo\nthree\nfour";
        let left = "one\nthree\nfour";
        let right = "one\ntwo\nthree\nfour\nfive";
        let output = merge(left, base, right, "\n");
        assert!(!output.conflict);
        assert_eq!(
            output.render("\n", &ConflictMarkers::default()),
            "one\nthree\nfour\nfive"
        );
    }

    #[test]
    fn test_consumed_counts_track_inputs() {
        let base = ["a", "b", "c"];
        let left = ["a", "B", "c", "d"];
        let right = ["a", "b", "c"];
        let hunks = diff3_hunks(&MergeScenario::new(&base[..], &left[..], &right[..]));
        let totals = hunks.iter().fold((0, 0, 0), |acc, h| {
            let (b, l, r) = h.consumed();
            (acc.0 + b, acc.1 + l, acc.2 + r)
        });
        assert_eq!(totals, (3, 4, 3));
    }

    #[test]
    fn test_empty_inputs() {
        let empty: [&str; 0] = [];
        let hunks = diff3_hunks(&MergeScenario::new(&empty[..], &empty[..], &empty[..]));
        assert!(hunks.is_empty());
    }
}
