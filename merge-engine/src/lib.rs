//! # merge-engine
//!
//! Line-level three-way merge used by the gitsync resolvers.
//!
//! 1. **diff3**: partitions base/left/right into stable regions and the
//!    changed regions between them, classifying each change as one-sided,
//!    identical on both sides, or conflicting.
//!    *Based on: Khanna, Kuber, Pierce, "A Formal Investigation of Diff3", 2007*
//!
//! 2. **Pattern rules**: resolve false conflicts that diff3 reports when one
//!    side's addition already contains the other's.
//!
//! ## Example
//!
//! ```rust
//! use merge_engine::{diff3, ConflictMarkers};
//!
//! let output = diff3::merge("a\nlocal\n", "a\n", "a\nremote\n", "\n");
//! assert!(output.conflict);
//! println!("{}", output.render("\n", &ConflictMarkers::labelled()));
//! ```

pub mod diff3;
pub mod patterns;
pub mod types;

// Re-export primary public API
pub use diff3::{diff3_hunks, diff3_merge, merge};
pub use patterns::{PatternRegistry, PatternRule, PrefixExtensionRule};
pub use types::{ConflictMarkers, Diff3Hunk, MergeOutput, MergeScenario};
