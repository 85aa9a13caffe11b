//! k-way merging of sorted snapshots.

pub mod merger;

pub use merger::{jaccard, merge_sorted, FoldOp, JaccardTotals, MergeSummary};
