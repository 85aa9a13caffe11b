// kmercount: memory-bounded multi-threaded k-mer counting.

pub mod cli;
pub mod count;
pub mod dump;
pub mod error;
pub mod hash;
pub mod mem;
pub mod mer;
pub mod merge;
pub mod notify;
pub mod stream;
pub mod util;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level re-exports for the most common API entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// Crate-wide error type and result alias.
pub use error::{Error, Result};

/// 2-bit packed k-mer value type.
pub use mer::Mer;

/// The lock-free counting hash and its shared grow/dump wrapper.
pub use hash::{CountingHash, HashArray};

/// One counting run, end to end (inputs → sorted index file).
pub use count::{count_to_path, CountConfig, CountSummary};

/// Sorted snapshot writer and reader.
pub use dump::{SortedDumper, SortedReader};

/// k-way snapshot merging.
pub use merge::{merge_sorted, FoldOp};

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");
