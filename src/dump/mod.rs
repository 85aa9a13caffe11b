//! On-disk formats: sorted snapshot files (binary and text), the raw
//! within-run format, and their readers.

pub mod header;
pub mod raw;
pub mod reader;
pub mod sorted;
pub mod token_ring;

pub use header::{DumpFooter, DumpFormat, FileHeader};
pub use reader::SortedReader;
pub use sorted::{BodyFormat, DumpBounds, SortedDumper};
pub use token_ring::TokenRing;
