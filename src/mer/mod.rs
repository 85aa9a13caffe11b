//! 2-bit packed k-mer values and the DNA byte-code table.

pub mod codes;
pub mod kmer;

pub use codes::{dna_code, DnaCode, AMBIG_MARK};
pub use kmer::{Mer, MAX_K};
