//! Input streaming: the cooperative producer-consumer pool, the
//! FASTA/FASTQ window parser, and the rolling mer iterator.

pub mod mers;
pub mod parser;
pub mod pool;

pub use mers::MerStream;
pub use parser::{AmbigPolicy, SeqParser};
pub use pool::{CooperativePool, PoolJob, Producer, SeqBuffer};
