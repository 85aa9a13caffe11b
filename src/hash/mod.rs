//! The lock-free counting hash: invertible bit-matrix hashing, the
//! open-addressed array, and the grow/dump coordination wrapper.

pub mod array;
pub mod matrix;
pub mod shared;

pub use array::{AddOutcome, HashArray, HashConfig};
pub use matrix::BinMatrix;
pub use shared::{CountingHash, FullAction};
