//! Memory backing for the hash array: an anonymous mapped word arena and a
//! bit-field view with atomic access.

pub mod arena;
pub mod bits;

pub use arena::WordArena;
pub use bits::{BitArray, Segment};
