//! Square binary matrices over GF(2).
//!
//! The hash function is an invertible 2k×2k bit matrix: `w = M·key` mixes
//! every key bit into every output bit, the low `lsize` bits of `w` select
//! the bucket, and the inverse matrix recovers the key from the stored high
//! bits plus the bucket position. Matrices are drawn from a seeded ChaCha
//! stream so a run (and its snapshot files) is reproducible.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A dim×dim bit matrix, row-major, each row packed into ⌈dim/64⌉ words
/// (bit j of a row = word j/64, bit j%64).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinMatrix {
    dim: u32,
    wpr: usize,
    rows: Vec<u64>,
}

impl BinMatrix {
    /// Words per row for a given dimension.
    #[inline]
    pub fn words_per_row(dim: u32) -> usize {
        (dim as usize).div_ceil(64)
    }

    /// The identity matrix.
    pub fn identity(dim: u32) -> BinMatrix {
        let wpr = Self::words_per_row(dim);
        let mut rows = vec![0u64; dim as usize * wpr];
        for i in 0..dim as usize {
            rows[i * wpr + i / 64] = 1u64 << (i % 64);
        }
        BinMatrix { dim, wpr, rows }
    }

    /// Rebuild from serialized row words (row-major, `n_rows * wpr` words).
    pub fn from_rows(dim: u32, n_rows: u32, rows: Vec<u64>) -> BinMatrix {
        debug_assert_eq!(rows.len(), n_rows as usize * Self::words_per_row(dim));
        BinMatrix {
            dim,
            wpr: Self::words_per_row(dim),
            rows,
        }
    }

    /// Draw a uniformly random dim×dim matrix.
    fn random(dim: u32, rng: &mut ChaCha8Rng) -> BinMatrix {
        let wpr = Self::words_per_row(dim);
        let top_mask = if dim % 64 == 0 {
            u64::MAX
        } else {
            (1u64 << (dim % 64)) - 1
        };
        let mut rows = vec![0u64; dim as usize * wpr];
        for r in 0..dim as usize {
            for w in 0..wpr {
                let mut v = rng.next_u64();
                if w == wpr - 1 {
                    v &= top_mask;
                }
                rows[r * wpr + w] = v;
            }
        }
        BinMatrix { dim, wpr, rows }
    }

    /// Draw a random invertible matrix and its inverse from `seed`.
    ///
    /// Singular draws are discarded; about 29% of uniform draws are
    /// invertible, so a handful of attempts suffices.
    pub fn random_invertible(dim: u32, seed: u64) -> (BinMatrix, BinMatrix) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        loop {
            let m = Self::random(dim, &mut rng);
            if let Some(inv) = m.inverse() {
                return (m, inv);
            }
        }
    }

    #[inline]
    pub fn dim(&self) -> u32 {
        self.dim
    }

    /// Number of rows held (the full square, or a serialized prefix).
    #[inline]
    pub fn row_count(&self) -> u32 {
        (self.rows.len() / self.wpr) as u32
    }

    /// Row `i` as its packed words.
    #[inline]
    pub fn row(&self, i: u32) -> &[u64] {
        let i = i as usize;
        &self.rows[i * self.wpr..(i + 1) * self.wpr]
    }

    /// All row words, row-major (the serialization form).
    #[inline]
    pub fn row_words(&self) -> &[u64] {
        &self.rows
    }

    /// The first `n` rows as a new (rectangular) matrix, the
    /// position-producing prefix stored in sorted-dump headers.
    pub fn row_prefix(&self, n: u32) -> BinMatrix {
        BinMatrix {
            dim: self.dim,
            wpr: self.wpr,
            rows: self.rows[..n as usize * self.wpr].to_vec(),
        }
    }

    /// `out = M·v` over GF(2); `out` must hold ⌈row_count/64⌉ words.
    pub fn mul_vec(&self, v: &[u64], out: &mut [u64]) {
        for o in out.iter_mut() {
            *o = 0;
        }
        for r in 0..self.row_count() {
            let row = self.row(r);
            let mut acc = 0u64;
            for (a, b) in row.iter().zip(v) {
                acc ^= a & b;
            }
            out[(r / 64) as usize] |= ((acc.count_ones() & 1) as u64) << (r % 64);
        }
    }

    /// The low `nbits ≤ 64` output bits of `M·v`, i.e. the bucket position.
    pub fn mul_vec_low(&self, v: &[u64], nbits: u32) -> u64 {
        debug_assert!(nbits <= 64 && nbits <= self.row_count());
        let mut out = 0u64;
        for r in 0..nbits {
            let row = self.row(r);
            let mut acc = 0u64;
            for (a, b) in row.iter().zip(v) {
                acc ^= a & b;
            }
            out |= ((acc.count_ones() & 1) as u64) << r;
        }
        out
    }

    /// Gauss-Jordan inverse; `None` when the matrix is singular.
    pub fn inverse(&self) -> Option<BinMatrix> {
        let dim = self.dim as usize;
        let wpr = self.wpr;
        // Augmented working rows: [A | I].
        let mut a = self.rows.clone();
        let mut inv = BinMatrix::identity(self.dim).rows;

        for col in 0..dim {
            let (cw, cb) = (col / 64, col % 64);
            // Find a pivot at or below the diagonal.
            let pivot = (col..dim).find(|&r| (a[r * wpr + cw] >> cb) & 1 == 1)?;
            if pivot != col {
                for w in 0..wpr {
                    a.swap(col * wpr + w, pivot * wpr + w);
                    inv.swap(col * wpr + w, pivot * wpr + w);
                }
            }
            // Eliminate the column everywhere else.
            for r in 0..dim {
                if r != col && (a[r * wpr + cw] >> cb) & 1 == 1 {
                    for w in 0..wpr {
                        a[r * wpr + w] ^= a[col * wpr + w];
                        inv[r * wpr + w] ^= inv[col * wpr + w];
                    }
                }
            }
        }
        Some(BinMatrix {
            dim: self.dim,
            wpr,
            rows: inv,
        })
    }
}
