//! Raw dumps: the live table, byte for byte.
//!
//! Intended for within-run save/restore only (growth spills, debugging):
//! the image embeds the full hash matrix and the exact plane geometry, and
//! a loader with different parameters rejects it. The format is host-endian
//! words written little-endian, like everything else on disk, and is not
//! meant to be stable across versions.

use std::io::{BufRead, Write};
use std::sync::atomic::Ordering;

use crate::dump::header::{read_format_line, read_u32, read_u64, DumpFormat};
use crate::error::{Error, Result};
use crate::hash::array::{HashArray, HashConfig};
use crate::hash::BinMatrix;

/// Write the raw image of `ary`.
pub fn write_raw<W: Write>(ary: &HashArray, out: &mut W) -> Result<()> {
    let io = |e| Error::io("<raw-dump>", e);
    write!(out, "format:{}\n", DumpFormat::BinaryRaw.tag()).map_err(io)?;
    for v in [ary.k(), ary.lsize(), ary.counter_len(), ary.max_reprobe()] {
        out.write_all(&v.to_le_bytes()).map_err(io)?;
    }
    for w in ary.matrix().row_words() {
        out.write_all(&w.to_le_bytes()).map_err(io)?;
    }
    for plane in ary.raw_planes() {
        let words = plane.words();
        out.write_all(&(words.len() as u64).to_le_bytes()).map_err(io)?;
        for w in words {
            out.write_all(&w.load(Ordering::Relaxed).to_le_bytes())
                .map_err(io)?;
        }
    }
    out.flush().map_err(io)?;
    Ok(())
}

/// Restore an array from a raw image.
pub fn read_raw<R: BufRead>(input: &mut R) -> Result<HashArray> {
    let format = read_format_line(input)?;
    if format != DumpFormat::BinaryRaw {
        return Err(Error::Config(format!(
            "expected a {} file, found {}",
            DumpFormat::BinaryRaw.tag(),
            format.tag()
        )));
    }
    let k = read_u32(input)?;
    let lsize = read_u32(input)?;
    let counter_len = read_u32(input)?;
    let max_reprobe = read_u32(input)?;
    let cfg = HashConfig {
        k,
        lsize,
        counter_len,
        max_reprobe,
    };
    cfg.validate()?;

    let dim = 2 * k;
    let n_words = dim as usize * BinMatrix::words_per_row(dim);
    let mut rows = vec![0u64; n_words];
    for w in rows.iter_mut() {
        *w = read_u64(input)?;
    }
    let matrix = BinMatrix::from_rows(dim, dim, rows);
    let inverse = matrix
        .inverse()
        .ok_or_else(|| Error::Config("raw image carries a singular matrix".into()))?;

    let mut planes: [Vec<u64>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for plane in planes.iter_mut() {
        let n = read_u64(input)? as usize;
        plane.reserve_exact(n);
        for _ in 0..n {
            plane.push(read_u64(input)?);
        }
    }
    HashArray::from_raw(
        cfg,
        matrix,
        inverse,
        [&planes[0], &planes[1], &planes[2]],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mer::Mer;

    #[test]
    fn raw_round_trip_is_byte_identical() {
        let ary = HashArray::new(
            HashConfig {
                k: 7,
                lsize: 6,
                counter_len: 7,
                max_reprobe: 62,
            },
            17,
        )
        .unwrap();
        for (s, n) in [("ACGTACG", 5u64), ("TTTTTTT", 300), ("GATTACA", 1)] {
            ary.add(&Mer::from_str_mer(s).unwrap(), n).unwrap();
        }

        let mut image = Vec::new();
        write_raw(&ary, &mut image).unwrap();
        let restored = read_raw(&mut std::io::Cursor::new(&image)).unwrap();

        // Same geometry, same matrix, identical iteration.
        assert_eq!(restored.k(), ary.k());
        assert_eq!(restored.lsize(), ary.lsize());
        assert_eq!(restored.matrix(), ary.matrix());
        let mut a = Vec::new();
        let mut b = Vec::new();
        ary.gather_slice(0, ary.size(), &mut a);
        restored.gather_slice(0, restored.size(), &mut b);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!((&x.mer, x.count, x.home), (&y.mer, y.count, y.home));
        }

        // And the image itself re-dumps identically.
        let mut image2 = Vec::new();
        write_raw(&restored, &mut image2).unwrap();
        assert_eq!(image, image2);
    }

    #[test]
    fn sorted_file_is_rejected() {
        let mut c = std::io::Cursor::new(b"format:binary/sorted\n".to_vec());
        assert!(read_raw(&mut c).is_err());
    }
}
