//! Snapshot file headers and the completion footer.
//!
//! Every snapshot starts with one ASCII line naming the format, followed by
//! a fixed block of little-endian `u32` parameters and the position rows of
//! the hash matrix (the first `lsize` rows, packed row-major). Binary
//! sorted files additionally end with a 24-byte footer written only after
//! the body completed; a missing or inconsistent footer marks a partial
//! dump left behind by an aborted run.

use std::io::{BufRead, Read, Write};

use crate::error::{Error, Result};
use crate::hash::BinMatrix;
use crate::mer::Mer;

/// Footer marker ("KMERCNT1" as little-endian bytes).
pub const FOOTER_MAGIC: u64 = u64::from_le_bytes(*b"KMERCNT1");

/// Byte length of the trailing footer.
pub const FOOTER_LEN: u64 = 24;

/// Longest accepted format line, guards against reading junk files.
const MAX_FORMAT_LINE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    BinarySorted,
    TextSorted,
    BinaryRaw,
}

impl DumpFormat {
    pub fn tag(&self) -> &'static str {
        match self {
            DumpFormat::BinarySorted => "binary/sorted",
            DumpFormat::TextSorted => "text/sorted",
            DumpFormat::BinaryRaw => "binary/raw",
        }
    }

    pub fn from_tag(tag: &str) -> Option<DumpFormat> {
        match tag {
            "binary/sorted" => Some(DumpFormat::BinarySorted),
            "text/sorted" => Some(DumpFormat::TextSorted),
            "binary/raw" => Some(DumpFormat::BinaryRaw),
            _ => None,
        }
    }
}

/// Parameter block shared by the sorted formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub format: DumpFormat,
    pub k: u32,
    pub key_bytes: u32,
    pub value_bytes: u32,
    pub lsize: u32,
    pub max_reprobe: u32,
    /// Position rows: `lsize` rows of ⌈2k/64⌉ words each.
    pub rows: Vec<u64>,
}

impl FileHeader {
    /// Build the header for a sorted dump of an array.
    pub fn for_array(
        format: DumpFormat,
        ary: &crate::hash::HashArray,
        value_bytes: u32,
    ) -> FileHeader {
        FileHeader {
            format,
            k: ary.k(),
            key_bytes: Mer::key_bytes(ary.k()) as u32,
            value_bytes,
            lsize: ary.lsize(),
            max_reprobe: ary.max_reprobe(),
            rows: ary.matrix().row_prefix(ary.lsize()).row_words().to_vec(),
        }
    }

    /// Words per matrix row for this k.
    #[inline]
    pub fn words_per_row(&self) -> usize {
        BinMatrix::words_per_row(2 * self.k)
    }

    /// Serialized byte length (format line + parameters + rows).
    pub fn byte_len(&self) -> u64 {
        ("format:".len() + self.format.tag().len() + 1) as u64
            + 5 * 4
            + 8 * self.rows.len() as u64
    }

    /// The position-producing matrix prefix carried in the header.
    pub fn position_matrix(&self) -> BinMatrix {
        BinMatrix::from_rows(2 * self.k, self.lsize, self.rows.clone())
    }

    pub fn write<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "format:{}\n", self.format.tag())?;
        for v in [
            self.k,
            self.key_bytes,
            self.value_bytes,
            self.lsize,
            self.max_reprobe,
        ] {
            out.write_all(&v.to_le_bytes())?;
        }
        for w in &self.rows {
            out.write_all(&w.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn read<R: BufRead>(input: &mut R) -> Result<FileHeader> {
        let format = read_format_line(input)?;
        let k = read_u32(input)?;
        let key_bytes = read_u32(input)?;
        let value_bytes = read_u32(input)?;
        let lsize = read_u32(input)?;
        let max_reprobe = read_u32(input)?;
        if k == 0 || k > crate::mer::MAX_K {
            return Err(Error::Config(format!("header carries invalid k = {k}")));
        }
        if key_bytes as usize != Mer::key_bytes(k)
            || lsize > 2 * k
            || value_bytes == 0
            || value_bytes > 8
        {
            return Err(Error::Config(format!(
                "inconsistent header (k = {k}, key_bytes = {key_bytes}, value_bytes = {value_bytes}, lsize = {lsize})"
            )));
        }
        let n_words = lsize as usize * BinMatrix::words_per_row(2 * k);
        let mut rows = vec![0u64; n_words];
        for w in rows.iter_mut() {
            *w = read_u64(input)?;
        }
        Ok(FileHeader {
            format,
            k,
            key_bytes,
            value_bytes,
            lsize,
            max_reprobe,
            rows,
        })
    }
}

/// Completion footer of a binary sorted dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpFooter {
    pub body_bytes: u64,
    pub checksum: u64,
}

impl DumpFooter {
    pub fn write<W: Write + ?Sized>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(&FOOTER_MAGIC.to_le_bytes())?;
        out.write_all(&self.body_bytes.to_le_bytes())?;
        out.write_all(&self.checksum.to_le_bytes())?;
        Ok(())
    }

    /// Parse a footer from its 24 raw bytes; `None` when the magic is absent.
    pub fn parse(bytes: &[u8; 24]) -> Option<DumpFooter> {
        let magic = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        if magic != FOOTER_MAGIC {
            return None;
        }
        Some(DumpFooter {
            body_bytes: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            checksum: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
        })
    }
}

pub(crate) fn read_format_line<R: BufRead>(input: &mut R) -> Result<DumpFormat> {
    let mut line = Vec::with_capacity(32);
    let n = input
        .by_ref()
        .take(MAX_FORMAT_LINE as u64)
        .read_until(b'\n', &mut line)
        .map_err(|e| Error::io("<header>", e))?;
    if n == 0 || line.last() != Some(&b'\n') {
        return Err(Error::Config("missing format line in header".into()));
    }
    line.pop();
    let text = std::str::from_utf8(&line)
        .map_err(|_| Error::Config("format line is not ASCII".into()))?;
    let tag = text
        .strip_prefix("format:")
        .ok_or_else(|| Error::Config(format!("unrecognized header line '{text}'")))?;
    DumpFormat::from_tag(tag).ok_or_else(|| Error::Config(format!("unknown format '{tag}'")))
}

pub(crate) fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    input
        .read_exact(&mut b)
        .map_err(|e| Error::io("<header>", e))?;
    Ok(u32::from_le_bytes(b))
}

pub(crate) fn read_u64<R: Read>(input: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    input
        .read_exact(&mut b)
        .map_err(|e| Error::io("<header>", e))?;
    Ok(u64::from_le_bytes(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> FileHeader {
        FileHeader {
            format: DumpFormat::BinarySorted,
            k: 9,
            key_bytes: 3,
            value_bytes: 4,
            lsize: 6,
            max_reprobe: 62,
            rows: (0..6).collect(),
        }
    }

    #[test]
    fn header_round_trips() {
        let h = header();
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, h.byte_len());
        let back = FileHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn text_format_round_trips() {
        let mut h = header();
        h.format = DumpFormat::TextSorted;
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert!(buf.starts_with(b"format:text/sorted\n"));
        let back = FileHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(back.format, DumpFormat::TextSorted);
    }

    #[test]
    fn junk_is_rejected() {
        let mut c = Cursor::new(b"not a dump file at all".to_vec());
        assert!(FileHeader::read(&mut c).is_err());
        let mut c = Cursor::new(b"format:binary/unsorted\n".to_vec());
        assert!(FileHeader::read(&mut c).is_err());
    }

    #[test]
    fn inconsistent_parameters_are_rejected() {
        let mut h = header();
        h.key_bytes = 7; // k = 9 needs 3 key bytes
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert!(FileHeader::read(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn footer_round_trips_and_rejects_junk() {
        let f = DumpFooter {
            body_bytes: 1234,
            checksum: 0xFEED_F00D,
        };
        let mut buf = Vec::new();
        f.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, FOOTER_LEN);
        let arr: [u8; 24] = buf.as_slice().try_into().unwrap();
        assert_eq!(DumpFooter::parse(&arr), Some(f));
        let zeros = [0u8; 24];
        assert_eq!(DumpFooter::parse(&zeros), None);
    }
}
