//! Streaming reader over binary sorted snapshots.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::dump::header::{DumpFooter, DumpFormat, FileHeader, FOOTER_LEN};
use crate::error::{Error, Result};
use crate::hash::BinMatrix;
use crate::mer::Mer;

/// Cursor over the records of one `binary/sorted` file.
///
/// `complete` reports whether the file carries a footer that matches its
/// length; a `false` here means the dump was cut short by an aborted run
/// and consumers that need exact totals should refuse it.
pub struct SortedReader {
    path: PathBuf,
    input: BufReader<File>,
    pub header: FileHeader,
    matrix: BinMatrix,
    record_len: u64,
    body_len: u64,
    consumed: u64,
    pub complete: bool,
    pub footer: Option<DumpFooter>,
}

impl SortedReader {
    pub fn open(path: impl AsRef<Path>) -> Result<SortedReader> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let total_len = file
            .metadata()
            .map_err(|e| Error::io(&path, e))?
            .len();
        let mut input = BufReader::new(file);

        let header = FileHeader::read(&mut input)?;
        if header.format != DumpFormat::BinarySorted {
            return Err(Error::Config(format!(
                "'{}' is a {} file; only {} files can be iterated",
                path.display(),
                header.format.tag(),
                DumpFormat::BinarySorted.tag()
            )));
        }
        let header_len = header.byte_len();
        let record_len = (header.key_bytes + header.value_bytes) as u64;

        // A matching footer marks a finished dump; anything else is a
        // partial file left behind by an aborted run.
        let mut footer = None;
        if total_len >= header_len + FOOTER_LEN {
            input
                .seek(SeekFrom::End(-(FOOTER_LEN as i64)))
                .map_err(|e| Error::io(&path, e))?;
            let mut tail = [0u8; FOOTER_LEN as usize];
            input
                .read_exact(&mut tail)
                .map_err(|e| Error::io(&path, e))?;
            footer = DumpFooter::parse(&tail)
                .filter(|f| header_len + f.body_bytes + FOOTER_LEN == total_len);
        }
        let complete = footer.is_some();
        let body_len = match footer {
            Some(f) => f.body_bytes,
            None => {
                let tail = total_len.saturating_sub(header_len);
                tail - tail % record_len
            }
        };
        input
            .seek(SeekFrom::Start(header_len))
            .map_err(|e| Error::io(&path, e))?;

        let matrix = header.position_matrix();
        Ok(SortedReader {
            path,
            input,
            header,
            matrix,
            record_len,
            body_len,
            consumed: 0,
            complete,
            footer,
        })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in the body.
    #[inline]
    pub fn record_count(&self) -> u64 {
        self.body_len / self.record_len
    }

    /// Bucket position of `mer` under this file's hash function.
    #[inline]
    pub fn position_of(&self, mer: &Mer) -> u64 {
        self.matrix.mul_vec_low(mer.words(), self.header.lsize)
    }

    /// Next `(mer, count)` record, `None` at the end of the body.
    pub fn next_record(&mut self) -> Result<Option<(Mer, u64)>> {
        if self.consumed >= self.body_len {
            return Ok(None);
        }
        let mut key = [0u8; 1024];
        let kb = self.header.key_bytes as usize;
        debug_assert!(kb <= key.len());
        self.input
            .read_exact(&mut key[..kb])
            .map_err(|e| Error::io(&self.path, e))?;
        let mut value = [0u8; 8];
        self.input
            .read_exact(&mut value[..self.header.value_bytes as usize])
            .map_err(|e| Error::io(&self.path, e))?;
        self.consumed += self.record_len;
        Ok(Some((
            Mer::from_le_bytes(self.header.k, &key[..kb]),
            u64::from_le_bytes(value),
        )))
    }

    /// Stream the rest of the body and check it against the footer
    /// checksum. Consumes the cursor position; reopen to iterate again.
    pub fn verify_checksum(&mut self) -> Result<bool> {
        let Some(f) = self.footer else {
            return Ok(false);
        };
        self.input
            .seek(SeekFrom::Start(self.header.byte_len()))
            .map_err(|e| Error::io(&self.path, e))?;
        let mut hasher = xxhash_rust::xxh64::Xxh64::new(0);
        let mut left = self.body_len;
        let mut buf = [0u8; 64 * 1024];
        while left > 0 {
            let take = (buf.len() as u64).min(left) as usize;
            self.input
                .read_exact(&mut buf[..take])
                .map_err(|e| Error::io(&self.path, e))?;
            hasher.update(&buf[..take]);
            left -= take as u64;
        }
        self.consumed = self.body_len;
        Ok(hasher.digest() == f.checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::sorted::SortedDumper;
    use crate::hash::array::{HashArray, HashConfig};

    fn dumped_file(dir: &tempfile::TempDir) -> (std::path::PathBuf, HashArray) {
        let ary = HashArray::new(
            HashConfig {
                k: 5,
                lsize: 4,
                counter_len: 7,
                max_reprobe: 62,
            },
            21,
        )
        .unwrap();
        for (s, n) in [("ACGTA", 3u64), ("TTTTT", 1), ("GATTA", 300), ("CCCCC", 7)] {
            ary.add(&Mer::from_str_mer(s).unwrap(), n).unwrap();
        }
        let path = dir.path().join("snap.kc");
        let mut out = std::io::BufWriter::new(File::create(&path).unwrap());
        SortedDumper::new(2, 4)
            .zero_on_dump(false)
            .dump(&ary, &mut out)
            .unwrap();
        drop(out);
        (path, ary)
    }

    #[test]
    fn reads_back_every_record_in_position_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, ary) = dumped_file(&dir);
        let mut r = SortedReader::open(&path).unwrap();
        assert!(r.complete);
        assert_eq!(r.record_count(), 4);
        assert!(r.verify_checksum().unwrap());

        let mut r = SortedReader::open(&path).unwrap();
        let mut seen = Vec::new();
        let mut last_pos = 0u64;
        while let Some((mer, count)) = r.next_record().unwrap() {
            let pos = r.position_of(&mer);
            assert!(pos >= last_pos, "records must be position-sorted");
            last_pos = pos;
            assert_eq!(ary.get(&mer), Some(count), "{mer}");
            seen.push(mer.to_string());
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn truncated_file_reports_incomplete() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _) = dumped_file(&dir);
        let bytes = std::fs::read(&path).unwrap();
        let cut = dir.path().join("cut.kc");
        std::fs::write(&cut, &bytes[..bytes.len() - 30]).unwrap();
        let r = SortedReader::open(&cut).unwrap();
        assert!(!r.complete);
        assert!(r.footer.is_none());
    }
}
