//! FASTA/FASTQ record parsing into overlapping window buffers.
//!
//! The parser runs behind the cooperative pool's producer token. Each
//! produced buffer holds normalized bases of a single record: invalid and
//! (by default) ambiguous bases become `N` break marks, line breaks vanish,
//! FASTQ quality lines are discarded. A record larger than one buffer
//! continues in the next buffer, prefixed with the previous chunk's last
//! k−1 bases so every window of the record appears in exactly one chunk.
//! Input paths are consumed in order; `-` reads standard input; a file
//! that fails to open aborts the whole run.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::mer::codes::{base_char, dna_code, DnaCode, AMBIG_MARK};
use crate::stream::pool::{Producer, SeqBuffer};
use crate::util::file_list::STDIN_MARK;

/// What to do with IUPAC ambiguity codes (and N) in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbigPolicy {
    /// Treat them as window breaks (the usual reading).
    #[default]
    Break,
    /// Silently map them to `A`.
    MapToA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqFormat {
    Fasta,
    Fastq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FastqState {
    Header,
    Seq,
    Plus,
    Qual,
}

struct CurrentFile {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    format: SeqFormat,
    fq_state: FastqState,
    record_open: bool,
}

enum Refill {
    /// Normalized bases were appended to the carry queue.
    Bases,
    /// The open record ended (next record or end of file).
    RecordEnd,
    /// No input left anywhere.
    Exhausted,
}

pub struct SeqParser {
    k: u32,
    policy: AmbigPolicy,
    files: VecDeque<PathBuf>,
    current: Option<CurrentFile>,
    carry: VecDeque<u8>,
    seam: Vec<u8>,
    line: Vec<u8>,
}

impl SeqParser {
    pub fn new(k: u32, policy: AmbigPolicy, inputs: Vec<PathBuf>) -> SeqParser {
        SeqParser {
            k,
            policy,
            files: inputs.into(),
            current: None,
            carry: VecDeque::new(),
            seam: Vec::new(),
            line: Vec::new(),
        }
    }

    fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.files.pop_front() else {
            return Ok(false);
        };
        let mut reader: Box<dyn BufRead + Send> = if path.to_str() == Some(STDIN_MARK) {
            Box::new(BufReader::new(std::io::stdin()))
        } else {
            Box::new(BufReader::new(
                File::open(&path).map_err(|e| Error::io(&path, e))?,
            ))
        };
        // Sniff the format from the first byte.
        let first = reader
            .fill_buf()
            .map_err(|e| Error::io(&path, e))?
            .first()
            .copied();
        let format = match first {
            Some(b'>') => SeqFormat::Fasta,
            Some(b'@') => SeqFormat::Fastq,
            // An empty file contributes nothing, which is valid input.
            None => SeqFormat::Fasta,
            Some(b) => {
                return Err(Error::InputFormat {
                    path,
                    reason: format!("cannot recognize a record starting with 0x{b:02x}"),
                })
            }
        };
        self.current = Some(CurrentFile {
            path,
            reader,
            format,
            fq_state: FastqState::Header,
            record_open: false,
        });
        Ok(true)
    }

    /// Normalize one sequence line into the carry queue.
    fn push_bases(&mut self) {
        for &b in &self.line {
            match dna_code(b) {
                DnaCode::Base(c) => self.carry.push_back(base_char(c)),
                DnaCode::Ambiguous => self.carry.push_back(match self.policy {
                    AmbigPolicy::Break => AMBIG_MARK,
                    AmbigPolicy::MapToA => b'A',
                }),
                DnaCode::Ignore => {}
                DnaCode::Other => self.carry.push_back(AMBIG_MARK),
            }
        }
    }

    /// Pull one line's worth of input through the record state machine.
    fn refill(&mut self) -> Result<Refill> {
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(Refill::Exhausted);
            }
            let cur = self.current.as_mut().expect("current file just opened");

            self.line.clear();
            let n = cur
                .reader
                .read_until(b'\n', &mut self.line)
                .map_err(|e| Error::io(&cur.path, e))?;
            if n == 0 {
                // End of this file; records never span files.
                let was_open = cur.record_open;
                if cur.format == SeqFormat::Fastq && cur.fq_state != FastqState::Header {
                    return Err(Error::InputFormat {
                        path: cur.path.clone(),
                        reason: "truncated FASTQ record at end of file".into(),
                    });
                }
                self.current = None;
                if was_open {
                    return Ok(Refill::RecordEnd);
                }
                continue;
            }
            while matches!(self.line.last(), Some(b'\n') | Some(b'\r')) {
                self.line.pop();
            }

            match cur.format {
                SeqFormat::Fasta => {
                    if self.line.first() == Some(&b'>') {
                        let had_record = cur.record_open;
                        cur.record_open = true;
                        if had_record {
                            return Ok(Refill::RecordEnd);
                        }
                        continue;
                    }
                    if self.line.is_empty() {
                        continue;
                    }
                    if !cur.record_open {
                        return Err(Error::InputFormat {
                            path: cur.path.clone(),
                            reason: "sequence data before the first '>' header".into(),
                        });
                    }
                    self.push_bases();
                    return Ok(Refill::Bases);
                }
                SeqFormat::Fastq => match cur.fq_state {
                    FastqState::Header => {
                        if self.line.is_empty() {
                            continue;
                        }
                        if self.line.first() != Some(&b'@') {
                            return Err(Error::InputFormat {
                                path: cur.path.clone(),
                                reason: "FASTQ record does not start with '@'".into(),
                            });
                        }
                        cur.fq_state = FastqState::Seq;
                        let had_record = cur.record_open;
                        cur.record_open = true;
                        if had_record {
                            return Ok(Refill::RecordEnd);
                        }
                        continue;
                    }
                    FastqState::Seq => {
                        cur.fq_state = FastqState::Plus;
                        self.push_bases();
                        return Ok(Refill::Bases);
                    }
                    FastqState::Plus => {
                        if self.line.first() != Some(&b'+') {
                            return Err(Error::InputFormat {
                                path: cur.path.clone(),
                                reason: "FASTQ separator line does not start with '+'".into(),
                            });
                        }
                        cur.fq_state = FastqState::Qual;
                        continue;
                    }
                    FastqState::Qual => {
                        // Quality values are discarded.
                        cur.fq_state = FastqState::Header;
                        continue;
                    }
                },
            }
        }
    }

    /// Remember the trailing k−1 bases for the next chunk of this record.
    fn set_seam(&mut self, data: &[u8]) {
        let keep = (self.k as usize - 1).min(data.len());
        self.seam.clear();
        self.seam.extend_from_slice(&data[data.len() - keep..]);
    }
}

impl Producer for SeqParser {
    fn produce(&mut self, buf: &mut SeqBuffer) -> Result<bool> {
        let cap = buf.capacity().max(self.k as usize * 2);
        if !self.seam.is_empty() {
            buf.data.extend_from_slice(&self.seam);
        }
        let mut seam_len = buf.data.len();

        loop {
            while buf.data.len() < cap {
                let Some(b) = self.carry.pop_front() else {
                    break;
                };
                buf.data.push(b);
            }
            if buf.data.len() >= cap {
                // Chunk full; the record continues in the next buffer.
                self.set_seam(&buf.data);
                buf.end = buf.data.len();
                return Ok(true);
            }
            match self.refill()? {
                Refill::Bases => {}
                Refill::RecordEnd => {
                    // Anything still in the carry belongs to the record.
                    while let Some(b) = self.carry.pop_front() {
                        buf.data.push(b);
                    }
                    self.seam.clear();
                    if buf.data.len() > seam_len {
                        buf.end = buf.data.len();
                        buf.end_of_record = true;
                        return Ok(true);
                    }
                    // An empty record; reuse the buffer for the next one.
                    buf.reset();
                    seam_len = 0;
                }
                Refill::Exhausted => {
                    self.seam.clear();
                    if buf.data.len() > seam_len {
                        buf.end = buf.data.len();
                        buf.end_of_record = true;
                        return Ok(true);
                    }
                    return Ok(false);
                }
            }
        }
    }
}
