//! Trace file readers.
//!
//! CPU traces carry one record per line: `<bubble_cnt> <read_addr>
//! [<write_addr>]`, addresses decimal or `0x`-prefixed hex. DRAM traces carry
//! `<addr_hex> [R|W]`. Filtered CPU reading (no core caches) synthesizes the
//! write as its own request after the read and rewinds at end of file so
//! multi-program runs stay aligned; unfiltered reading stops at end of file.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::request::RequestKind;

/// Errors raised while opening or parsing a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The trace file could not be opened.
    #[error("cannot open trace {path}: {source}")]
    Open {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The trace file could not be read.
    #[error("trace I/O error: {0}")]
    Io(#[from] io::Error),
    /// A line did not match the expected record format.
    #[error("malformed trace line {line} in {path}: {text:?}")]
    Malformed {
        /// Offending path.
        path: PathBuf,
        /// 1-based line number.
        line: u64,
        /// The offending line.
        text: String,
    },
}

/// One CPU-trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuRecord {
    /// Non-memory instructions preceding the access.
    pub bubble_cnt: i64,
    /// Byte address of the access.
    pub addr: i64,
    /// Access kind.
    pub kind: RequestKind,
}

/// Sequential reader over one trace file.
#[derive(Debug)]
pub struct Trace {
    reader: BufReader<File>,
    path: PathBuf,
    line_num: u64,
    pending_write: Option<i64>,
}

impl Trace {
    /// Opens a trace file.
    pub fn new(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            line_num: 0,
            pending_write: None,
        })
    }

    fn malformed(&self, text: &str) -> TraceError {
        TraceError::Malformed {
            path: self.path.clone(),
            line: self.line_num,
            text: text.to_string(),
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, TraceError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.line_num += 1;
        Ok(Some(line.trim_end().to_string()))
    }

    fn rewind(&mut self) -> Result<(), TraceError> {
        self.reader.seek(SeekFrom::Start(0))?;
        self.line_num = 0;
        Ok(())
    }

    /// Unfiltered CPU record: reads and writes appear as the trace recorded
    /// them. Returns `None` at end of file.
    pub fn get_unfiltered_request(&mut self) -> Result<Option<CpuRecord>, TraceError> {
        let Some(line) = self.next_line()? else {
            return Ok(None);
        };
        let mut tokens = line.split_whitespace();
        let bubble_cnt = tokens
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| self.malformed(&line))?;
        let addr = tokens
            .next()
            .and_then(parse_addr)
            .ok_or_else(|| self.malformed(&line))?;
        let kind = match tokens.next() {
            None => RequestKind::Read,
            Some(t) if t.starts_with('R') => RequestKind::Read,
            Some(t) if t.starts_with('W') => RequestKind::Write,
            // Third token may also be a write address (filtered-format file).
            Some(t) if parse_addr(t).is_some() => RequestKind::Write,
            Some(_) => return Err(self.malformed(&line)),
        };
        Ok(Some(CpuRecord {
            bubble_cnt,
            addr,
            kind,
        }))
    }

    /// Filtered CPU record: the optional write address is synthesized as a
    /// zero-bubble WRITE record following its read. Rewinds and returns
    /// `None` at end of file.
    pub fn get_filtered_request(&mut self) -> Result<Option<CpuRecord>, TraceError> {
        if let Some(addr) = self.pending_write.take() {
            return Ok(Some(CpuRecord {
                bubble_cnt: 0,
                addr,
                kind: RequestKind::Write,
            }));
        }
        let Some(line) = self.next_line()? else {
            self.rewind()?;
            return Ok(None);
        };
        if line.is_empty() {
            self.rewind()?;
            return Ok(None);
        }
        let mut tokens = line.split_whitespace();
        let bubble_cnt = tokens
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| self.malformed(&line))?;
        let addr = tokens
            .next()
            .and_then(parse_addr)
            .ok_or_else(|| self.malformed(&line))?;
        if let Some(t) = tokens.next() {
            self.pending_write = Some(parse_addr(t).ok_or_else(|| self.malformed(&line))?);
        }
        Ok(Some(CpuRecord {
            bubble_cnt,
            addr,
            kind: RequestKind::Read,
        }))
    }

    /// DRAM-trace record: `<addr_hex> [R|W]`, defaulting to a read. Returns
    /// `None` at end of file.
    pub fn get_dram_request(&mut self) -> Result<Option<(i64, RequestKind)>, TraceError> {
        let Some(line) = self.next_line()? else {
            return Ok(None);
        };
        if line.is_empty() {
            return Ok(None);
        }
        let mut tokens = line.split_whitespace();
        let addr_text = tokens.next().ok_or_else(|| self.malformed(&line))?;
        let addr = i64::from_str_radix(addr_text.trim_start_matches("0x"), 16)
            .map_err(|_| self.malformed(&line))?;
        let kind = match tokens.next() {
            None => RequestKind::Read,
            Some(t) if t.starts_with('R') => RequestKind::Read,
            Some(t) if t.starts_with('W') => RequestKind::Write,
            Some(_) => return Err(self.malformed(&line)),
        };
        Ok(Some((addr, kind)))
    }
}

fn parse_addr(token: &str) -> Option<i64> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<i64>().ok()
    }
}
