//! Trace input.
//!
//! Two formats are understood:
//! - CSV text, one `time,obj_id,obj_size` request per line. Blank lines,
//!   `#` comments and a leading header line are skipped; a missing size
//!   column means size 1.
//! - oracleGeneral binary: packed little-endian 24-byte records of
//!   `u32 clock_time, u64 obj_id, u32 obj_size, i64 next_access_vtime`.
//!
//! Either may be zstd-compressed; a `.zst` suffix switches decompression on.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::ObjId;
use crate::sim::sampling::ShardsSampler;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed trace line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("Truncated binary record {record}: got {bytes} of 24 bytes")]
    Truncated { record: u64, bytes: usize },

    #[error("Sampling ratio must be in (0, 1], got {0}")]
    InvalidSamplingRatio(f64),

    #[error("Request {record}: {field} {value} does not fit the 32-bit record field")]
    FieldOverflow {
        record: u64,
        field: &'static str,
        value: u64,
    },
}

/// One simulated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Wall-clock timestamp from the trace. The simulator's logical clock is
    /// the request sequence number, not this.
    pub clock_time: u64,
    pub obj_id: ObjId,
    pub obj_size: u64,
}

/// On-disk trace encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TraceFormat {
    Csv,
    OracleGeneral,
}

impl TraceFormat {
    /// Guess the format from a file name: `.csv` / `.txt` (before any `.zst`)
    /// is CSV, anything else is oracleGeneral.
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let name = name.strip_suffix(".zst").unwrap_or(&name);
        if name.ends_with(".csv") || name.ends_with(".txt") {
            TraceFormat::Csv
        } else {
            TraceFormat::OracleGeneral
        }
    }
}

const RECORD_SIZE: usize = std::mem::size_of::<OracleGeneralRecord>();

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OracleGeneralRecord {
    clock_time: u32,
    obj_id: u64,
    obj_size: u32,
    next_access_vtime: i64,
}

impl From<OracleGeneralRecord> for Request {
    fn from(record: OracleGeneralRecord) -> Self {
        Request {
            clock_time: u64::from(u32::from_le(record.clock_time)),
            obj_id: u64::from_le(record.obj_id),
            obj_size: u64::from(u32::from_le(record.obj_size)),
        }
    }
}

/// Encode requests as oracleGeneral records (next-access time unknown, -1).
///
/// Fails on the first request whose clock time or size exceeds `u32::MAX`.
pub fn encode_oracle_general(requests: &[Request]) -> Result<Vec<u8>, TraceError> {
    let narrow = |record: usize, field: &'static str, value: u64| {
        u32::try_from(value).map_err(|_| TraceError::FieldOverflow {
            record: record as u64 + 1,
            field,
            value,
        })
    };

    let mut out = Vec::with_capacity(requests.len() * RECORD_SIZE);
    for (i, req) in requests.iter().enumerate() {
        let record = OracleGeneralRecord {
            clock_time: narrow(i, "clock_time", req.clock_time)?.to_le(),
            obj_id: req.obj_id.to_le(),
            obj_size: narrow(i, "obj_size", req.obj_size)?.to_le(),
            next_access_vtime: (-1i64).to_le(),
        };
        out.extend_from_slice(bytemuck::bytes_of(&record));
    }
    Ok(out)
}

/// Streaming request reader.
pub struct TraceReader {
    inner: Box<dyn BufRead + Send>,
    format: TraceFormat,
    skip_malformed: bool,
    sampler: Option<ShardsSampler>,
    /// Lines (CSV) or records (binary) consumed so far.
    position: u64,
    seen_data: bool,
    line_buf: Vec<u8>,
}

impl TraceReader {
    /// Open a trace file, decompressing it if the name ends in `.zst`.
    pub fn open(path: &Path, format: Option<TraceFormat>) -> Result<Self, TraceError> {
        let format = format.unwrap_or_else(|| TraceFormat::detect(path));
        let file = File::open(path)?;
        let compressed = path.extension().is_some_and(|ext| ext == "zst");
        debug!(path = %path.display(), ?format, compressed, "Opening trace");

        if compressed {
            let decoder = zstd::stream::read::Decoder::new(file)?;
            Ok(Self::from_reader(decoder, format))
        } else {
            Ok(Self::from_reader(file, format))
        }
    }

    pub fn from_reader(reader: impl Read + Send + 'static, format: TraceFormat) -> Self {
        Self {
            inner: Box::new(BufReader::new(reader)),
            format,
            skip_malformed: false,
            sampler: None,
            position: 0,
            seen_data: false,
            line_buf: Vec::new(),
        }
    }

    /// Skip malformed CSV lines instead of failing on them.
    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    /// Only yield requests the sampler keeps.
    pub fn with_sampler(mut self, sampler: ShardsSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }

    /// Read the remaining trace into memory.
    pub fn read_all(self) -> Result<Vec<Request>, TraceError> {
        self.collect()
    }

    fn next_unsampled(&mut self) -> Option<Result<Request, TraceError>> {
        match self.format {
            TraceFormat::Csv => self.next_csv(),
            TraceFormat::OracleGeneral => self.next_binary(),
        }
    }

    fn next_csv(&mut self) -> Option<Result<Request, TraceError>> {
        loop {
            self.line_buf.clear();
            match self.inner.read_until(b'\n', &mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.position += 1;

            let line = match std::str::from_utf8(&self.line_buf) {
                Ok(line) => line.trim(),
                Err(e) if self.skip_malformed => {
                    warn!(line = self.position, error = %e, "Skipping non-UTF-8 trace line");
                    self.seen_data = true;
                    continue;
                }
                Err(e) => {
                    return Some(Err(TraceError::Malformed {
                        line: self.position,
                        reason: format!("not valid UTF-8: {e}"),
                    }))
                }
            };
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let first_data_line = !self.seen_data;
            self.seen_data = true;

            match parse_csv_line(line) {
                Ok(req) => return Some(Ok(req)),
                Err(_) if first_data_line && looks_like_header(line) => {
                    debug!(line = self.position, "Skipping CSV header");
                }
                Err(reason) if self.skip_malformed => {
                    warn!(line = self.position, %reason, "Skipping malformed trace line");
                }
                Err(reason) => {
                    return Some(Err(TraceError::Malformed {
                        line: self.position,
                        reason,
                    }))
                }
            }
        }
    }

    fn next_binary(&mut self) -> Option<Result<Request, TraceError>> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        if filled == 0 {
            return None;
        }
        self.position += 1;
        if filled < RECORD_SIZE {
            return Some(Err(TraceError::Truncated {
                record: self.position,
                bytes: filled,
            }));
        }
        let record: OracleGeneralRecord = bytemuck::pod_read_unaligned(&buf);
        Some(Ok(record.into()))
    }
}

impl Iterator for TraceReader {
    type Item = Result<Request, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.next_unsampled()?;
            match (&item, &self.sampler) {
                (Ok(req), Some(sampler)) if !sampler.sample(req.obj_id) => continue,
                _ => return Some(item),
            }
        }
    }
}

fn parse_csv_line(line: &str) -> Result<Request, String> {
    let mut fields = line.split(',').map(str::trim);
    let mut next_u64 = |name: &str| -> Result<Option<u64>, String> {
        match fields.next() {
            None | Some("") => Ok(None),
            Some(field) => field
                .parse()
                .map(Some)
                .map_err(|_| format!("{name} is not an unsigned integer: {field:?}")),
        }
    };

    let clock_time = next_u64("time")?.ok_or("missing time")?;
    let obj_id = next_u64("obj_id")?.ok_or("missing obj_id")?;
    let obj_size = next_u64("obj_size")?.unwrap_or(1);
    Ok(Request {
        clock_time,
        obj_id,
        obj_size,
    })
}

fn looks_like_header(line: &str) -> bool {
    line.split(',')
        .next()
        .is_some_and(|field| field.trim().parse::<u64>().is_err())
}
