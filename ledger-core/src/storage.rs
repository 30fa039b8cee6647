//! Append-only ledger file
//!
//! # Format
//!
//! A flat sequence of records, no header, footer, index or checksum:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ length: u32 (LE)     │ body: `length` bytes (JSON)  │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Crash policy
//!
//! The last write is at risk, all prior writes are durable. A record is
//! written with a single `write_all` and (optionally) `sync_data`, but a
//! crash can still leave a length prefix without its full body. On load the
//! reader keeps every complete record and stops at a record cut short by
//! EOF; that partial tail is dropped from the file so later appends stay
//! readable. A block whose append crashed mid-write is therefore invisible
//! after restart.
//!
//! An append that fails without crashing (short write, failed sync) cuts the
//! file back to its length before the write. If that cut fails too, the
//! handle refuses further appends.
//!
//! A complete record that does not decode is corruption, not a torn write:
//! loading fails and the file is left untouched.

use crate::{
    error::{Error, Result},
    types::Block,
};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Size of the record length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Outcome of reading the ledger file
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Blocks decoded from complete records, in file order
    pub blocks: Vec<Block>,
    /// Byte offset just past the last complete record
    pub valid_bytes: u64,
    /// Bytes after `valid_bytes` of a record cut short by EOF
    pub discarded_bytes: u64,
}

impl LoadReport {
    /// Whether a partial trailing record was found
    pub fn has_partial_tail(&self) -> bool {
        self.discarded_bytes > 0
    }
}

/// Encode a block as one length-prefixed record
pub fn encode_record(block: &Block) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(block)?;
    let length = u32::try_from(body.len())
        .map_err(|_| Error::Storage(format!("Record of {} bytes exceeds u32", body.len())))?;

    let mut record = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    record.extend_from_slice(&length.to_le_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

/// Read until `buf` is full or EOF; returns the number of bytes read
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decode records from `reader` until EOF or a partial trailing record
///
/// A complete record that fails to decode is an error.
pub fn decode_records<R: Read>(reader: &mut R) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    loop {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        let read = read_up_to(reader, &mut prefix)?;
        if read == 0 {
            break;
        }
        if read < LENGTH_PREFIX_SIZE {
            report.discarded_bytes += read as u64;
            break;
        }

        let length = u32::from_le_bytes(prefix) as usize;
        let mut body = Vec::new();
        let read = (&mut *reader).take(length as u64).read_to_end(&mut body)?;
        if read < length {
            report.discarded_bytes += (LENGTH_PREFIX_SIZE + read) as u64;
            break;
        }

        match serde_json::from_slice::<Block>(&body) {
            Ok(block) => {
                report.valid_bytes += (LENGTH_PREFIX_SIZE + length) as u64;
                report.blocks.push(block);
            }
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Undecodable record of {} bytes at offset {}: {}",
                    length, report.valid_bytes, e
                )));
            }
        }
    }

    Ok(report)
}

/// File operations an append relies on, including its rollback
pub(crate) trait RecordFile: Write {
    /// Current length in bytes
    fn current_len(&self) -> io::Result<u64>;

    /// Cut the file back to `len`
    fn cut_to(&self, len: u64) -> io::Result<()>;

    /// Flush written data to the device
    fn sync(&self) -> io::Result<()>;
}

impl RecordFile for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn cut_to(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Ledger file handle
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    sync_writes: bool,
    /// Set when a failed append could not be rolled back
    broken: AtomicBool,
}

impl Storage {
    /// Create a handle; the parent directory is created if missing
    pub fn open(path: impl Into<PathBuf>, sync_writes: bool) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            path,
            sync_writes,
            broken: AtomicBool::new(false),
        })
    }

    /// Ledger file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every complete record. A missing file is an empty ledger.
    pub fn load(&self) -> Result<LoadReport> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = ?self.path, "No ledger file, starting fresh");
                return Ok(LoadReport::default());
            }
            Err(e) => return Err(e.into()),
        };

        let report = decode_records(&mut BufReader::new(file))?;

        tracing::info!(
            path = ?self.path,
            blocks = report.blocks.len(),
            discarded_bytes = report.discarded_bytes,
            "Loaded ledger file"
        );

        Ok(report)
    }

    /// Cut the file back to `valid_bytes`, dropping a partial tail
    pub fn truncate(&self, valid_bytes: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(valid_bytes)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Append one block record; returns the number of bytes written
    ///
    /// On failure the file keeps its previous length.
    pub fn append(&self, block: &Block) -> Result<u64> {
        let record = encode_record(block)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        self.write_record(&mut file, &record)?;

        tracing::debug!(
            height = block.height,
            digest = %block.digest,
            bytes = record.len(),
            "Block record appended"
        );

        Ok(record.len() as u64)
    }

    /// Write `record` at the end of `file`, rolling back on any error
    pub(crate) fn write_record<F: RecordFile>(&self, file: &mut F, record: &[u8]) -> Result<()> {
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::Storage(format!(
                "Ledger file {} has an unrecoverable partial record, appends disabled",
                self.path.display()
            )));
        }

        let start = file.current_len()?;
        let outcome = file.write_all(record).and_then(|()| {
            if self.sync_writes {
                file.sync()
            } else {
                Ok(())
            }
        });

        let error = match outcome {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        match file.cut_to(start) {
            Ok(()) => {
                tracing::warn!(
                    path = ?self.path,
                    length = start,
                    error = %error,
                    "Append failed, ledger file rolled back"
                );
                Err(error.into())
            }
            Err(rollback) => {
                self.broken.store(true, Ordering::Release);
                tracing::error!(
                    path = ?self.path,
                    error = %error,
                    rollback_error = %rollback,
                    "Append failed and rollback failed, appends disabled"
                );
                Err(Error::Storage(format!(
                    "Append failed ({}) and rollback to {} bytes failed ({})",
                    error, start, rollback
                )))
            }
        }
    }

    /// Current file size in bytes (0 if absent)
    pub fn size(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
