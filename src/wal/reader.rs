//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{QuillError, Result};

use super::entry::{Frame, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::WalEntry;

/// Reads entries from the WAL file
///
/// Strict: a partial or corrupt frame is an error. Recovery streams the
/// log through the same reader but stops quietly at a damaged tail.
pub struct WalReader {
    reader: BufReader<File>,
    /// Byte offset of the next frame
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.next_frame()? {
            None => Ok(None),
            Some(Frame::Entry(entry, _)) => Ok(Some(entry)),
            Some(Frame::Incomplete) => Err(QuillError::WalCorruption(format!(
                "Partial entry at offset {}",
                self.position
            ))),
            Some(Frame::Corrupt(reason)) => Err(QuillError::WalCorruption(format!(
                "{} (offset {})",
                reason, self.position
            ))),
        }
    }

    /// Read the next frame without judging it
    ///
    /// Only I/O failures are errors. A short or invalid frame is returned
    /// as such and the position stays where that frame began.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_fully(&mut self.reader, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Ok(Some(Frame::Incomplete));
        }

        let payload_len =
            u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Ok(Some(Frame::Corrupt(format!(
                "Payload length {} exceeds max {}",
                payload_len, MAX_PAYLOAD_SIZE
            ))));
        }

        let mut buf = vec![0u8; HEADER_SIZE + payload_len];
        buf[..HEADER_SIZE].copy_from_slice(&header);
        let read = read_fully(&mut self.reader, &mut buf[HEADER_SIZE..])?;
        if read < payload_len {
            return Ok(Some(Frame::Incomplete));
        }

        let frame = WalEntry::decode_frame(&buf);
        if let Frame::Entry(_, size) = &frame {
            self.position += *size as u64;
        }
        Ok(Some(frame))
    }

    /// Byte offset just past the last entry returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
///
/// Yields at most one error, then stops.
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` as far as the reader allows, returning the bytes read
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
