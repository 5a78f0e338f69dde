//! Byte source contract consumed by every decoder
//!
//! A source yields raw bytes from a serial port, a UDP socket or a capture
//! file. Reads return fewer bytes than requested only on timeout or end of
//! data; a read of zero bytes means "nothing available right now".
//! Playback sources rewind at end of file so callers see an endless stream.

use crate::decoder::DecodeOutcome;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where the bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Serial,
    Udp,
    Playback,
}

/// Unrecoverable byte-source failure. Decoders surface this to their reader
/// loop, which raises the input's must-exit flag.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error on {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("source {0} is closed")]
    Closed(String),
}

impl SourceError {
    pub fn io(source_name: impl Into<String>, error: std::io::Error) -> Self {
        SourceError::Io {
            source_name: source_name.into(),
            error,
        }
    }
}

/// Pull-based byte stream
pub trait ByteSource: Send {
    /// Human readable name (device path, `udp:4000`, file name)
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Read up to `buf.len()` bytes. `Ok(0)` means timeout / no data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Rewind a playback source. Live sources ignore this.
    fn seek_to_start(&mut self) -> Result<(), SourceError>;

    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self);

    /// True once after a playback source wrapped back to the start
    fn take_rewound(&mut self) -> bool {
        false
    }

    /// Outcome for a decode call that found no frame start
    fn idle_outcome(&mut self) -> DecodeOutcome {
        if self.take_rewound() {
            DecodeOutcome::SourceExhausted
        } else {
            DecodeOutcome::NoFrame
        }
    }

    /// Read until `n` bytes are collected or a read comes back empty.
    ///
    /// The result is shorter than `n` only when the source timed out or ran
    /// dry; decoders treat that as a short read.
    fn read_up_to(&mut self, n: usize) -> Result<Vec<u8>, SourceError> {
        let mut out = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = self.read(&mut out[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        out.truncate(filled);
        Ok(out)
    }

    /// Single byte, `None` on timeout
    fn read_byte(&mut self) -> Result<Option<u8>, SourceError> {
        let mut b = [0u8; 1];
        match self.read(&mut b)? {
            0 => Ok(None),
            _ => Ok(Some(b[0])),
        }
    }
}
