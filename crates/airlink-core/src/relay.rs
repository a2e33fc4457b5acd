//! What sharing-mode devices relay to each other
//!
//! A snapshot travels as one line of compact JSON terminated by `\n`. The
//! link delivers arbitrary chunks, so the receiving side buffers until the
//! terminator arrives.
//!
//! Relayed data carries no authority signature and is never written to the
//! receiver's local store.

use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{AirlinkError, AirlinkResult};
use crate::types::{Flight, NewsItem};

const TERMINATOR: u8 = b'\n';

/// Upper bound on a buffered snapshot line
pub const MAX_SNAPSHOT_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub flights: Vec<Flight>,
    pub news: Vec<NewsItem>,
}

impl Snapshot {
    /// Encode as one terminated line.
    pub fn to_frame(&self) -> AirlinkResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(TERMINATOR);
        Ok(bytes)
    }
}

/// Reassembles snapshot lines from received chunks.
#[derive(Debug, Default)]
pub struct SnapshotReader {
    buffer: BytesMut,
}

impl SnapshotReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a received chunk. Returns the first complete snapshot, if any.
    pub fn push(&mut self, chunk: &[u8]) -> AirlinkResult<Option<Snapshot>> {
        self.buffer.extend_from_slice(chunk);

        match self.buffer.iter().position(|b| *b == TERMINATOR) {
            Some(end) if end > MAX_SNAPSHOT_BYTES => {
                self.buffer.advance(end + 1);
                Err(AirlinkError::Serialization(
                    "snapshot exceeds size limit".to_string(),
                ))
            }
            Some(end) => {
                let line = self.buffer.split_to(end);
                self.buffer.advance(1);
                Ok(Some(serde_json::from_slice(&line)?))
            }
            None if self.buffer.len() > MAX_SNAPSHOT_BYTES => {
                self.buffer.clear();
                Err(AirlinkError::Serialization(
                    "snapshot exceeds size limit".to_string(),
                ))
            }
            None => Ok(None),
        }
    }

    /// Bytes received but not yet part of a complete snapshot
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
