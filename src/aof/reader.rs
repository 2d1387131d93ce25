//! AOF reader
//!
//! Streams command records back out of the AOF file.

use super::AofError;
use crate::protocol::{RespError, RespReader, RespValue};
use std::path::Path;
use tokio::fs::File;

/// AOF reader
pub struct AofReader {
    reader: RespReader<File>,
}

impl AofReader {
    /// Open an AOF file for sequential reading from the start
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, AofError> {
        let file = File::open(path).await?;

        Ok(AofReader {
            reader: RespReader::new(file),
        })
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` at a clean end of file, `AofError::Truncated` when
    /// the file stops inside a record, and `AofError::Corrupt` for bytes that
    /// are not RESP at all.
    pub async fn next_record(&mut self) -> Result<Option<RespValue>, AofError> {
        match self.reader.read_value().await {
            Ok(record) => Ok(record),
            Err(RespError::Io(e)) => Err(AofError::Io(e)),
            Err(RespError::UnexpectedEof) => Err(AofError::Truncated {
                offset: self.valid_len(),
            }),
            Err(source) => Err(AofError::Corrupt {
                offset: self.valid_len(),
                source,
            }),
        }
    }

    /// Length of the prefix made of complete records read so far
    pub fn valid_len(&self) -> u64 {
        self.reader.position()
    }
}
