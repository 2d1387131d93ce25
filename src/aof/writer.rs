//! AOF writer
//!
//! Handles writing command records to the AOF file.

use super::{AofError, SyncPolicy};
use crate::protocol::{RespEncoder, RespValue};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::error;

/// AOF writer
///
/// Appends, syncs and close all go through the same mutex, so records never
/// interleave and a sync never observes half a record.
pub struct AofWriter {
    file: Mutex<Option<File>>,
    sync_policy: SyncPolicy,
}

impl AofWriter {
    /// Create a new AOF writer, creating the file if absent
    pub fn new<P: AsRef<Path>>(path: P, sync_policy: SyncPolicy) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        Ok(AofWriter {
            file: Mutex::new(Some(file)),
            sync_policy,
        })
    }

    /// Encode and write one record
    ///
    /// A failed write is rolled back so the file stays a sequence of whole
    /// records. With `SyncPolicy::Always` the fsync runs on the calling
    /// thread while the lock is held; that thread is a runtime worker when
    /// called from a connection, so `always` trades throughput for
    /// durability.
    pub fn append(&self, value: &RespValue) -> Result<(), AofError> {
        let bytes = RespEncoder::encode(value);

        let mut guard = self.lock();
        let file = guard.as_mut().ok_or(AofError::Closed)?;
        let len = file.metadata()?.len();
        write_record(file, &bytes, |file| file.set_len(len))?;

        if self.sync_policy == SyncPolicy::Always {
            file.sync_data()?;
        }

        Ok(())
    }

    /// Force sync to disk. A no-op once the writer is closed.
    pub fn sync(&self) -> Result<(), AofError> {
        if let Some(file) = self.lock().as_ref() {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Release the file. Later appends fail with `AofError::Closed`.
    pub fn close(&self) -> Result<(), AofError> {
        if let Some(file) = self.lock().take() {
            file.sync_all()?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write `bytes` in full, or undo whatever part of them reached `out`
fn write_record<W, F>(out: &mut W, bytes: &[u8], rollback: F) -> io::Result<()>
where
    W: Write,
    F: FnOnce(&mut W) -> io::Result<()>,
{
    if let Err(e) = out.write_all(bytes) {
        if let Err(undo) = rollback(out) {
            error!("Failed to remove partial AOF record: {}", undo);
        }
        return Err(e);
    }
    Ok(())
}
