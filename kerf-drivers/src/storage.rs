//! RAM-mirrored progress store
//!
//! The control loop cannot wait on flash, so progress writes land in a RAM
//! mirror and are marked dirty. A separate task drains the dirty write with
//! [`MirroredProgress::take_pending`], commits it to flash and reports back
//! through [`MirroredProgress::mark_committed`] or
//! [`MirroredProgress::mark_failed`].
//!
//! At boot the firmware reads the flash record and hands it to
//! [`MirroredProgress::restore`] before the sequencer loads progress.
//! Records are postcard-encoded with [`encode_record`] and checked on the
//! way back in by [`decode_record`].

use kerf_core::sequence::ProgressRecord;
use kerf_core::traits::{ProgressStore, StoreError};

/// Serialize a record into `buffer`, returns the encoded bytes
///
/// A buffer of `MAX_PROGRESS_RECORD_SIZE` always fits.
pub fn encode_record<'b>(record: &ProgressRecord, buffer: &'b mut [u8]) -> Result<&'b [u8], StoreError> {
    let bytes: &'b [u8] = postcard::to_slice(record, buffer).map_err(|_| StoreError::Unavailable)?;
    Ok(bytes)
}

/// Deserialize a stored record and verify magic, version and CRC
pub fn decode_record(bytes: &[u8]) -> Result<ProgressRecord, StoreError> {
    let record: ProgressRecord = postcard::from_bytes(bytes).map_err(|_| StoreError::Corrupted)?;
    if !record.is_valid() {
        return Err(StoreError::Corrupted);
    }
    Ok(record)
}

/// Flash operation waiting to be committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PendingWrite {
    /// Write this record
    Save(ProgressRecord),
    /// Erase the stored record
    Clear,
}

/// Progress store mirrored in RAM with deferred flash commits
#[derive(Debug, Default)]
pub struct MirroredProgress {
    last_completed: u32,
    pending: Option<PendingWrite>,
    /// Last flash commit failed
    failed: bool,
    commits: u32,
}

impl MirroredProgress {
    pub const fn new() -> Self {
        Self {
            last_completed: 0,
            pending: None,
            failed: false,
            commits: 0,
        }
    }

    /// Seed the mirror from the stored flash record
    ///
    /// A missing record is a fresh start. A corrupted one is discarded and
    /// reported; the mirror starts from zero either way.
    pub fn restore(&mut self, stored: Option<&[u8]>) -> Result<u32, StoreError> {
        self.pending = None;
        self.last_completed = 0;
        let Some(bytes) = stored else {
            return Ok(0);
        };
        let record = decode_record(bytes)?;
        self.last_completed = record.last_completed;
        Ok(record.last_completed)
    }

    /// Take the write waiting for flash, if any
    pub fn take_pending(&mut self) -> Option<PendingWrite> {
        self.pending.take()
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    pub fn mark_committed(&mut self) {
        self.failed = false;
        self.commits = self.commits.wrapping_add(1);
    }

    /// Flash commit failed; requeue the write unless a newer one arrived
    pub fn mark_failed(&mut self, write: PendingWrite) {
        self.failed = true;
        self.requeue(write);
    }

    /// Put back a write that could not be handed to flash yet
    pub fn requeue(&mut self, write: PendingWrite) {
        if self.pending.is_none() {
            self.pending = Some(write);
        }
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Number of successful flash commits
    pub fn commits(&self) -> u32 {
        self.commits
    }
}

impl ProgressStore for MirroredProgress {
    fn load(&mut self) -> Result<u32, StoreError> {
        Ok(self.last_completed)
    }

    fn save(&mut self, last_completed: u32) -> Result<(), StoreError> {
        self.last_completed = last_completed;
        self.pending = Some(PendingWrite::Save(ProgressRecord::new(last_completed)));
        if self.failed {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.last_completed = 0;
        self.pending = Some(PendingWrite::Clear);
        if self.failed {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}
