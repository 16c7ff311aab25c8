use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::ReaderError;
use crate::models::{IdentityRecord, READ_TIME_FORMAT};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionState {
    pub record: Option<IdentityRecord>,
    pub last_read_at: Option<DateTime<Local>>,
    pub is_reading: bool,
    pub auto_read: bool,
    pub reader_name: Option<String>,
    #[serde(skip)]
    foreground_read: bool,
    #[serde(skip)]
    shutting_down: bool,
}

impl AcquisitionState {
    pub fn has_data(&self) -> bool {
        self.record.is_some()
    }

    pub fn last_read_time(&self) -> Option<String> {
        self.last_read_at
            .map(|at| at.format(READ_TIME_FORMAT).to_string())
    }
}

/// Shared acquisition state behind a reader/writer lock.
///
/// Record, timestamp and reader name only change together, so a snapshot never
/// mixes values from two different commits.
#[derive(Debug, Default)]
pub struct AcquisitionStore {
    state: RwLock<AcquisitionState>,
}

/// Holds the read-in-progress flag. Dropping it clears the flag.
#[derive(Debug)]
pub struct ReadGuard {
    store: Arc<AcquisitionStore>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.store.write().is_reading = false;
    }
}

impl AcquisitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, AcquisitionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AcquisitionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AcquisitionState {
        self.read().clone()
    }

    /// Sets the read-in-progress flag if nobody holds it yet.
    pub fn begin_read(self: &Arc<Self>) -> Result<ReadGuard, ReaderError> {
        let mut state = self.write();
        if state.shutting_down {
            return Err(ReaderError::ShuttingDown);
        }
        if state.is_reading {
            return Err(ReaderError::ReadInProgress);
        }
        state.is_reading = true;
        Ok(ReadGuard {
            store: Arc::clone(self),
        })
    }

    pub fn is_reading(&self) -> bool {
        self.read().is_reading
    }

    /// Returns the previous value.
    pub fn set_auto_read(&self, enabled: bool) -> bool {
        std::mem::replace(&mut self.write().auto_read, enabled)
    }

    pub fn auto_read(&self) -> bool {
        self.read().auto_read
    }

    pub fn commit(
        &self,
        record: IdentityRecord,
        reader_name: Option<String>,
    ) -> Result<(), ReaderError> {
        let mut state = self.write();
        if state.shutting_down {
            return Err(ReaderError::ShuttingDown);
        }
        state.record = Some(record);
        state.last_read_at = Some(Local::now());
        state.reader_name = reader_name;
        Ok(())
    }

    /// Notes that a foreground read just succeeded, so the card now in the reader is
    /// already handled.
    pub fn mark_foreground_read(&self) {
        self.write().foreground_read = true;
    }

    /// Returns and clears the mark left by [`AcquisitionStore::mark_foreground_read`].
    pub fn take_foreground_read(&self) -> bool {
        std::mem::take(&mut self.write().foreground_read)
    }

    /// Drops the current record. Flags are left alone.
    pub fn clear(&self) {
        self.write().record = None;
    }

    /// Runs `f` unless shutdown has begun. Shutdown waits for a running `f` to finish.
    pub fn unless_shutting_down<T>(
        &self,
        f: impl FnOnce() -> Result<T, ReaderError>,
    ) -> Result<T, ReaderError> {
        let state = self.read();
        if state.shutting_down {
            return Err(ReaderError::ShuttingDown);
        }
        f()
    }

    /// Clears everything and refuses further reads and commits.
    pub fn shutdown(&self) {
        let mut state = self.write();
        state.shutting_down = true;
        state.record = None;
        state.is_reading = false;
        state.auto_read = false;
        state.foreground_read = false;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.read().shutting_down
    }
}
