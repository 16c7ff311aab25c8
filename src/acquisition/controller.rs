use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

use crate::card::{self, probe, ReaderSubsystem};
use crate::error::ReaderError;
use crate::events::{EventSink, ReadCompletedEvent, ReaderEvent};
use crate::models::{IdentityRecord, ReaderPresence};
use crate::storage::RecordStore;

use super::state::{AcquisitionState, AcquisitionStore, ReadGuard};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const APP_NAME: &str = "MyKad Reader";

#[derive(Debug, Clone, Serialize)]
pub struct ReadOutcome {
    pub record: IdentityRecord,
    pub reader: String,
    pub file_path: Option<PathBuf>,
    /// Set when the card was read but the record could not be written to disk.
    pub save_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestData {
    pub has_data: bool,
    pub record: Option<IdentityRecord>,
    pub read_time: Option<String>,
    pub reader_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub version: &'static str,
    pub name: &'static str,
    pub auto_read: bool,
    pub has_data: bool,
    pub last_read: Option<String>,
    pub is_reading: bool,
}

#[derive(Debug)]
pub enum AutoAcquire {
    /// Another read held the reader; nothing was sent to the card.
    Busy,
    Completed(ReadOutcome),
    Failed(ReaderError),
}

/// Entry point for everything the shell can ask of the reader.
///
/// Cheap to clone; all clones share one [`AcquisitionStore`].
#[derive(Clone)]
pub struct AcquisitionController {
    subsystem: Arc<dyn ReaderSubsystem>,
    store: Arc<AcquisitionStore>,
    records: RecordStore,
    events: Arc<dyn EventSink>,
    auto_read_changed: Arc<Notify>,
}

impl AcquisitionController {
    pub fn new(
        subsystem: Arc<dyn ReaderSubsystem>,
        records: RecordStore,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            subsystem,
            store: Arc::new(AcquisitionStore::new()),
            records,
            events,
            auto_read_changed: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Arc<AcquisitionStore> {
        &self.store
    }

    pub(crate) fn auto_read_changed(&self) -> Arc<Notify> {
        Arc::clone(&self.auto_read_changed)
    }

    pub async fn reader_status(&self) -> ReaderPresence {
        let subsystem = Arc::clone(&self.subsystem);
        tokio::task::spawn_blocking(move || probe(subsystem.as_ref()))
            .await
            .unwrap_or_else(|err| ReaderPresence::unavailable(format!("Reader probe failed: {err}")))
    }

    /// Reads the card now, saves it and installs it as the current record.
    ///
    /// Rejected with [`ReaderError::ReadInProgress`] while another read holds the reader.
    pub async fn read_now(&self) -> Result<ReadOutcome, ReaderError> {
        let guard = self.store.begin_read()?;
        let outcome = self.run_acquisition(guard, true).await?;

        let mut event = ReadCompletedEvent::new(outcome.record.clone(), outcome.file_path.as_deref());
        event.success = outcome.save_error.is_none();
        self.events.emit(ReaderEvent::ReadCompleted(event));

        Ok(outcome)
    }

    pub fn latest_data(&self) -> LatestData {
        let state: AcquisitionState = self.store.snapshot();
        LatestData {
            has_data: state.has_data(),
            read_time: state.last_read_time(),
            record: state.record,
            reader_name: state.reader_name,
        }
    }

    pub fn set_auto_read(&self, enabled: bool) {
        self.store.set_auto_read(enabled);
        self.auto_read_changed.notify_one();
        self.events.emit(ReaderEvent::AutoReadStatusChanged(enabled));

        if enabled {
            log_info!("Auto-read feature enabled");
        } else {
            log_info!("Auto-read feature disabled");
        }
    }

    pub fn auto_read_status(&self) -> bool {
        self.store.auto_read()
    }

    pub fn saved_files(&self) -> Result<Vec<String>, ReaderError> {
        self.records.list()
    }

    /// Loads a previously saved record and makes it the current one.
    pub fn load_saved(&self, file_name: &str) -> Result<(IdentityRecord, PathBuf), ReaderError> {
        let (record, path) = self.records.load(file_name)?;
        self.store.commit(record.clone(), None)?;
        Ok((record, path))
    }

    pub fn app_info(&self) -> AppInfo {
        let state = self.store.snapshot();
        AppInfo {
            version: env!("CARGO_PKG_VERSION"),
            name: APP_NAME,
            auto_read: state.auto_read,
            has_data: state.has_data(),
            last_read: state.last_read_time(),
            is_reading: state.is_reading,
        }
    }

    /// Clears the shared state and refuses further reads. Saves that already started
    /// finish before this returns.
    pub fn shutdown(&self) {
        log_info!("Reader is shutting down, clearing acquisition state");
        self.store.shutdown();
        self.auto_read_changed.notify_one();
    }

    pub(crate) async fn auto_acquire(&self) -> AutoAcquire {
        let guard = match self.store.begin_read() {
            Ok(guard) => guard,
            Err(ReaderError::ReadInProgress) => return AutoAcquire::Busy,
            Err(err) => return AutoAcquire::Failed(err),
        };

        log_info!("MyKad detected! Auto-reading data...");
        self.events.emit(ReaderEvent::AutoReadStarted);

        match self.run_acquisition(guard, false).await {
            Ok(outcome) => {
                match (&outcome.file_path, &outcome.save_error) {
                    (Some(path), _) => {
                        log_info!("Auto-read successful! Saved to: {}", path.display());
                        self.events.emit(ReaderEvent::AutoReadCompleted(ReadCompletedEvent::new(
                            outcome.record.clone(),
                            Some(path.as_path()),
                        )));
                    }
                    (None, save_error) => {
                        let message = save_error.clone().unwrap_or_default();
                        self.events.emit(ReaderEvent::AutoReadError(message));
                    }
                }
                AutoAcquire::Completed(outcome)
            }
            Err(err) => {
                log_error!("Error auto-reading card: {err}");
                self.events.emit(ReaderEvent::AutoReadError(err.to_string()));
                AutoAcquire::Failed(err)
            }
        }
    }

    pub(crate) fn card_removed(&self) {
        log_info!("MyKad removed");
        self.store.clear();
        self.events.emit(ReaderEvent::CardRemoved);
    }

    /// Runs the hardware read on the blocking pool. The guard moves with it, so the
    /// read-in-progress flag stays set until the card exchange has fully finished even
    /// if the caller stops waiting.
    ///
    /// A successful foreground read is marked before the guard drops, so the auto-read
    /// loop never sees the reader free without also seeing the mark.
    async fn run_acquisition(
        &self,
        guard: ReadGuard,
        foreground: bool,
    ) -> Result<ReadOutcome, ReaderError> {
        let subsystem = Arc::clone(&self.subsystem);
        let store = Arc::clone(&self.store);
        let records = self.records.clone();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let outcome = acquire_and_store(subsystem.as_ref(), &store, &records);
            if foreground && outcome.is_ok() {
                store.mark_foreground_read();
            }
            outcome
        })
        .await
        .map_err(|err| ReaderError::WorkerFailed(err.to_string()))?
    }
}

fn acquire_and_store(
    subsystem: &dyn ReaderSubsystem,
    store: &AcquisitionStore,
    records: &RecordStore,
) -> Result<ReadOutcome, ReaderError> {
    let (decoded, reader) = card::acquire(subsystem)?;

    let unread: Vec<&str> = decoded.unread().map(|field| field.as_str()).collect();
    if !unread.is_empty() {
        log_warn!("Card in {reader} read with unreadable fields: {}", unread.join(", "));
    }

    let record = decoded.record;
    let saved = store.unless_shutting_down(|| records.save(&record));
    if let Err(ReaderError::ShuttingDown) = saved {
        return Err(ReaderError::ShuttingDown);
    }

    store.commit(record.clone(), Some(reader.clone()))?;

    let (file_path, save_error) = match saved {
        Ok(path) => (Some(path), None),
        Err(err) => {
            log_error!("Card read but not saved: {err}");
            (None, Some(err.to_string()))
        }
    };

    Ok(ReadOutcome {
        record,
        reader,
        file_path,
        save_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::mock::{CardImage, MockReader};
    use crate::events::EventBus;
    use crate::models::Field;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::broadcast::Receiver;

    struct Harness {
        reader: MockReader,
        controller: AcquisitionController,
        events: Receiver<ReaderEvent>,
        dir: TempDir,
    }

    fn harness(reader: MockReader) -> Harness {
        let dir = tempdir().unwrap();
        let bus = EventBus::new();
        let events = bus.subscribe();
        let controller = AcquisitionController::new(
            Arc::new(reader.clone()),
            RecordStore::new(dir.path()),
            Arc::new(bus),
        );
        Harness {
            reader,
            controller,
            events,
            dir,
        }
    }

    fn drain(events: &mut Receiver<ReaderEvent>) -> Vec<&'static str> {
        std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.name())
            .collect()
    }

    #[tokio::test]
    async fn read_now_saves_and_commits() {
        let mut h = harness(MockReader::with_card(CardImage::sample()));

        let outcome = h.controller.read_now().await.unwrap();

        let path = outcome.file_path.clone().unwrap();
        assert!(path.starts_with(h.dir.path()));
        assert!(path.exists());
        assert!(outcome.save_error.is_none());
        assert_eq!(outcome.reader, h.reader.reader_name());

        let latest = h.controller.latest_data();
        assert!(latest.has_data);
        assert_eq!(latest.record.unwrap().ic_number, "900101145678");
        assert_eq!(latest.reader_name.as_deref(), Some(outcome.reader.as_str()));
        assert!(latest.read_time.is_some());

        assert!(!h.controller.store().is_reading());
        assert_eq!(h.reader.open_handles(), (0, 0));
        assert_eq!(drain(&mut h.events), vec!["read-completed"]);
    }

    #[tokio::test]
    async fn read_now_is_rejected_while_another_read_holds_the_reader() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        let guard = h.controller.store().begin_read().unwrap();

        let err = h.controller.read_now().await.unwrap_err();

        assert!(matches!(err, ReaderError::ReadInProgress));
        assert_eq!(h.reader.sessions_opened(), 0);
        assert!(h.reader.transmitted().is_empty());
        drop(guard);
        assert!(h.controller.read_now().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_reads_never_interleave() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        h.reader.set_exchange_delay(std::time::Duration::from_millis(5));

        let (first, second) = tokio::join!(h.controller.read_now(), h.controller.read_now());

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ReaderError::ReadInProgress))));
        assert_eq!(h.reader.select_count(), 1);
        assert_eq!(h.reader.overlapping_exchanges(), 0);
    }

    #[tokio::test]
    async fn missing_card_fails_and_releases_everything() {
        let h = harness(MockReader::empty());

        let err = h.controller.read_now().await.unwrap_err();

        assert!(matches!(err, ReaderError::NoCardPresent { .. }));
        assert_eq!(h.reader.open_handles(), (0, 0));
        assert!(!h.controller.store().is_reading());
        assert!(!h.controller.latest_data().has_data);
    }

    #[tokio::test]
    async fn stopped_service_fails_the_read() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        h.reader.stop_service();

        let err = h.controller.read_now().await.unwrap_err();

        assert!(matches!(err, ReaderError::SubsystemUnavailable(_)));
        assert!(!h.controller.store().is_reading());
        assert!(!h.controller.latest_data().has_data);
        assert!(h.controller.saved_files().unwrap().is_empty());
        assert!(!h.controller.store().take_foreground_read());
        assert_eq!(h.reader.open_handles(), (0, 0));
    }

    #[tokio::test]
    async fn successful_read_marks_the_card_handled() {
        let h = harness(MockReader::with_card(CardImage::sample()));

        h.controller.read_now().await.unwrap();

        assert!(h.controller.store().take_foreground_read());
    }

    #[tokio::test]
    async fn missing_readers_are_reported() {
        let h = harness(MockReader::empty());
        h.reader.unplug_readers();

        let err = h.controller.read_now().await.unwrap_err();

        assert!(matches!(err, ReaderError::NoReadersFound));
        assert_eq!(h.reader.open_handles(), (0, 0));
    }

    #[tokio::test]
    async fn select_failure_commits_nothing() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        h.reader.reject_select(0x6A82);

        let err = h.controller.read_now().await.unwrap_err();

        assert!(matches!(err, ReaderError::ApplicationSelectFailed(_)));
        assert!(!h.controller.latest_data().has_data);
        assert!(h.controller.saved_files().unwrap().is_empty());
        assert_eq!(h.reader.open_handles(), (0, 0));
    }

    #[tokio::test]
    async fn unreadable_identity_number_is_returned_but_not_saved() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        h.reader.reject_offset(273, 0x6982);

        let outcome = h.controller.read_now().await.unwrap();

        assert_eq!(outcome.record.get(Field::IcNumber), "");
        assert_eq!(outcome.record.name, "AHMAD BIN ALI");
        assert!(outcome.file_path.is_none());
        assert_eq!(
            outcome.save_error.as_deref(),
            Some("cannot save file, IC number is empty")
        );
        assert!(h.controller.saved_files().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_clears_state_and_blocks_reads() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        h.controller.set_auto_read(true);
        h.controller.read_now().await.unwrap();

        h.controller.shutdown();

        let info = h.controller.app_info();
        assert!(!info.has_data);
        assert!(!info.auto_read);
        assert!(!info.is_reading);
        let sessions = h.reader.sessions_opened();
        assert!(matches!(
            h.controller.read_now().await,
            Err(ReaderError::ShuttingDown)
        ));
        assert_eq!(h.reader.sessions_opened(), sessions);
        assert_eq!(h.controller.saved_files().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_saved_installs_record() {
        let h = harness(MockReader::with_card(CardImage::sample()));
        let outcome = h.controller.read_now().await.unwrap();
        h.controller.store().clear();

        let names = h.controller.saved_files().unwrap();
        let (record, path) = h.controller.load_saved(&names[0]).unwrap();

        assert_eq!(record, outcome.record);
        assert_eq!(Some(path), outcome.file_path);
        let latest = h.controller.latest_data();
        assert_eq!(latest.record, Some(record));
        assert_eq!(latest.reader_name, None);
    }

    #[tokio::test]
    async fn auto_read_toggle_is_announced() {
        let mut h = harness(MockReader::empty());

        h.controller.set_auto_read(true);
        assert!(h.controller.auto_read_status());
        h.controller.set_auto_read(false);

        let changes: Vec<bool> = std::iter::from_fn(|| h.events.try_recv().ok())
            .filter_map(|event| match event {
                ReaderEvent::AutoReadStatusChanged(enabled) => Some(enabled),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![true, false]);
        assert!(!h.controller.auto_read_status());
    }

    #[tokio::test]
    async fn reader_status_probes_without_reading() {
        let h = harness(MockReader::with_card(CardImage::sample()));

        let presence = h.controller.reader_status().await;

        assert!(presence.has_card);
        assert!(h.reader.transmitted().is_empty());
        assert_eq!(h.reader.open_handles(), (0, 0));
    }

    #[test]
    fn app_info_reports_crate_version() {
        let h = harness(MockReader::empty());
        let info = h.controller.app_info();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.name, APP_NAME);
        assert!(info.last_read.is_none());
    }
}
