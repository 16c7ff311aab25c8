pub mod acquisition;
pub mod auto_read;
pub mod card;
pub mod error;
pub mod events;
pub mod models;
pub mod settings;
pub mod storage;
mod utils;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;

pub use acquisition::AcquisitionController;
pub use card::ReaderSubsystem;
pub use error::ReaderError;
pub use events::{EventBus, ReaderEvent};
pub use models::{IdentityRecord, ReaderPresence};
pub use settings::ReaderSettings;

use auto_read::AutoReadMonitor;
use storage::RecordStore;

/// Everything a shell needs: the controller it calls into, the event stream it
/// listens to, and the background auto-read task.
pub struct ReaderApp {
    controller: AcquisitionController,
    events: EventBus,
    monitor: AutoReadMonitor,
    settings: ReaderSettings,
}

impl ReaderApp {
    pub fn new(subsystem: Arc<dyn ReaderSubsystem>, settings: ReaderSettings) -> Self {
        let events = EventBus::new();
        let controller = AcquisitionController::new(
            subsystem,
            RecordStore::new(settings.data_dir.clone()),
            Arc::new(events.clone()),
        );

        Self {
            controller,
            events,
            monitor: AutoReadMonitor::new(),
            settings,
        }
    }

    pub fn controller(&self) -> &AcquisitionController {
        &self.controller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.events.subscribe()
    }

    /// Spawns the auto-read task. Must be called from inside a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        self.monitor
            .start(self.controller.clone(), self.settings.intervals())?;
        if self.settings.auto_read_on_start {
            self.controller.set_auto_read(true);
        }
        Ok(())
    }

    /// Clears the shared state first so no new read or save can begin, then stops the
    /// auto-read task.
    pub async fn shutdown(mut self) -> Result<()> {
        self.controller.shutdown();
        self.monitor.stop().await
    }
}

/// Runs the reader until `shutdown` resolves, logging every event.
pub async fn serve(
    subsystem: Arc<dyn ReaderSubsystem>,
    settings: ReaderSettings,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut app = ReaderApp::new(subsystem, settings);
    let mut events = app.subscribe();

    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(payload) => log::info!("[{}] {payload}", event.name()),
                    Err(err) => log::warn!("[{}] unserializable payload: {err}", event.name()),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("event log skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    app.start()?;
    let status = app.controller().reader_status().await;
    log::info!("Reader status: {}", status.message);

    shutdown.await;
    log::info!("Application is closing...");

    let result = app.shutdown().await;
    event_logger.abort();
    result
}

#[cfg(feature = "pcsc")]
pub fn run() -> Result<()> {
    use anyhow::Context;

    // RUST_LOG overrides the default level
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("MyKad Reader starting up...");

    let settings_path = std::env::var("MYKAD_CONFIG").unwrap_or_else(|_| "mykad_reader.json".into());
    let settings = ReaderSettings::load(std::path::Path::new(&settings_path))?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(serve(
        Arc::new(card::pcsc_backend::PcscSubsystem::new()),
        settings,
        async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for ctrl-c: {err}");
            }
        },
    ))
}
