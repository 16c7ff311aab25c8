use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::acquisition::AcquisitionController;
use crate::settings::PollIntervals;

use super::loop_worker::{auto_read_loop, AutoReadWorker};

/// Owns the background auto-read task.
pub struct AutoReadMonitor {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl AutoReadMonitor {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, controller: AcquisitionController, intervals: PollIntervals) -> Result<()> {
        if self.handle.is_some() {
            bail!("auto-read monitor already running");
        }

        let cancel_token = CancellationToken::new();
        let worker = AutoReadWorker::new(controller, intervals);
        let handle = tokio::spawn(auto_read_loop(worker, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for it to exit. A card read already in flight
    /// finishes first.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
            info!("Stop signal sent to auto-read monitor");
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("auto-read loop task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Default for AutoReadMonitor {
    fn default() -> Self {
        Self::new()
    }
}
