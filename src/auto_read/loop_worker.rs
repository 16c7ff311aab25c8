use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::acquisition::{AcquisitionController, AutoAcquire};
use crate::settings::PollIntervals;

use super::phase::{Action, Observation, Phase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// One auto-read poller. [`AutoReadWorker::tick`] runs a single poll; the spawned
/// loop calls it repeatedly and sleeps for the interval it returns.
pub struct AutoReadWorker {
    controller: AcquisitionController,
    intervals: PollIntervals,
    phase: Phase,
}

impl AutoReadWorker {
    pub fn new(controller: AcquisitionController, intervals: PollIntervals) -> Self {
        Self {
            controller,
            intervals,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    async fn observe(&self) -> Observation {
        let store = self.controller.store();
        if !store.auto_read() {
            store.take_foreground_read();
            return Observation::Disabled;
        }
        if store.is_reading() {
            return Observation::ReaderBusy;
        }

        let presence = self.controller.reader_status().await;
        Observation::Probed {
            card_present: presence.has_card,
            already_read: store.take_foreground_read(),
        }
    }

    /// Polls once and returns how long to wait before the next poll.
    pub async fn tick(&mut self) -> Duration {
        let observation = self.observe().await;
        let (next, action) = self.phase.advance(observation);

        let next = match action {
            Action::None => next,
            Action::Acquire => match self.controller.auto_acquire().await {
                AutoAcquire::Completed(_) => Phase::after_acquire(true),
                AutoAcquire::Busy => next,
                AutoAcquire::Failed(_) => Phase::after_acquire(false),
            },
            Action::ReportRemoval => {
                self.controller.card_removed();
                next
            }
        };

        if next != self.phase {
            log::debug!("auto-read phase {:?} -> {:?}", self.phase, next);
        }
        self.phase = next;
        self.phase.poll_interval(&self.intervals)
    }
}

pub async fn auto_read_loop(mut worker: AutoReadWorker, cancel_token: CancellationToken) {
    let wake = worker.controller.auto_read_changed();
    log_info!("Auto-read monitor started");

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        let wait = worker.tick().await;

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = wake.notified() => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("Auto-read monitor shutting down");
}
