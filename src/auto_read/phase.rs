use std::time::Duration;

use serde::Serialize;

use crate::settings::PollIntervals;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Auto-read disabled.
    #[default]
    Idle,
    /// Auto-read enabled, no card tracked.
    Watching,
    /// Auto-read enabled and the card in the reader has been handled.
    CardPresent,
}

/// What the loop learned at the start of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Disabled,
    /// Another read holds the reader, so it was not probed.
    ReaderBusy,
    /// `already_read` is set when a foreground read succeeded since the last probe.
    Probed { card_present: bool, already_read: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Acquire,
    ReportRemoval,
}

impl Phase {
    /// Next phase and the action to take for it. For [`Action::Acquire`] the returned
    /// phase is the one to keep if the acquisition fails; see [`Phase::after_acquire`].
    pub fn advance(self, observation: Observation) -> (Phase, Action) {
        match (self, observation) {
            (_, Observation::Disabled) => (Phase::Idle, Action::None),

            // Nothing is known about the card until the reader is free again.
            (Phase::Idle, Observation::ReaderBusy) => (Phase::Watching, Action::None),
            (phase, Observation::ReaderBusy) => (phase, Action::None),

            (
                Phase::Idle | Phase::Watching,
                Observation::Probed {
                    card_present: true,
                    already_read: true,
                },
            ) => (Phase::CardPresent, Action::None),
            (
                Phase::Idle | Phase::Watching,
                Observation::Probed {
                    card_present: true,
                    already_read: false,
                },
            ) => (Phase::Watching, Action::Acquire),
            (Phase::Idle | Phase::Watching, Observation::Probed { card_present: false, .. }) => {
                (Phase::Watching, Action::None)
            }

            (Phase::CardPresent, Observation::Probed { card_present: true, .. }) => {
                (Phase::CardPresent, Action::None)
            }
            (Phase::CardPresent, Observation::Probed { card_present: false, .. }) => {
                (Phase::Watching, Action::ReportRemoval)
            }
        }
    }

    /// A failed acquisition keeps watching so a later tick can try the same card again.
    pub fn after_acquire(succeeded: bool) -> Phase {
        if succeeded {
            Phase::CardPresent
        } else {
            Phase::Watching
        }
    }

    pub fn poll_interval(self, intervals: &PollIntervals) -> Duration {
        match self {
            Phase::Idle => intervals.idle,
            Phase::Watching | Phase::CardPresent => intervals.active,
        }
    }
}
