pub mod controller;
pub mod state;

pub use controller::{AcquisitionController, AppInfo, AutoAcquire, LatestData, ReadOutcome};
pub use state::{AcquisitionState, AcquisitionStore, ReadGuard};
