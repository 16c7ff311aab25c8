pub mod controller;
pub mod loop_worker;
pub mod phase;

pub use controller::AutoReadMonitor;
pub use loop_worker::AutoReadWorker;
pub use phase::Phase;
