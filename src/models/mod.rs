pub mod identity;
pub mod presence;

pub use identity::{Field, IdentityRecord, READ_TIME_FORMAT};
pub use presence::ReaderPresence;
