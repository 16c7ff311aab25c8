//! Error taxonomy for card acquisition and record storage.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("smart card service unavailable: {0}")]
    SubsystemUnavailable(String),

    #[error("no smart card readers found")]
    NoReadersFound,

    #[error("no card present in reader {reader}")]
    NoCardPresent { reader: String },

    #[error("failed to select JPN application: {0}")]
    ApplicationSelectFailed(#[source] Box<ReaderError>),

    #[error("failed to read {field} at offset {offset}: {source}")]
    FieldReadFailed {
        field: &'static str,
        offset: u16,
        #[source]
        source: Box<ReaderError>,
    },

    #[error("invalid APDU response: {}", hex(.0))]
    MalformedResponse(Vec<u8>),

    #[error("card returned error status: {0:04X}")]
    CardRejected(u16),

    #[error("failed to transmit APDU: {0}")]
    TransmitFailed(String),

    #[error("failed to write {}: {source}", .path.display())]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot save file, IC number is empty")]
    EmptyIdentifier,

    #[error("invalid data file {name}: {reason}")]
    InvalidDataFile { name: String, reason: String },

    #[error("a card read is already in progress")]
    ReadInProgress,

    #[error("reader is shutting down")]
    ShuttingDown,

    #[error("card worker failed: {0}")]
    WorkerFailed(String),
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
