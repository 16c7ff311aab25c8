//! Command/response plumbing between the decoder and the reader subsystem.
//!
//! Handles are released by dropping them: a [`CardChannel`] disconnects the card
//! (leaving it powered) and a [`ReaderSession`] releases its subsystem context.

use crate::error::ReaderError;

/// Status word returned by the card for a successfully executed command.
pub const STATUS_SUCCESS: u16 = 0x9000;

/// Entry point into the platform smart card service.
pub trait ReaderSubsystem: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn ReaderSession>, ReaderError>;
}

pub trait ReaderSession: Send {
    /// Reader names in enumeration order. An empty list means no hardware is attached.
    fn list_readers(&self) -> Result<Vec<String>, ReaderError>;

    /// Opens a shared-mode connection to the card in `reader`.
    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, ReaderError>;
}

pub trait CardChannel: Send {
    /// Sends one raw APDU and returns the raw response, status word included.
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, ReaderError>;
}

/// Sends one APDU and checks its status word, returning the payload on `90 00`.
pub fn transmit(channel: &mut dyn CardChannel, command: &[u8]) -> Result<Vec<u8>, ReaderError> {
    let mut response = channel.exchange(command)?;

    if response.len() < 2 {
        return Err(ReaderError::MalformedResponse(response));
    }

    let split = response.len() - 2;
    let status = u16::from_be_bytes([response[split], response[split + 1]]);
    if status != STATUS_SUCCESS {
        return Err(ReaderError::CardRejected(status));
    }

    response.truncate(split);
    Ok(response)
}
