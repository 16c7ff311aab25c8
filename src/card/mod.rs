pub mod decoder;
#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "pcsc")]
pub mod pcsc_backend;
pub mod presence;
pub mod transport;

pub use decoder::{read_identity, DecodedCard, FieldRead, FieldSpec, FIELD_LAYOUT, SELECT_JPN_APDU};
pub use presence::probe;
pub use transport::{transmit, CardChannel, ReaderSession, ReaderSubsystem, STATUS_SUCCESS};

use crate::error::ReaderError;

/// Opens a session, connects to the first reader and decodes the card in it.
///
/// Returns the decoded card together with the name of the reader it was read from.
/// The connection and session are released before returning, on every path.
pub fn acquire(subsystem: &dyn ReaderSubsystem) -> Result<(DecodedCard, String), ReaderError> {
    let session = subsystem.open_session()?;
    let reader = session
        .list_readers()?
        .into_iter()
        .next()
        .ok_or(ReaderError::NoReadersFound)?;

    let mut channel = session.connect(&reader)?;
    let decoded = read_identity(channel.as_mut())?;
    Ok((decoded, reader))
}
