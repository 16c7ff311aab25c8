use log::debug;

use crate::models::ReaderPresence;

use super::transport::ReaderSubsystem;

/// Checks for a reader and a card without touching card state.
///
/// Every failure is folded into the returned snapshot. The session and any
/// connection opened here are dropped before returning.
pub fn probe(subsystem: &dyn ReaderSubsystem) -> ReaderPresence {
    let session = match subsystem.open_session() {
        Ok(session) => session,
        Err(err) => {
            return ReaderPresence::unavailable(format!("Failed to establish context: {err}"))
        }
    };

    let readers = match session.list_readers() {
        Ok(readers) => readers,
        Err(err) => return ReaderPresence::unavailable(format!("Failed to list readers: {err}")),
    };

    let Some(reader) = readers.into_iter().next() else {
        return ReaderPresence::unavailable("No smart card readers found");
    };

    match session.connect(&reader) {
        Ok(_channel) => ReaderPresence::card_ready(reader),
        Err(err) => {
            debug!("probe: no card in {reader}: {err}");
            ReaderPresence::waiting(reader)
        }
    }
}
