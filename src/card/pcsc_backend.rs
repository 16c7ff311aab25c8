//! PC/SC implementation of the transport traits.

use std::ffi::CString;

use log::{debug, warn};
use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};

use crate::error::ReaderError;

use super::transport::{CardChannel, ReaderSession, ReaderSubsystem};

#[derive(Debug, Default, Clone, Copy)]
pub struct PcscSubsystem;

impl PcscSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl ReaderSubsystem for PcscSubsystem {
    fn open_session(&self) -> Result<Box<dyn ReaderSession>, ReaderError> {
        let context = Context::establish(Scope::User)
            .map_err(|err| ReaderError::SubsystemUnavailable(err.to_string()))?;
        Ok(Box::new(PcscSession {
            context: Some(context),
        }))
    }
}

struct PcscSession {
    context: Option<Context>,
}

impl PcscSession {
    fn context(&self) -> Result<&Context, ReaderError> {
        self.context
            .as_ref()
            .ok_or_else(|| ReaderError::SubsystemUnavailable("context released".to_string()))
    }
}

impl ReaderSession for PcscSession {
    fn list_readers(&self) -> Result<Vec<String>, ReaderError> {
        match self.context()?.list_readers_owned() {
            Ok(names) => Ok(names
                .into_iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(err) => Err(ReaderError::SubsystemUnavailable(err.to_string())),
        }
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, ReaderError> {
        let name = CString::new(reader).map_err(|_| ReaderError::NoCardPresent {
            reader: reader.to_string(),
        })?;

        let card = self
            .context()?
            .connect(&name, ShareMode::Shared, Protocols::ANY)
            .map_err(|err| match err {
                pcsc::Error::NoService | pcsc::Error::ServiceStopped => {
                    ReaderError::SubsystemUnavailable(err.to_string())
                }
                other => {
                    debug!("connect to {reader} failed: {other}");
                    ReaderError::NoCardPresent {
                        reader: reader.to_string(),
                    }
                }
            })?;

        Ok(Box::new(PcscChannel { card: Some(card) }))
    }
}

impl Drop for PcscSession {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            if let Err((_, err)) = context.release() {
                warn!("failed to release PC/SC context: {err}");
            }
        }
    }
}

struct PcscChannel {
    card: Option<Card>,
}

impl CardChannel for PcscChannel {
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, ReaderError> {
        let card = self
            .card
            .as_ref()
            .ok_or_else(|| ReaderError::TransmitFailed("card disconnected".to_string()))?;

        let mut buffer = [0u8; MAX_BUFFER_SIZE];
        card.transmit(command, &mut buffer)
            .map(|response| response.to_vec())
            .map_err(|err| ReaderError::TransmitFailed(err.to_string()))
    }
}

impl Drop for PcscChannel {
    fn drop(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, err)) = card.disconnect(Disposition::LeaveCard) {
                warn!("failed to disconnect card: {err}");
            }
        }
    }
}
