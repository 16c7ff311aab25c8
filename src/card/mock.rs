//! Scripted in-memory reader used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::error::ReaderError;
use crate::models::Field;

use super::decoder::{FIELD_LAYOUT, SELECT_JPN_APDU};
use super::transport::{CardChannel, ReaderSession, ReaderSubsystem};

const IMAGE_SIZE: usize = 700;

#[derive(Debug, Clone)]
pub struct CardImage {
    memory: Vec<u8>,
}

impl CardImage {
    pub fn blank() -> Self {
        Self {
            memory: vec![0; IMAGE_SIZE],
        }
    }

    pub fn sample() -> Self {
        Self::blank()
            .with_field(Field::Name, "AHMAD BIN ALI")
            .with_field(Field::IcNumber, "900101145678")
            .with_field(Field::Sex, "L")
            .with_field(Field::DateOfBirth, "1990-01-01")
            .with_field(Field::StateOfBirth, "SELANGOR")
            .with_field(Field::Address1, "NO 12 JALAN MAWAR")
            .with_field(Field::Address2, "TAMAN BUNGA")
            .with_field(Field::Postcode, "43000")
            .with_field(Field::City, "KAJANG")
            .with_field(Field::Religion, "ISLAM")
    }

    /// Writes `text` into the field's slot, space padded like the real card.
    pub fn with_field(mut self, field: Field, text: &str) -> Self {
        let spec = FIELD_LAYOUT
            .iter()
            .find(|spec| spec.field == field)
            .expect("field in layout");
        let start = spec.offset as usize;
        let slot = &mut self.memory[start..start + spec.length as usize];
        slot.fill(b' ');
        let bytes = text.as_bytes();
        let len = bytes.len().min(slot.len());
        slot[..len].copy_from_slice(&bytes[..len]);
        self
    }
}

struct MockState {
    service_up: bool,
    readers: Vec<String>,
    card: Option<CardImage>,
    select_status: u16,
    rejected_offsets: HashMap<u16, u16>,
    truncated_offsets: HashSet<u16>,
    pull_card_at: Option<u16>,
    transmitted: Vec<Vec<u8>>,
    open_sessions: usize,
    open_channels: usize,
    sessions_opened: usize,
    in_flight: usize,
    overlapping: usize,
    exchange_delay: Option<Duration>,
}

#[derive(Clone)]
pub struct MockReader {
    state: Arc<Mutex<MockState>>,
}

impl MockReader {
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                service_up: true,
                readers: vec!["ACS ACR1252 Dual Reader PICC 00 00".to_string()],
                card: None,
                select_status: 0x9000,
                rejected_offsets: HashMap::new(),
                truncated_offsets: HashSet::new(),
                pull_card_at: None,
                transmitted: Vec::new(),
                open_sessions: 0,
                open_channels: 0,
                sessions_opened: 0,
                in_flight: 0,
                overlapping: 0,
                exchange_delay: None,
            })),
        }
    }

    pub fn with_card(image: CardImage) -> Self {
        let reader = Self::empty();
        reader.insert(image);
        reader
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn reader_name(&self) -> String {
        self.lock().readers.first().cloned().unwrap_or_default()
    }

    pub fn insert(&self, image: CardImage) {
        self.lock().card = Some(image);
    }

    pub fn remove_card(&self) {
        self.lock().card = None;
    }

    pub fn unplug_readers(&self) {
        self.lock().readers.clear();
    }

    pub fn stop_service(&self) {
        self.lock().service_up = false;
    }

    pub fn reject_select(&self, status: u16) {
        self.lock().select_status = status;
    }

    pub fn accept_select(&self) {
        self.lock().select_status = 0x9000;
    }

    pub fn reject_offset(&self, offset: u16, status: u16) {
        self.lock().rejected_offsets.insert(offset, status);
    }

    /// Answers reads at `offset` with a lone status byte.
    pub fn truncate_offset(&self, offset: u16) {
        self.lock().truncated_offsets.insert(offset);
    }

    /// Removes the card as soon as the read at `offset` is sent.
    pub fn pull_card_at(&self, offset: u16) {
        self.lock().pull_card_at = Some(offset);
    }

    pub fn set_exchange_delay(&self, delay: Duration) {
        self.lock().exchange_delay = Some(delay);
    }

    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.lock().transmitted.clone()
    }

    pub fn select_count(&self) -> usize {
        self.lock()
            .transmitted
            .iter()
            .filter(|cmd| cmd.as_slice() == SELECT_JPN_APDU)
            .count()
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    /// Sessions and channels that were opened and not yet dropped.
    pub fn open_handles(&self) -> (usize, usize) {
        let state = self.lock();
        (state.open_sessions, state.open_channels)
    }

    pub fn overlapping_exchanges(&self) -> usize {
        self.lock().overlapping
    }

    /// A channel to the inserted card, bypassing session setup.
    pub fn channel(&self) -> MockChannel {
        self.lock().open_channels += 1;
        MockChannel {
            reader: self.clone(),
        }
    }
}

impl ReaderSubsystem for MockReader {
    fn open_session(&self) -> Result<Box<dyn ReaderSession>, ReaderError> {
        let mut state = self.lock();
        if !state.service_up {
            return Err(ReaderError::SubsystemUnavailable(
                "the smart card resource manager is not running".to_string(),
            ));
        }
        state.open_sessions += 1;
        state.sessions_opened += 1;
        Ok(Box::new(MockSession {
            reader: self.clone(),
        }))
    }
}

struct MockSession {
    reader: MockReader,
}

impl ReaderSession for MockSession {
    fn list_readers(&self) -> Result<Vec<String>, ReaderError> {
        Ok(self.reader.lock().readers.clone())
    }

    fn connect(&self, reader: &str) -> Result<Box<dyn CardChannel>, ReaderError> {
        let mut state = self.reader.lock();
        if state.card.is_none() || !state.readers.iter().any(|name| name == reader) {
            return Err(ReaderError::NoCardPresent {
                reader: reader.to_string(),
            });
        }
        state.open_channels += 1;
        Ok(Box::new(MockChannel {
            reader: self.reader.clone(),
        }))
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.reader.lock().open_sessions -= 1;
    }
}

pub struct MockChannel {
    reader: MockReader,
}

impl CardChannel for MockChannel {
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>, ReaderError> {
        let delay = {
            let mut state = self.reader.lock();
            state.transmitted.push(command.to_vec());
            state.in_flight += 1;
            if state.in_flight > 1 {
                state.overlapping += 1;
            }
            state.exchange_delay
        };

        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut state = self.reader.lock();
        state.in_flight -= 1;
        if let (Some(offset), [0x00, 0xB0, high, low, _]) = (state.pull_card_at, command) {
            if offset == u16::from_be_bytes([*high, *low]) {
                state.card = None;
            }
        }
        respond(&state, command)
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.reader.lock().open_channels -= 1;
    }
}

fn respond(state: &MockState, command: &[u8]) -> Result<Vec<u8>, ReaderError> {
    let Some(card) = state.card.as_ref() else {
        return Err(ReaderError::TransmitFailed("card was removed".to_string()));
    };

    if command == SELECT_JPN_APDU {
        return Ok(state.select_status.to_be_bytes().to_vec());
    }

    match command {
        [0x00, 0xB0, high, low, length] => {
            let offset = u16::from_be_bytes([*high, *low]);
            if let Some(status) = state.rejected_offsets.get(&offset) {
                return Ok(status.to_be_bytes().to_vec());
            }
            if state.truncated_offsets.contains(&offset) {
                return Ok(vec![0x90]);
            }
            let start = usize::from(offset).min(card.memory.len());
            let end = (start + usize::from(*length)).min(card.memory.len());
            let mut response = card.memory[start..end].to_vec();
            response.extend_from_slice(&[0x90, 0x00]);
            Ok(response)
        }
        _ => Ok(vec![0x6D, 0x00]),
    }
}
