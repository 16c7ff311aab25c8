//! Fixed-layout decoder for the JPN application on a MyKad.

use chrono::Local;
use log::warn;

use crate::error::ReaderError;
use crate::models::{Field, IdentityRecord};

use super::transport::{transmit, CardChannel};

/// SELECT by AID for the JPN application.
pub const SELECT_JPN_APDU: [u8; 16] = [
    0x00, 0xA4, 0x04, 0x00, 0x0B, 0x68, 0x04, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
];

const READ_BINARY_HEADER: [u8; 2] = [0x00, 0xB0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub offset: u16,
    pub length: u8,
}

const fn spec(field: Field, offset: u16, length: u8) -> FieldSpec {
    FieldSpec {
        field,
        offset,
        length,
    }
}

/// Card memory layout, in read order.
pub const FIELD_LAYOUT: [FieldSpec; 11] = [
    spec(Field::Name, 233, 40),
    spec(Field::IcNumber, 273, 13),
    spec(Field::Sex, 300, 1),
    spec(Field::DateOfBirth, 301, 10),
    spec(Field::StateOfBirth, 312, 25),
    spec(Field::Address1, 411, 30),
    spec(Field::Address2, 441, 30),
    spec(Field::Address3, 471, 30),
    spec(Field::Postcode, 574, 5),
    spec(Field::City, 579, 25),
    spec(Field::Religion, 653, 10),
];

/// Outcome of one field read. `value` is `None` when the read failed, which is distinct
/// from a field that was read but blank on the card (`Some("")`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRead {
    pub field: Field,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DecodedCard {
    pub record: IdentityRecord,
    pub fields: Vec<FieldRead>,
}

impl DecodedCard {
    pub fn unread(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields
            .iter()
            .filter(|read| read.value.is_none())
            .map(|read| read.field)
    }
}

pub fn select_application(channel: &mut dyn CardChannel) -> Result<(), ReaderError> {
    transmit(channel, &SELECT_JPN_APDU)
        .map(|_| ())
        .map_err(|err| ReaderError::ApplicationSelectFailed(Box::new(err)))
}

pub fn read_binary_command(offset: u16, length: u8) -> [u8; 5] {
    let [high, low] = offset.to_be_bytes();
    [READ_BINARY_HEADER[0], READ_BINARY_HEADER[1], high, low, length]
}

pub fn read_field(
    channel: &mut dyn CardChannel,
    offset: u16,
    length: u8,
) -> Result<Vec<u8>, ReaderError> {
    transmit(channel, &read_binary_command(offset, length))
}

/// Drops trailing NUL and space padding.
pub fn decode_field(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .rposition(|byte| *byte != 0x00 && *byte != b' ')
        .map_or(0, |idx| idx + 1);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Selects the JPN application and reads every field of [`FIELD_LAYOUT`].
///
/// A select failure aborts the whole read. A failed field read is logged and leaves
/// that field empty; the remaining fields are still attempted.
pub fn read_identity(channel: &mut dyn CardChannel) -> Result<DecodedCard, ReaderError> {
    select_application(channel)?;

    let fields: Vec<FieldRead> = FIELD_LAYOUT
        .iter()
        .map(|spec| {
            let value = match read_field(channel, spec.offset, spec.length) {
                Ok(raw) => Some(decode_field(&raw)),
                Err(source) => {
                    let err = ReaderError::FieldReadFailed {
                        field: spec.field.as_str(),
                        offset: spec.offset,
                        source: Box::new(source),
                    };
                    warn!("{err}; leaving field empty");
                    None
                }
            };
            FieldRead {
                field: spec.field,
                value,
            }
        })
        .collect();

    let read_at = Local::now();
    let record = IdentityRecord::from_fields(
        fields.iter().map(|read| (read.field, read.value.clone())),
        read_at,
    );

    Ok(DecodedCard { record, fields })
}
