use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format used for `read_time` in records and for timestamps handed to the shell.
pub const READ_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Name,
    IcNumber,
    Sex,
    DateOfBirth,
    StateOfBirth,
    Address1,
    Address2,
    Address3,
    Postcode,
    City,
    Religion,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::IcNumber => "ic_number",
            Field::Sex => "sex",
            Field::DateOfBirth => "date_of_birth",
            Field::StateOfBirth => "state_of_birth",
            Field::Address1 => "address_1",
            Field::Address2 => "address_2",
            Field::Address3 => "address_3",
            Field::Postcode => "postcode",
            Field::City => "city",
            Field::Religion => "religion",
        }
    }
}

/// Identity data decoded from the JPN application of a MyKad.
///
/// Serialized field names are the on-disk JSON keys; do not rename them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityRecord {
    pub name: String,
    pub ic_number: String,
    pub sex: String,
    pub date_of_birth: String,
    pub state_of_birth: String,
    pub address_1: String,
    pub address_2: String,
    pub address_3: String,
    pub postcode: String,
    pub city: String,
    pub religion: String,
    pub read_time: String,
}

impl IdentityRecord {
    /// Builds a record from per-field decode results. Fields that were not read stay empty.
    pub fn from_fields<I>(fields: I, read_at: DateTime<Local>) -> Self
    where
        I: IntoIterator<Item = (Field, Option<String>)>,
    {
        let mut record = Self {
            read_time: read_at.format(READ_TIME_FORMAT).to_string(),
            ..Self::default()
        };

        for (field, value) in fields {
            if let Some(value) = value {
                *record.slot_mut(field) = value;
            }
        }

        record
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::IcNumber => &self.ic_number,
            Field::Sex => &self.sex,
            Field::DateOfBirth => &self.date_of_birth,
            Field::StateOfBirth => &self.state_of_birth,
            Field::Address1 => &self.address_1,
            Field::Address2 => &self.address_2,
            Field::Address3 => &self.address_3,
            Field::Postcode => &self.postcode,
            Field::City => &self.city,
            Field::Religion => &self.religion,
        }
    }

    /// A record can only be persisted once the identity number was read.
    pub fn is_complete(&self) -> bool {
        !self.ic_number.is_empty()
    }

    fn slot_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Name => &mut self.name,
            Field::IcNumber => &mut self.ic_number,
            Field::Sex => &mut self.sex,
            Field::DateOfBirth => &mut self.date_of_birth,
            Field::StateOfBirth => &mut self.state_of_birth,
            Field::Address1 => &mut self.address_1,
            Field::Address2 => &mut self.address_2,
            Field::Address3 => &mut self.address_3,
            Field::Postcode => &mut self.postcode,
            Field::City => &mut self.city,
            Field::Religion => &mut self.religion,
        }
    }
}
