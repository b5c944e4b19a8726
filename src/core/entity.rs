//! Purpose: Typed whiterabbit entities (`Journal`, `Account`) and their protobuf schemas.
//! Exports: `ProtoMessage`, `Journal`, `Account`, `AccountType`, `Timestamp`.
//! Role: Concrete decoders the type registry dispatches to.
//! Invariants: Decoding skips unknown fields so newer servers stay readable.
//! Invariants: Encoding is deterministic (fixed field order, defaults omitted).
use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::wire::{Reader, WireError, WireType, Writer, expect_wire_type};

pub const JOURNAL_TYPE_URL: &str = "/whiterabbit.journal.v1.Journal";
pub const ACCOUNT_TYPE_URL: &str = "/whiterabbit.account.v1.Account";

/// A protobuf message with a fully qualified type url.
pub trait ProtoMessage: Sized {
    const TYPE_URL: &'static str;

    fn encode(&self) -> Vec<u8>;

    fn decode(buf: &[u8]) -> Result<Self, WireError>;
}

/// `google.protobuf.Timestamp`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

// 0001-01-01T00:00:00Z and 9999-12-31T23:59:59Z
const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;
const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    pub fn to_rfc3339(&self) -> Option<String> {
        let nanos = i128::from(self.seconds) * 1_000_000_000 + i128::from(self.nanos);
        let ts = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
        ts.format(&Rfc3339).ok()
    }

    fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.int64(1, self.seconds).int32(2, self.nanos);
        writer.into_bytes()
    }

    fn decode(buf: &[u8], field: u32) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut ts = Timestamp::default();
        while let Some((inner, wire_type)) = reader.next_field()? {
            match inner {
                1 => {
                    expect_wire_type(inner, wire_type, WireType::Varint)?;
                    ts.seconds = reader.read_int64()?;
                }
                2 => {
                    expect_wire_type(inner, wire_type, WireType::Varint)?;
                    ts.nanos = reader.read_int32()?;
                }
                _ => reader.skip(wire_type)?,
            }
        }
        if !(0..1_000_000_000).contains(&ts.nanos) {
            return Err(WireError::InvalidValue {
                field,
                reason: "timestamp nanos out of range",
            });
        }
        if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&ts.seconds) {
            return Err(WireError::InvalidValue {
                field,
                reason: "timestamp seconds out of range",
            });
        }
        Ok(ts)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_rfc3339() {
            Some(text) => serializer.serialize_str(&text),
            None => Err(serde::ser::Error::custom("timestamp not representable")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccountType {
    #[default]
    Unspecified,
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
    /// Open enum: values added by newer servers are kept as-is.
    Unrecognized(i32),
}

impl AccountType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => AccountType::Unspecified,
            1 => AccountType::Asset,
            2 => AccountType::Liability,
            3 => AccountType::Equity,
            4 => AccountType::Income,
            5 => AccountType::Expense,
            other => AccountType::Unrecognized(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            AccountType::Unspecified => 0,
            AccountType::Asset => 1,
            AccountType::Liability => 2,
            AccountType::Equity => 3,
            AccountType::Income => 4,
            AccountType::Expense => 5,
            AccountType::Unrecognized(value) => value,
        }
    }

    pub fn as_str(self) -> Option<&'static str> {
        match self {
            AccountType::Unspecified => Some("unspecified"),
            AccountType::Asset => Some("asset"),
            AccountType::Liability => Some("liability"),
            AccountType::Equity => Some("equity"),
            AccountType::Income => Some("income"),
            AccountType::Expense => Some("expense"),
            AccountType::Unrecognized(_) => None,
        }
    }
}

impl Serialize for AccountType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_str() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_i32(self.as_i32()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Journal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl ProtoMessage for Journal {
    const TYPE_URL: &'static str = JOURNAL_TYPE_URL;

    fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer
            .string(1, &self.id)
            .string(2, &self.name)
            .string(3, &self.description)
            .string(4, &self.currency);
        if let Some(created_at) = &self.created_at {
            writer.message(5, &created_at.encode());
        }
        writer.into_bytes()
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut journal = Journal::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => journal.id = read_string(&mut reader, field, wire_type)?,
                2 => journal.name = read_string(&mut reader, field, wire_type)?,
                3 => journal.description = read_string(&mut reader, field, wire_type)?,
                4 => journal.currency = read_string(&mut reader, field, wire_type)?,
                5 => journal.created_at = Some(read_timestamp(&mut reader, field, wire_type)?),
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(journal)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: String,
    pub journal_id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl ProtoMessage for Account {
    const TYPE_URL: &'static str = ACCOUNT_TYPE_URL;

    fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer
            .string(1, &self.id)
            .string(2, &self.journal_id)
            .string(3, &self.name)
            .string(4, &self.description)
            .int32(5, self.account_type.as_i32())
            .optional_string(6, self.parent_id.as_deref());
        if let Some(created_at) = &self.created_at {
            writer.message(7, &created_at.encode());
        }
        writer.into_bytes()
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut account = Account::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => account.id = read_string(&mut reader, field, wire_type)?,
                2 => account.journal_id = read_string(&mut reader, field, wire_type)?,
                3 => account.name = read_string(&mut reader, field, wire_type)?,
                4 => account.description = read_string(&mut reader, field, wire_type)?,
                5 => {
                    expect_wire_type(field, wire_type, WireType::Varint)?;
                    account.account_type = AccountType::from_i32(reader.read_int32()?);
                }
                6 => account.parent_id = Some(read_string(&mut reader, field, wire_type)?),
                7 => account.created_at = Some(read_timestamp(&mut reader, field, wire_type)?),
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(account)
    }
}

pub(crate) fn read_string(
    reader: &mut Reader<'_>,
    field: u32,
    wire_type: WireType,
) -> Result<String, WireError> {
    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
    reader.read_string(field)
}

fn read_timestamp(
    reader: &mut Reader<'_>,
    field: u32,
    wire_type: WireType,
) -> Result<Timestamp, WireError> {
    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
    Timestamp::decode(reader.read_bytes()?, field)
}
