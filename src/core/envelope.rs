//! Purpose: Compound query envelopes: queries, FindAll requests, and FindAll responses.
//! Exports: `AnyValue`, `IncludedMap`, `JournalQuery`, `AccountQuery`, `FindAllRequest`,
//!          `FindAllResponse`, `CompoundResult`.
//! Role: Wire shape of `{ values, included }` responses; resolution goes through the registry.
//! Invariants: Included ids are unique (map semantics, a repeated id on the wire keeps the last).
//! Invariants: Primary values are kept in wire order.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::entity::{ProtoMessage, read_string};
use crate::core::error::DecodeError;
use crate::core::registry::{DecodedEntity, IncludedPolicy, SkippedEntry, decode_included_with};
use crate::core::wire::{Reader, WireError, WireType, Writer, expect_wire_type};

/// `google.protobuf.Any`: a type url plus the encoded message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnyValue {
    pub type_url: String,
    pub value: Vec<u8>,
}

impl AnyValue {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }

    pub fn pack<M: ProtoMessage>(message: &M) -> Self {
        Self::new(M::TYPE_URL, message.encode())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.string(1, &self.type_url).bytes(2, &self.value);
        writer.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut any = AnyValue::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => any.type_url = read_string(&mut reader, field, wire_type)?,
                2 => {
                    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                    any.value = reader.read_bytes()?.to_vec();
                }
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(any)
    }
}

pub type IncludedMap = BTreeMap<String, AnyValue>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JournalQuery {
    pub id: Vec<String>,
}

impl ProtoMessage for JournalQuery {
    const TYPE_URL: &'static str = "/whiterabbit.journal.v1.JournalQuery";

    fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.repeated_string(1, &self.id);
        writer.into_bytes()
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut query = JournalQuery::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => query.id.push(read_string(&mut reader, field, wire_type)?),
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(query)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountQuery {
    pub id: Vec<String>,
    pub journal_id: Vec<String>,
}

impl AccountQuery {
    pub fn for_journals<I, S>(journal_id: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Vec::new(),
            journal_id: journal_id.into_iter().map(Into::into).collect(),
        }
    }
}

impl ProtoMessage for AccountQuery {
    const TYPE_URL: &'static str = "/whiterabbit.account.v1.AccountQuery";

    fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer
            .repeated_string(1, &self.id)
            .repeated_string(2, &self.journal_id);
        writer.into_bytes()
    }

    fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut query = AccountQuery::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => query.id.push(read_string(&mut reader, field, wire_type)?),
                2 => query
                    .journal_id
                    .push(read_string(&mut reader, field, wire_type)?),
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(query)
    }
}

/// `FindAllRequest { Query query = 1; }`. The query message is always present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindAllRequest<Q> {
    pub query: Q,
}

impl<Q: ProtoMessage + Default> FindAllRequest<Q> {
    pub fn new(query: Q) -> Self {
        Self { query }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.message(1, &self.query.encode());
        writer.into_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut query = Q::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => {
                    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                    query = Q::decode(reader.read_bytes()?)?;
                }
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(Self { query })
    }
}

/// `FindAllResponse { repeated T values = 1; map<string, Any> included = 2; }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FindAllResponse<T> {
    pub values: Vec<T>,
    pub included: IncludedMap,
}

impl<T> Default for FindAllResponse<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            included: IncludedMap::new(),
        }
    }
}

impl<T: ProtoMessage> FindAllResponse<T> {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        for value in &self.values {
            writer.message(1, &value.encode());
        }
        for (id, any) in &self.included {
            let mut entry = Writer::new();
            entry.string(1, id).message(2, &any.encode());
            writer.message(2, &entry.into_bytes());
        }
        writer.into_bytes()
    }

    /// Parses the envelope. Included entries stay encoded until `resolve`.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(buf);
        let mut response = FindAllResponse::default();
        while let Some((field, wire_type)) = reader.next_field()? {
            match field {
                1 => {
                    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                    response.values.push(T::decode(reader.read_bytes()?)?);
                }
                2 => {
                    expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                    let (id, any) = decode_map_entry(reader.read_bytes()?)?;
                    response.included.insert(id, any);
                }
                _ => reader.skip(wire_type)?,
            }
        }
        Ok(response)
    }

    /// Decodes every included entry under `policy`; primary values pass through.
    pub fn resolve(self, policy: IncludedPolicy) -> Result<CompoundResult<T>, DecodeError> {
        let report = decode_included_with(&self.included, policy)?;
        Ok(CompoundResult {
            values: self.values,
            included: report.entities,
            skipped: report.skipped,
        })
    }
}

fn decode_map_entry(buf: &[u8]) -> Result<(String, AnyValue), WireError> {
    let mut reader = Reader::new(buf);
    let mut key = String::new();
    let mut value = AnyValue::default();
    while let Some((field, wire_type)) = reader.next_field()? {
        match field {
            1 => key = read_string(&mut reader, field, wire_type)?,
            2 => {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                value = AnyValue::decode(reader.read_bytes()?)?;
            }
            _ => reader.skip(wire_type)?,
        }
    }
    Ok((key, value))
}

/// A fully decoded compound response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompoundResult<T> {
    pub values: Vec<T>,
    pub included: BTreeMap<String, DecodedEntity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedEntry>,
}
