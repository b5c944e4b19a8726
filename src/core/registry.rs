//! Purpose: Static type-url registry and the included-map decoder.
//! Exports: `EntityKind`, `DecodedEntity`, `TypeRegistry`, `Registration`, `IncludedPolicy`,
//!          `IncludedReport`, `SkippedEntry`, `decode_included`, `decode_included_with`.
//! Role: Dispatch each `(type_url, bytes)` entry to the decoder of a known entity kind.
//! Invariants: The set of kinds is closed; adding one means a new `EntityKind` variant.
//! Invariants: Decoding is pure and order-independent; output is keyed by the input ids.
//! Invariants: Under `FailFast` any unknown type url or malformed payload fails the whole call.
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use serde::Serialize;

use crate::core::entity::{
    ACCOUNT_TYPE_URL, Account, JOURNAL_TYPE_URL, Journal, ProtoMessage,
};
use crate::core::envelope::AnyValue;
use crate::core::error::DecodeError;
use crate::core::wire::WireError;

pub type DecodeFn = fn(&[u8]) -> Result<DecodedEntity, WireError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Account,
    Journal,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Account, EntityKind::Journal];

    pub fn type_url(self) -> &'static str {
        match self {
            EntityKind::Account => ACCOUNT_TYPE_URL,
            EntityKind::Journal => JOURNAL_TYPE_URL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Journal => "journal",
        }
    }

    fn decoder(self) -> DecodeFn {
        match self {
            EntityKind::Account => |bytes| Account::decode(bytes).map(DecodedEntity::Account),
            EntityKind::Journal => |bytes| Journal::decode(bytes).map(DecodedEntity::Journal),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedEntity {
    Account(Account),
    Journal(Journal),
}

impl DecodedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            DecodedEntity::Account(_) => EntityKind::Account,
            DecodedEntity::Journal(_) => EntityKind::Journal,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            DecodedEntity::Account(account) => &account.id,
            DecodedEntity::Journal(journal) => &journal.id,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match self {
            DecodedEntity::Account(account) => Some(account),
            DecodedEntity::Journal(_) => None,
        }
    }

    pub fn as_journal(&self) -> Option<&Journal> {
        match self {
            DecodedEntity::Journal(journal) => Some(journal),
            DecodedEntity::Account(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Registration {
    pub kind: EntityKind,
    pub type_url: &'static str,
    decode: DecodeFn,
}

impl Registration {
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedEntity, WireError> {
        (self.decode)(bytes)
    }
}

#[derive(Debug)]
pub struct TypeRegistry {
    by_type_url: HashMap<&'static str, Registration>,
}

static BUILTIN: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::builtin);

impl TypeRegistry {
    /// Registry of every built-in entity kind, built on first use.
    pub fn global() -> &'static TypeRegistry {
        &BUILTIN
    }

    fn builtin() -> Self {
        let by_type_url = EntityKind::ALL
            .into_iter()
            .map(|kind| {
                let registration = Registration {
                    kind,
                    type_url: kind.type_url(),
                    decode: kind.decoder(),
                };
                (registration.type_url, registration)
            })
            .collect();
        Self { by_type_url }
    }

    pub fn lookup(&self, type_url: &str) -> Option<&Registration> {
        self.by_type_url.get(type_url)
    }

    pub fn kind_of(&self, type_url: &str) -> Option<EntityKind> {
        self.lookup(type_url).map(|registration| registration.kind)
    }

    pub fn type_urls(&self) -> Vec<&'static str> {
        let mut urls: Vec<_> = self.by_type_url.keys().copied().collect();
        urls.sort_unstable();
        urls
    }

    pub fn decode_entry(&self, id: &str, any: &AnyValue) -> Result<DecodedEntity, DecodeError> {
        let registration =
            self.lookup(&any.type_url)
                .ok_or_else(|| DecodeError::UnknownTypeTag {
                    id: id.to_string(),
                    type_url: any.type_url.clone(),
                })?;
        registration
            .decode(&any.value)
            .map_err(|cause| DecodeError::MalformedPayload {
                id: id.to_string(),
                type_url: any.type_url.clone(),
                cause,
            })
    }
}

/// What to do with an included entry whose type url is not registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IncludedPolicy {
    #[default]
    FailFast,
    /// Log and skip unknown kinds. Malformed payloads of known kinds still fail.
    SkipUnknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub id: String,
    pub type_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncludedReport {
    pub entities: BTreeMap<String, DecodedEntity>,
    /// Sorted by id.
    pub skipped: Vec<SkippedEntry>,
}

/// Decodes every included entry. Any unknown or malformed entry fails the call;
/// with several, the one with the smallest id is reported.
pub fn decode_included<'a, I>(included: I) -> Result<BTreeMap<String, DecodedEntity>, DecodeError>
where
    I: IntoIterator<Item = (&'a String, &'a AnyValue)>,
{
    decode_included_with(included, IncludedPolicy::FailFast).map(|report| report.entities)
}

pub fn decode_included_with<'a, I>(
    included: I,
    policy: IncludedPolicy,
) -> Result<IncludedReport, DecodeError>
where
    I: IntoIterator<Item = (&'a String, &'a AnyValue)>,
{
    let registry = TypeRegistry::global();
    let mut report = IncludedReport::default();
    // Smallest failing id wins regardless of input order.
    let mut failure: Option<DecodeError> = None;
    for (id, any) in included {
        match registry.decode_entry(id, any) {
            Ok(entity) => {
                report.entities.insert(id.clone(), entity);
            }
            Err(DecodeError::UnknownTypeTag { id, type_url })
                if policy == IncludedPolicy::SkipUnknown =>
            {
                report.skipped.push(SkippedEntry { id, type_url });
            }
            Err(err) => {
                if failure.as_ref().is_none_or(|current| err.id() < current.id()) {
                    failure = Some(err);
                }
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }
    report.skipped.sort_by(|a, b| a.id.cmp(&b.id));
    for entry in &report.skipped {
        tracing::warn!(
            id = %entry.id,
            type_url = %entry.type_url,
            "skipping included entry with unknown type url"
        );
    }
    tracing::debug!(
        decoded = report.entities.len(),
        skipped = report.skipped.len(),
        "decoded included entries"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{
        DecodedEntity, EntityKind, IncludedPolicy, SkippedEntry, TypeRegistry, decode_included,
        decode_included_with,
    };
    use crate::core::entity::{Account, AccountType, Journal, ProtoMessage};
    use crate::core::envelope::{AnyValue, IncludedMap};
    use crate::core::error::DecodeError;
    use crate::core::wire::WireError;
    use std::collections::HashMap;

    fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            journal_id: "j-1".to_string(),
            name: "Receivables".to_string(),
            account_type: AccountType::Asset,
            ..Account::default()
        }
    }

    fn journal(id: &str) -> Journal {
        Journal {
            id: id.to_string(),
            name: "General ledger".to_string(),
            currency: "USD".to_string(),
            ..Journal::default()
        }
    }

    fn included(entries: Vec<(&str, AnyValue)>) -> IncludedMap {
        entries
            .into_iter()
            .map(|(id, any)| (id.to_string(), any))
            .collect()
    }

    #[test]
    fn registry_knows_both_kinds() {
        let registry = TypeRegistry::global();
        assert_eq!(
            registry.type_urls(),
            vec!["/whiterabbit.account.v1.Account", "/whiterabbit.journal.v1.Journal"]
        );
        assert_eq!(
            registry.kind_of("/whiterabbit.journal.v1.Journal"),
            Some(EntityKind::Journal)
        );
        assert_eq!(registry.kind_of("whiterabbit.journal.v1.Journal"), None);
    }

    #[test]
    fn empty_map_decodes_to_empty_map() {
        let decoded = decode_included(&IncludedMap::new()).expect("empty is fine");
        assert!(decoded.is_empty());
    }

    #[test]
    fn account_at_id_42_round_trips() {
        let original = account("acc-42");
        let map = included(vec![("42", AnyValue::pack(&original))]);
        let decoded = decode_included(&map).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["42"], DecodedEntity::Account(original));
    }

    #[test]
    fn mixed_kinds_keep_their_ids() {
        let map = included(vec![
            ("a", AnyValue::pack(&account("a"))),
            ("j", AnyValue::pack(&journal("j"))),
        ]);
        let decoded = decode_included(&map).expect("decode");
        assert_eq!(decoded["a"].kind(), EntityKind::Account);
        assert_eq!(decoded["j"].kind(), EntityKind::Journal);
        assert_eq!(decoded["j"].as_journal().unwrap().currency, "USD");
    }

    #[test]
    fn unknown_type_url_fails_the_whole_call() {
        let map = included(vec![
            ("1", AnyValue::pack(&journal("1"))),
            ("2", AnyValue::new("/unknown.v1.Thing", b"anything".to_vec())),
        ]);
        let err = decode_included(&map).expect_err("unknown tag");
        assert_eq!(
            err,
            DecodeError::UnknownTypeTag {
                id: "2".to_string(),
                type_url: "/unknown.v1.Thing".to_string(),
            }
        );
    }

    #[test]
    fn malformed_payload_names_id_and_type_url() {
        let map = included(vec![
            ("ok", AnyValue::pack(&journal("ok"))),
            (
                "bad",
                AnyValue::new(Account::TYPE_URL, vec![0x0a, 0x09, b'x']),
            ),
        ]);
        let err = decode_included(&map).expect_err("malformed");
        assert_eq!(
            err,
            DecodeError::MalformedPayload {
                id: "bad".to_string(),
                type_url: Account::TYPE_URL.to_string(),
                cause: WireError::Truncated,
            }
        );
    }

    #[test]
    fn skip_unknown_collects_skipped_entries() {
        let map = included(vec![
            ("1", AnyValue::pack(&journal("1"))),
            ("3", AnyValue::new("/other.v1.Widget", Vec::new())),
            ("2", AnyValue::new("/unknown.v1.Thing", vec![0xff])),
        ]);
        let report = decode_included_with(&map, IncludedPolicy::SkipUnknown).expect("lenient");
        assert_eq!(report.entities.len(), 1);
        assert!(report.entities.contains_key("1"));
        assert_eq!(
            report.skipped,
            vec![
                SkippedEntry {
                    id: "2".to_string(),
                    type_url: "/unknown.v1.Thing".to_string(),
                },
                SkippedEntry {
                    id: "3".to_string(),
                    type_url: "/other.v1.Widget".to_string(),
                },
            ]
        );
    }

    #[test]
    fn skip_unknown_still_fails_on_malformed_known_kind() {
        let map = included(vec![
            ("2", AnyValue::new("/unknown.v1.Thing", Vec::new())),
            ("9", AnyValue::new(Journal::TYPE_URL, vec![0x07])),
        ]);
        let err = decode_included_with(&map, IncludedPolicy::SkipUnknown).expect_err("malformed");
        assert!(matches!(err, DecodeError::MalformedPayload { ref id, .. } if id == "9"));
    }

    #[test]
    fn hash_map_input_gives_same_result() {
        let map = included(vec![
            ("x", AnyValue::pack(&account("x"))),
            ("y", AnyValue::pack(&journal("y"))),
        ]);
        let hashed: HashMap<String, AnyValue> = map.clone().into_iter().collect();
        assert_eq!(
            decode_included(&hashed).expect("hash map"),
            decode_included(&map).expect("btree map")
        );
    }

    #[test]
    fn several_bad_entries_report_the_smallest_id_for_any_input_order() {
        let mut hashed: HashMap<String, AnyValue> = HashMap::new();
        for id in ["f", "c", "a", "e", "b", "d"] {
            hashed.insert(id.to_string(), AnyValue::new("/unknown.v1.Thing", Vec::new()));
        }
        hashed.insert("g".to_string(), AnyValue::pack(&journal("g")));
        for _ in 0..32 {
            let reordered: HashMap<String, AnyValue> = hashed.clone().into_iter().collect();
            let err = decode_included(&reordered).expect_err("unknown tags");
            assert_eq!(err.id(), "a");
        }

        let mut mixed: HashMap<String, AnyValue> = HashMap::new();
        mixed.insert("m2".to_string(), AnyValue::new(Journal::TYPE_URL, vec![0x07]));
        mixed.insert("m1".to_string(), AnyValue::new(Account::TYPE_URL, vec![0x0a, 0x09]));
        mixed.insert("a0".to_string(), AnyValue::new("/unknown.v1.Thing", Vec::new()));
        let err = decode_included(&mixed).expect_err("fail fast");
        assert_eq!(err.id(), "a0");
        let err = decode_included_with(&mixed, IncludedPolicy::SkipUnknown).expect_err("malformed");
        assert!(matches!(err, DecodeError::MalformedPayload { ref id, .. } if id == "m1"));
    }

    #[test]
    fn decoded_entities_render_with_kind_tag() {
        let entity = DecodedEntity::Journal(journal("j"));
        let value = serde_json::to_value(&entity).expect("json");
        assert_eq!(value["kind"], "journal");
        assert_eq!(value["id"], "j");
    }
}
