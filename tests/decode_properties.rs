use std::collections::{BTreeMap, HashMap};

use proptest::prelude::*;
use proptest::test_runner::Config;
use whiterabbit::api::{
    Account, AccountType, AnyValue, DecodeError, DecodedEntity, EntityKind, IncludedMap,
    IncludedPolicy, Journal, decode_included, decode_included_with,
};

#[derive(Clone, Debug)]
enum Sample {
    Account(Account),
    Journal(Journal),
}

impl Sample {
    fn pack(&self) -> AnyValue {
        match self {
            Sample::Account(account) => AnyValue::pack(account),
            Sample::Journal(journal) => AnyValue::pack(journal),
        }
    }

    fn kind(&self) -> EntityKind {
        match self {
            Sample::Account(_) => EntityKind::Account,
            Sample::Journal(_) => EntityKind::Journal,
        }
    }

    fn decoded(&self) -> DecodedEntity {
        match self {
            Sample::Account(account) => DecodedEntity::Account(account.clone()),
            Sample::Journal(journal) => DecodedEntity::Journal(journal.clone()),
        }
    }
}

fn account_type() -> impl Strategy<Value = AccountType> {
    prop_oneof![
        Just(AccountType::Unspecified),
        Just(AccountType::Asset),
        Just(AccountType::Liability),
        Just(AccountType::Equity),
        Just(AccountType::Income),
        Just(AccountType::Expense),
    ]
}

fn sample() -> impl Strategy<Value = Sample> {
    let account = (
        "[a-z0-9-]{0,12}",
        "[a-z0-9-]{0,12}",
        "\\PC{0,16}",
        account_type(),
        proptest::option::of("[a-z0-9-]{1,8}"),
    )
        .prop_map(|(id, journal_id, name, account_type, parent_id)| {
            Sample::Account(Account {
                id,
                journal_id,
                name,
                account_type,
                parent_id,
                ..Account::default()
            })
        });
    let journal = ("[a-z0-9-]{0,12}", "\\PC{0,16}", "[A-Z]{3}").prop_map(|(id, name, currency)| {
        Sample::Journal(Journal {
            id,
            name,
            currency,
            ..Journal::default()
        })
    });
    prop_oneof![account, journal]
}

fn samples() -> impl Strategy<Value = BTreeMap<String, Sample>> {
    proptest::collection::btree_map("[a-y0-9]{1,6}", sample(), 0..12)
}

fn packed(samples: &BTreeMap<String, Sample>) -> IncludedMap {
    samples
        .iter()
        .map(|(id, sample)| (id.clone(), sample.pack()))
        .collect()
}

proptest! {
    #![proptest_config(Config::with_cases(128))]

    #[test]
    fn decoded_ids_and_kinds_match_input(samples in samples()) {
        let decoded = decode_included(&packed(&samples)).expect("known types decode");
        prop_assert_eq!(decoded.len(), samples.len());
        for (id, sample) in &samples {
            let entity = decoded.get(id).expect("every id survives");
            prop_assert_eq!(entity.kind(), sample.kind());
            prop_assert_eq!(entity, &sample.decoded());
        }
    }

    #[test]
    fn decoding_is_deterministic(samples in samples()) {
        let included = packed(&samples);
        let first = decode_included(&included).expect("decode");
        let second = decode_included(&included).expect("decode");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn one_unknown_entry_fails_the_whole_map(
        samples in samples(),
        payload in proptest::collection::vec(any::<u8>(), 0..32)
    ) {
        let mut included = packed(&samples);
        included.insert(
            "zz-unknown".to_string(),
            AnyValue::new("/unknown.v1.Thing", payload),
        );
        match decode_included(&included) {
            Err(DecodeError::UnknownTypeTag { id, type_url }) => {
                prop_assert_eq!(id, "zz-unknown");
                prop_assert_eq!(type_url, "/unknown.v1.Thing");
            }
            other => prop_assert!(false, "expected unknown type tag, got {:?}", other),
        }

        let report = decode_included_with(&included, IncludedPolicy::SkipUnknown)
            .expect("skip unknown");
        prop_assert_eq!(report.entities.len(), samples.len());
        prop_assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn input_map_type_does_not_change_output(samples in samples()) {
        let ordered = packed(&samples);
        let hashed: HashMap<String, AnyValue> = ordered.clone().into_iter().collect();
        prop_assert_eq!(
            decode_included(&hashed).expect("hash map"),
            decode_included(&ordered).expect("btree map")
        );
    }
}
