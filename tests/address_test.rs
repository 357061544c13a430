use dxtp::address::{hash_segment, ADDRESS_LENGTH};
use dxtp::{Address, AddressScheme, Dimension, ExchangeOp, Family, IdentGenerator, Subtype};
use proptest::prelude::*;
use std::collections::HashSet;

fn arb_governed_dimension() -> impl Strategy<Value = Dimension> {
    prop_oneof![Just(Dimension::Unit), Just(Dimension::Resource)]
}

fn arb_op() -> impl Strategy<Value = ExchangeOp> {
    (0usize..ExchangeOp::ALL.len()).prop_map(|i| ExchangeOp::ALL[i])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: address derivation is pure
    #[test]
    fn property_address_determinism(
        dimension in arb_governed_dimension(),
        system in "[a-z]{1,12}",
        key in "[a-z0-9_]{1,24}",
    ) {
        let first = AddressScheme::default();
        let second = AddressScheme::new("hashblock");

        prop_assert_eq!(
            first.asset(dimension, &system, &key),
            second.asset(dimension, &system, &key)
        );
        prop_assert_eq!(
            first.address(Family::Asset, dimension, &[system.as_str(), key.as_str()]).unwrap(),
            first.asset(dimension, &system, &key)
        );
    }

    /// Property: every derived address is leaf length and classifies back to its inputs
    #[test]
    fn property_exchange_addresses_classify(op in arb_op(), ident in "[0-9a-f]{32}") {
        let scheme = AddressScheme::default();
        let address = scheme.exchange(op, &ident);

        prop_assert_eq!(address.as_str().len(), ADDRESS_LENGTH);
        let classification = scheme.classify(address.as_str()).unwrap();
        prop_assert_eq!(classification.family, Family::Match);
        prop_assert_eq!(classification.dimension, op.dimension());
        prop_assert_eq!(classification.subtype, Subtype::Exchange { op, matched: false });

        let slot = scheme.matched_slot(&address);
        prop_assert_eq!(
            scheme.classify(slot.as_str()).unwrap().subtype,
            Subtype::Exchange { op, matched: true }
        );
    }

    /// Property: parsing accepts exactly 70 hex characters
    #[test]
    fn property_parse_rejects_wrong_shape(raw in "[0-9a-fA-F]{0,80}") {
        let parsed = Address::parse(&raw);
        prop_assert_eq!(parsed.is_ok(), raw.len() == ADDRESS_LENGTH);
        if let Ok(address) = parsed {
            prop_assert_eq!(address.as_str(), raw.to_ascii_lowercase());
        }
    }
}

#[test]
fn test_distinct_inputs_do_not_collide() {
    let scheme = AddressScheme::default();
    let mut seen = HashSet::new();

    for dimension in [Dimension::Unit, Dimension::Resource] {
        assert!(seen.insert(scheme.settings(dimension)));
        for family in [Family::Setting, Family::Asset] {
            assert!(seen.insert(scheme.candidates(family, dimension)));
        }
        for system in ["imperial", "metric", "food"] {
            for key in 0..50 {
                assert!(seen.insert(scheme.asset(dimension, system, &format!("key{}", key))));
            }
        }
    }

    let mut idents = IdentGenerator::new(7);
    for op in ExchangeOp::ALL {
        for _ in 0..50 {
            let address = scheme.exchange(op, &idents.next_ident());
            assert!(seen.insert(scheme.matched_slot(&address)));
            assert!(seen.insert(address));
        }
    }
}

#[test]
fn test_settings_layout() {
    let scheme = AddressScheme::default();
    let address = scheme.settings(Dimension::Unit);
    let expected = format!(
        "{}{}{}{}",
        hash_segment("hashblock", 6),
        hash_segment("setting", 6),
        hash_segment("unit", 6),
        hash_segment("filler", 52)
    );
    assert_eq!(address.as_str(), expected);
}

#[test]
fn test_classify_governance_addresses() {
    let scheme = AddressScheme::default();

    let settings = scheme.classify(scheme.settings(Dimension::Resource).as_str()).unwrap();
    assert_eq!(
        (settings.family, settings.dimension, settings.subtype),
        (Family::Setting, Dimension::Resource, Subtype::Settings)
    );

    let candidates = scheme
        .classify(scheme.candidates(Family::Asset, Dimension::Unit).as_str())
        .unwrap();
    assert_eq!(candidates.subtype, Subtype::Candidates);
    assert_eq!(candidates.family, Family::Asset);

    let foot = scheme.asset(Dimension::Unit, "imperial", "foot");
    let asset = scheme.classify(foot.as_str()).unwrap();
    assert_eq!(asset.subtype, Subtype::Item);
}

#[test]
fn test_foreign_namespace_is_unclassified() {
    let ours = AddressScheme::default();
    let theirs = AddressScheme::new("intkey");
    let address = theirs.settings(Dimension::Unit);

    assert!(AddressScheme::is_valid(address.as_str()));
    assert!(ours.classify(address.as_str()).is_none());
    assert_eq!(theirs.family_name(Family::Match), "intkey_match");
}
