//! Property-based tests for field-level merging.
//!
//! Staged provider results must merge to the same record whatever order
//! the providers answered in, the earliest-ranked provider must win every
//! field it supplies, and no merge may ever null a stored field.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rust_decimal::Decimal;
use shelfmark_core::catalog::{SeriesKey, VolumeRecord};
use shelfmark_core::cache::SeriesWrite;
use shelfmark_core::resolver::{merge_staged, StagedResults};
use shelfmark_metadata::{Field, ProviderResult, VolumeFields};

const PROVIDERS: [&str; 4] = ["GOOGLE_BOOKS", "MANGADEX", "JIKAN", "WIKIPEDIA"];

// =============================================================================
// Generators
// =============================================================================

/// A sparse field set; every value carries `tag` so its origin is visible.
fn arb_fields(tag: &'static str) -> impl Strategy<Value = VolumeFields> {
    proptest::collection::vec(any::<bool>(), Field::COUNT).prop_map(move |present| {
        let mut fields = VolumeFields::default();
        for (field, keep) in Field::ALL.into_iter().zip(present) {
            if !keep {
                continue;
            }
            match field {
                Field::Title => fields.title = Some(format!("{} title", tag)),
                Field::Isbn => fields.isbn = Some(format!("978{:010}", tag.len())),
                Field::Publisher => fields.publisher = Some(format!("{} press", tag)),
                Field::CopyrightYear => fields.copyright_year = Some(2000 + tag.len() as i32),
                Field::Description => fields.description = Some(format!("{} blurb", tag)),
                Field::CoverUrl => {
                    fields.cover_url = Some(format!("https://covers.example.com/{}.jpg", tag))
                }
                Field::Msrp => fields.msrp = Some(Decimal::new(tag.len() as i64 * 100 + 99, 2)),
            }
        }
        fields
    })
}

/// One staged result set per provider, for volumes 1..=3, in arrival order.
fn arb_staged() -> impl Strategy<Value = Vec<StagedResults>> {
    let per_provider = PROVIDERS
        .iter()
        .enumerate()
        .map(|(rank, id)| {
            let id: &'static str = *id;
            proptest::collection::vec(arb_fields(id), 3).prop_map(move |volumes| StagedResults {
                rank,
                results: volumes
                    .into_iter()
                    .enumerate()
                    .map(|(i, fields)| ProviderResult::new(id, i as u32 + 1, fields))
                    .collect(),
            })
        })
        .collect::<Vec<_>>();
    per_provider.prop_shuffle()
}

fn arb_base() -> impl Strategy<Value = BTreeMap<u32, VolumeRecord>> {
    proptest::collection::vec(arb_fields("CACHE"), 3).prop_map(|volumes| {
        let key = SeriesKey::normalize("Fullmetal Alchemist");
        volumes
            .into_iter()
            .enumerate()
            .map(|(i, fields)| {
                let number = i as u32 + 1;
                let mut record = VolumeRecord::new(key.clone(), number);
                record.fields = fields;
                (number, record)
            })
            .collect()
    })
}

fn field_values(records: &BTreeMap<u32, VolumeRecord>) -> Vec<(u32, VolumeFields)> {
    records
        .iter()
        .map(|(n, r)| (*n, r.fields.clone()))
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_merge_is_independent_of_arrival_order(
        base in arb_base(),
        (staged, reordered) in arb_staged().prop_flat_map(|s| (Just(s.clone()), Just(s).prop_shuffle())),
    ) {
        let in_order = merge_staged(&base, &staged);
        let out_of_order = merge_staged(&base, &reordered);
        prop_assert_eq!(field_values(&in_order), field_values(&out_of_order));
    }

    #[test]
    fn prop_earliest_rank_wins_every_field(base in arb_base(), staged in arb_staged()) {
        let merged = merge_staged(&base, &staged);

        for (number, record) in &merged {
            let cached = &base[number];
            for field in Field::ALL {
                let expected_source = if cached.fields.has(field) {
                    None
                } else {
                    staged
                        .iter()
                        .filter(|s| s.results.iter().any(|r| r.volume == *number && r.fields.has(field)))
                        .min_by_key(|s| s.rank)
                        .map(|s| PROVIDERS[s.rank])
                };

                match expected_source {
                    None if cached.fields.has(field) => {
                        prop_assert!(record.fields.has(field));
                        prop_assert!(!record.provenance.contains_key(&field));
                    }
                    None => prop_assert!(!record.fields.has(field)),
                    Some(id) => {
                        prop_assert_eq!(
                            record.provenance.get(&field).map(|p| p.source.as_str()),
                            Some(id)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn prop_merge_never_loses_stored_fields(base in arb_base(), staged in arb_staged()) {
        let merged = merge_staged(&base, &staged);
        for (number, record) in &merged {
            let before = base[number].fields.filled_count();
            prop_assert!(record.fields.filled_count() >= before);
            prop_assert!((0.0..=1.0).contains(&record.completeness()));
        }
    }

    #[test]
    fn prop_disjoint_writes_commute(first in arb_fields("FIRST")) {
        let key = SeriesKey::normalize("Monster");
        let mut second = VolumeFields {
            title: Some("SECOND title".to_string()),
            publisher: Some("SECOND press".to_string()),
            ..Default::default()
        };
        second.retain(&first.missing());

        let write = |fields: &VolumeFields| {
            let mut record = VolumeRecord::new(key.clone(), 1);
            record.fields = fields.clone();
            SeriesWrite::new(key.clone(), "Monster", vec![record])
        };
        let (a, b) = (write(&first), write(&second));

        let mut forward = a.empty_entry();
        a.apply_to(&mut forward);
        b.apply_to(&mut forward);

        let mut backward = b.empty_entry();
        b.apply_to(&mut backward);
        a.apply_to(&mut backward);

        prop_assert_eq!(&forward.volumes[&1].fields, &backward.volumes[&1].fields);
    }
}
