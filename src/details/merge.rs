//! Deep merge of a delta onto a base details mapping
//!
//! Mappings recurse; everything else, sequences included, replaces the base
//! value wholesale. Keys only present in the base survive unchanged.

use super::value::{DetailValue, Details};

/// Merge `delta` onto a copy of `base`.
///
/// Neither input is modified, so the snapshot `base` came from stays intact.
pub fn merge(base: &Details, delta: &Details) -> Details {
    let mut result = base.clone();
    merge_into(&mut result, delta);
    result
}

/// Merge `delta` onto `target` in place.
pub fn merge_into(target: &mut Details, delta: &Details) {
    for (key, value) in delta {
        match value {
            DetailValue::Object(sub_delta) => {
                let slot = target
                    .entry(key.clone())
                    .or_insert_with(|| DetailValue::Object(Details::new()));
                // A scalar or sequence in the base is treated as absent.
                if !slot.is_object() {
                    *slot = DetailValue::Object(Details::new());
                }
                if let DetailValue::Object(existing) = slot {
                    merge_into(existing, sub_delta);
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::details_from_json;
    use serde_json::json;

    fn d(value: serde_json::Value) -> Details {
        details_from_json(value).unwrap()
    }

    #[test]
    fn test_empty_delta_is_identity() {
        let base = d(json!({"rent": 100, "term": {"months": 12}}));
        assert_eq!(merge(&base, &Details::new()), base);
    }

    #[test]
    fn test_base_is_not_mutated() {
        let base = d(json!({"rent": 100, "term": {"months": 12, "start": "2024-01-01"}}));
        let before = base.clone();
        let delta = d(json!({"rent": 120, "term": {"months": 24}}));

        let merged = merge(&base, &delta);

        assert_eq!(base, before);
        assert_ne!(merged, base);
    }

    #[test]
    fn test_sequences_are_replaced_not_concatenated() {
        let merged = merge(&d(json!({"a": [1, 2]})), &d(json!({"a": [3]})));
        assert_eq!(merged, d(json!({"a": [3]})));
    }

    #[test]
    fn test_nested_mappings_recurse() {
        let base = d(json!({"term": {"months": 12, "start": "2024-01-01"}, "rent": 100}));
        let delta = d(json!({"term": {"months": 24}}));

        let merged = merge(&base, &delta);
        assert_eq!(
            merged,
            d(json!({"term": {"months": 24, "start": "2024-01-01"}, "rent": 100}))
        );
    }

    #[test]
    fn test_missing_mapping_is_created() {
        let merged = merge(&d(json!({"rent": 100})), &d(json!({"term": {"months": 12}})));
        assert_eq!(merged, d(json!({"rent": 100, "term": {"months": 12}})));
    }

    #[test]
    fn test_mapping_over_scalar_replaces_scalar() {
        let merged = merge(&d(json!({"term": 12})), &d(json!({"term": {"months": 12}})));
        assert_eq!(merged, d(json!({"term": {"months": 12}})));
    }

    #[test]
    fn test_scalar_over_mapping_replaces_mapping() {
        let merged = merge(&d(json!({"term": {"months": 12}})), &d(json!({"term": "month-to-month"})));
        assert_eq!(merged, d(json!({"term": "month-to-month"})));
    }

    #[test]
    fn test_null_in_delta_replaces() {
        let merged = merge(&d(json!({"notes": "x"})), &d(json!({"notes": null})));
        assert_eq!(merged["notes"], DetailValue::Null);
    }

    #[test]
    fn test_rent_increase_with_new_term() {
        let base = d(json!({"rent": 100}));
        let delta = d(json!({"rent": 120, "term": {"months": 12}}));
        assert_eq!(
            merge(&base, &delta),
            d(json!({"rent": 120, "term": {"months": 12}}))
        );
    }
}
