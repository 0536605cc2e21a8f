//! Dynamic JSON fields (spec.md §9): `vector_point_ids`, `include_extensions`,
//! `exclude_patterns`, `file_type_filters`, `skip_reasons`, and
//! `last_run_metadata` are stored as serialized JSON text columns. Parsing
//! must tolerate legacy *double*-encoded values — a JSON string that itself
//! contains JSON-encoded text, left over from an older writer — by retrying
//! the decode once before falling back to the type's default.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize `value` to the JSON text stored in a ledger column.
pub fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Decode a ledger column's JSON text, tolerating one level of legacy
/// double-encoding, and falling back to `T::default()` if both attempts
/// fail (a corrupt or genuinely empty column should never panic a sync
/// run).
pub fn decode<T: DeserializeOwned + Default>(raw: &str) -> T {
    if raw.is_empty() {
        return T::default();
    }
    if let Ok(value) = serde_json::from_str::<T>(raw) {
        return value;
    }
    // Legacy double-encoding: the column itself decodes to a JSON string,
    // which must be decoded a second time.
    if let Ok(inner) = serde_json::from_str::<String>(raw) {
        if let Ok(value) = serde_json::from_str::<T>(&inner) {
            return value;
        }
    }
    T::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn round_trips_normally_encoded_value() {
        let mut set = HashSet::new();
        set.insert("rs".to_string());
        set.insert("toml".to_string());
        let encoded = encode(&set);
        let decoded: HashSet<String> = decode(&encoded);
        assert_eq!(set, decoded);
    }

    #[test]
    fn tolerates_double_encoded_value() {
        let inner = encode(&vec!["rs".to_string(), "toml".to_string()]);
        let double_encoded = encode(&inner);
        let decoded: Vec<String> = decode(&double_encoded);
        assert_eq!(decoded, vec!["rs".to_string(), "toml".to_string()]);
    }

    #[test]
    fn falls_back_to_default_on_garbage() {
        let decoded: Vec<String> = decode("not json at all {{{");
        assert!(decoded.is_empty());
    }

    #[test]
    fn empty_string_falls_back_to_default() {
        let decoded: HashSet<String> = decode("");
        assert!(decoded.is_empty());
    }
}
