use std::collections::BTreeMap;

use crate::{config::METADATA_MAX_LEN, error::MetadataError};

// Free-form document attached to an entity. Keys are ordered so that
// serialized forms are stable across encode/decode cycles.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// Caps are checked on the key and on the rendered value before anything
// reaches the document store
pub fn validate_metadata(metadata: &Metadata) -> Result<(), MetadataError> {
    for (key, value) in metadata {
        if key.chars().count() > METADATA_MAX_LEN {
            return Err(MetadataError::KeyTooLong(key.clone()));
        }
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if rendered.chars().count() > METADATA_MAX_LEN {
            return Err(MetadataError::ValueTooLong(key.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_values_at_the_cap() {
        let mut metadata = Metadata::new();
        metadata.insert("k".repeat(METADATA_MAX_LEN), serde_json::json!("v".repeat(METADATA_MAX_LEN)));
        assert!(validate_metadata(&metadata).is_ok());
    }

    #[test]
    fn rejects_long_keys_and_values() {
        let mut metadata = Metadata::new();
        metadata.insert("k".repeat(METADATA_MAX_LEN + 1), serde_json::json!(1));
        assert_eq!(
            validate_metadata(&metadata),
            Err(MetadataError::KeyTooLong("k".repeat(METADATA_MAX_LEN + 1)))
        );

        let mut metadata = Metadata::new();
        metadata.insert("note".to_string(), serde_json::json!("v".repeat(METADATA_MAX_LEN + 1)));
        assert_eq!(validate_metadata(&metadata), Err(MetadataError::ValueTooLong("note".to_string())));
    }

    #[test]
    fn non_string_values_are_measured_rendered() {
        let mut metadata = Metadata::new();
        metadata.insert("n".to_string(), serde_json::json!(12345));
        assert!(validate_metadata(&metadata).is_ok());
    }
}
