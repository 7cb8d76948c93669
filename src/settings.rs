//! Import configuration: request params first, then the workspace
//! `setup.contentImport` section, then built-in defaults.

use crate::db;
use crate::matching::Similarity;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const SECTION_KEY: &str = "setup.contentImport";

const DEFAULT_LEGACY_ENCODINGS: &[&str] = &["windows-1252", "iso-8859-15"];

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub similarity: Similarity,
    /// Tried in order when the bytes are not valid UTF-8.
    pub legacy_encodings: Vec<String>,
    pub default_period: Option<i64>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            similarity: Similarity::CharacterOverlap,
            legacy_encodings: DEFAULT_LEGACY_ENCODINGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_period: None,
        }
    }
}

pub fn load_section(conn: &Connection) -> Value {
    db::settings_get_json(conn, SECTION_KEY)
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .map(Value::Object)
        .unwrap_or_else(|| json!({}))
}

impl ImportSettings {
    /// Resolves settings for one request. Unknown values are rejected rather
    /// than silently replaced with a default.
    pub fn resolve(conn: &Connection, params: &Value) -> Result<Self, String> {
        let section = load_section(conn);
        let mut out = ImportSettings::default();

        let similarity = params
            .get("similarity")
            .and_then(|v| v.as_str())
            .or_else(|| section.get("similarity").and_then(|v| v.as_str()));
        if let Some(name) = similarity {
            out.similarity = Similarity::parse(name)
                .ok_or_else(|| "similarity must be one of: overlap, jaro_winkler".to_string())?;
        }

        if let Some(list) = section.get("legacyEncodings").and_then(|v| v.as_array()) {
            let labels: Vec<String> = list
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            for label in &labels {
                if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                    return Err(format!("unknown legacy encoding: {}", label));
                }
            }
            if !labels.is_empty() {
                out.legacy_encodings = labels;
            }
        }

        out.default_period = section.get("period").and_then(|v| v.as_i64());
        Ok(out)
    }
}

const MAX_PERIOD: i64 = 12;

/// The stored section with defaults filled in, as shown to the caller.
pub fn effective_section(conn: &Connection) -> Value {
    let defaults = ImportSettings::default();
    let mut out = json!({
        "similarity": defaults.similarity.as_str(),
        "legacyEncodings": defaults.legacy_encodings,
        "period": Value::Null,
    });
    if let (Some(obj), Value::Object(saved)) = (out.as_object_mut(), load_section(conn)) {
        for (k, v) in saved {
            obj.insert(k, v);
        }
    }
    out
}

/// Validates `patch` field by field and applies it onto `current`.
pub fn merge_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let Some(obj) = current.as_object_mut() else {
        return Err("section must be an object".into());
    };
    for (k, v) in patch {
        match k.as_str() {
            "similarity" => {
                let name = v.as_str().ok_or("similarity must be a string")?;
                let parsed = Similarity::parse(name)
                    .ok_or("similarity must be one of: overlap, jaro_winkler")?;
                obj.insert(k.clone(), Value::String(parsed.as_str().to_string()));
            }
            "legacyEncodings" => {
                let list = v.as_array().ok_or("legacyEncodings must be an array")?;
                let mut labels = Vec::with_capacity(list.len());
                for item in list {
                    let label = item
                        .as_str()
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                        .ok_or("legacyEncodings entries must be non-empty strings")?;
                    if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                        return Err(format!("unknown legacy encoding: {}", label));
                    }
                    labels.push(Value::String(label.to_string()));
                }
                obj.insert(k.clone(), Value::Array(labels));
            }
            "period" => {
                if v.is_null() {
                    obj.insert(k.clone(), Value::Null);
                    continue;
                }
                let n = v
                    .as_i64()
                    .filter(|n| (1..=MAX_PERIOD).contains(n))
                    .ok_or_else(|| format!("period must be between 1 and {}", MAX_PERIOD))?;
                obj.insert(k.clone(), Value::from(n));
            }
            _ => return Err(format!("unknown contentImport field: {}", k)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_section() {
        let conn = db::open_in_memory().expect("open");
        let s = ImportSettings::resolve(&conn, &json!({})).expect("resolve");
        assert_eq!(s.similarity, Similarity::CharacterOverlap);
        assert_eq!(s.legacy_encodings, vec!["windows-1252", "iso-8859-15"]);
        assert_eq!(s.default_period, None);
    }

    #[test]
    fn params_override_workspace_section() {
        let conn = db::open_in_memory().expect("open");
        db::settings_set_json(
            &conn,
            SECTION_KEY,
            &json!({
                "similarity": "jaro_winkler",
                "legacyEncodings": ["iso-8859-1"],
                "period": 2
            }),
        )
        .expect("set");
        let from_section = ImportSettings::resolve(&conn, &json!({})).expect("resolve");
        assert_eq!(from_section.similarity, Similarity::JaroWinkler);
        assert_eq!(from_section.legacy_encodings, vec!["iso-8859-1"]);
        assert_eq!(from_section.default_period, Some(2));

        let from_params =
            ImportSettings::resolve(&conn, &json!({ "similarity": "overlap" })).expect("resolve");
        assert_eq!(from_params.similarity, Similarity::CharacterOverlap);
    }

    #[test]
    fn rejects_unknown_values() {
        let conn = db::open_in_memory().expect("open");
        assert!(ImportSettings::resolve(&conn, &json!({ "similarity": "soundex" })).is_err());
        db::settings_set_json(&conn, SECTION_KEY, &json!({ "legacyEncodings": ["klingon-8"] }))
            .expect("set");
        assert!(ImportSettings::resolve(&conn, &json!({})).is_err());
    }

    #[test]
    fn patch_is_validated_per_field() {
        let conn = db::open_in_memory().expect("open");
        let mut current = effective_section(&conn);
        assert_eq!(current["similarity"], "overlap");
        assert!(current["period"].is_null());

        let patch = json!({ "similarity": "JARO_WINKLER", "period": 2 });
        merge_patch(&mut current, patch.as_object().expect("obj")).expect("merge");
        assert_eq!(current["similarity"], "jaro_winkler");
        assert_eq!(current["period"], 2);

        for bad in [
            json!({ "period": 0 }),
            json!({ "legacyEncodings": ["klingon-8"] }),
            json!({ "legacyEncodings": "latin1" }),
            json!({ "colour": "red" }),
        ] {
            assert!(merge_patch(&mut current, bad.as_object().expect("obj")).is_err(), "{bad}");
        }
    }
}
