//! `vulnbase convert` — flatten a JSON feed into a CSV record set.
//!
//! Upstream feeds disagree on shape: NVD wraps records in a
//! `vulnerabilities` array of `{"cve": {...}}` items, MISP galaxies put
//! them under `values`, ransomware trackers publish a bare list. The
//! flattening is the same everywhere: nested objects become `parent_child`
//! columns, arrays join with `;`.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use vulnbase_recon::model::{canonical_field, Record, RecordSet};

use crate::exit_codes::{EXIT_DESTINATION, EXIT_PARSE};
use crate::fetch::common::FetchClient;
use crate::CliError;

fn convert_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

/// Wrapper keys probed, in order, when the record array is not top-level.
const ROOT_CANDIDATES: &[&str] = &["vulnerabilities", "cve_items", "CVE_Items", "values", "data"];

pub fn cmd_convert(
    input: Option<PathBuf>,
    url: Option<String>,
    out: PathBuf,
    root: Option<String>,
) -> Result<(), CliError> {
    let body = match (&input, &url) {
        (Some(path), _) => vulnbase_io::csv::read_file_as_utf8(path)
            .map_err(|e| convert_err(EXIT_PARSE, e.to_string()))?,
        (None, Some(url)) => {
            let client = FetchClient::new("convert", Duration::ZERO);
            client.download_text(url)?
        }
        (None, None) => {
            return Err(CliError::usage("no feed: pass a file or --url"));
        }
    };

    let json: Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| convert_err(EXIT_PARSE, format!("bad JSON feed: {e}")))?;

    let items = locate_records(&json, root.as_deref())
        .map_err(|detail| convert_err(EXIT_PARSE, detail))?;

    let (set, skipped) = flatten_records(&items);
    vulnbase_io::replace_atomic(&set, &out)
        .map_err(|e| convert_err(EXIT_DESTINATION, e.to_string()))?;

    eprintln!(
        "converted {} record(s) → {} ({} non-object item(s) skipped)",
        set.len(),
        out.display(),
        skipped,
    );
    Ok(())
}

// ── Record array location ───────────────────────────────────────────

fn locate_records(json: &Value, root: Option<&str>) -> Result<Vec<Value>, String> {
    let array = match (root, json) {
        (Some(key), _) => json
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| format!("no '{key}' array in the feed"))?,
        (None, Value::Array(items)) => items.clone(),
        (None, Value::Object(_)) => ROOT_CANDIDATES
            .iter()
            .find_map(|key| json.get(*key).and_then(Value::as_array))
            .cloned()
            .ok_or_else(|| {
                format!(
                    "no record array found (tried {}); pass --root",
                    ROOT_CANDIDATES.join(", "),
                )
            })?,
        (None, _) => return Err("feed must be a JSON object or array".into()),
    };

    // NVD wraps each record in {"cve": {...}}; unwrap when every first-item
    // check says so.
    if array.first().is_some_and(|v| v.get("cve").is_some_and(Value::is_object)) {
        return Ok(array
            .iter()
            .map(|v| v.get("cve").cloned().unwrap_or(Value::Null))
            .collect());
    }
    Ok(array)
}

// ── Flattening ──────────────────────────────────────────────────────

fn flatten_records(items: &[Value]) -> (RecordSet, usize) {
    let mut header: Vec<String> = Vec::new();
    let mut rows: Vec<Record> = Vec::new();
    let mut skipped = 0;

    for item in items {
        let Some(obj) = item.as_object() else {
            skipped += 1;
            continue;
        };
        let mut record = Record::new();
        for (name, value) in flatten_object("", obj) {
            let wanted = canonical_field(&name);
            if !header.iter().any(|h| canonical_field(h) == wanted) {
                header.push(name.clone());
            }
            record.set(&name, value);
        }
        rows.push(record);
    }

    let mut set = RecordSet::new(header);
    for row in rows {
        set.push(row);
    }
    (set, skipped)
}

fn flatten_object(prefix: &str, obj: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (key, value) in obj {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}_{key}")
        };
        match value {
            Value::Object(nested) => out.extend(flatten_object(&name, nested)),
            Value::Array(items) => {
                let cell = if canonical_field(&name) == "descriptions" {
                    english_description(items)
                } else {
                    None
                };
                let cell = cell.unwrap_or_else(|| {
                    items.iter().map(cell_text).collect::<Vec<_>>().join(";")
                });
                out.push((name, cell));
            }
            other => out.push((name, cell_text(other))),
        }
    }
    out
}

/// NVD-style `descriptions` lists carry one entry per language; only the
/// English one is kept.
fn english_description(items: &[Value]) -> Option<String> {
    items.iter().find_map(|item| {
        let obj = item.as_object()?;
        if obj.get("lang").and_then(Value::as_str) == Some("en") {
            Some(
                obj.get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )
        } else {
            None
        }
    })
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn convert_str(feed: &str, root: Option<&str>) -> (RecordSet, usize) {
        let json: Value = serde_json::from_str(feed).unwrap();
        let items = locate_records(&json, root).unwrap();
        flatten_records(&items)
    }

    #[test]
    fn top_level_list_flattens() {
        let (set, skipped) = convert_str(
            r#"[{"name":"lockbit","profile":"https://a"},{"name":"conti"}]"#,
            None,
        );
        assert_eq!(skipped, 0);
        assert_eq!(set.header, vec!["name", "profile"]);
        assert_eq!(set.records[0].get("name"), Some("lockbit"));
        assert_eq!(set.records[1].get("name"), Some("conti"));
    }

    #[test]
    fn nvd_wrapper_is_unwrapped() {
        let (set, _) = convert_str(
            r#"{"vulnerabilities":[
                {"cve":{"id":"CVE-2024-1","sourceIdentifier":"nvd"}},
                {"cve":{"id":"CVE-2024-2","sourceIdentifier":"nvd"}}
            ]}"#,
            None,
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.records[0].get("id"), Some("CVE-2024-1"));
    }

    #[test]
    fn nested_objects_flatten_with_underscores() {
        let (set, _) = convert_str(
            r#"[{"id":"X","meta":{"country":"RU","refs":{"primary":"https://a"}}}]"#,
            None,
        );
        assert_eq!(set.records[0].get("meta_country"), Some("RU"));
        assert_eq!(set.records[0].get("meta_refs_primary"), Some("https://a"));
    }

    #[test]
    fn arrays_join_with_semicolons() {
        let (set, _) = convert_str(
            r#"[{"id":"X","aliases":["a","b","c"],"scores":[1,2]}]"#,
            None,
        );
        assert_eq!(set.records[0].get("aliases"), Some("a;b;c"));
        assert_eq!(set.records[0].get("scores"), Some("1;2"));
    }

    #[test]
    fn descriptions_reduce_to_english() {
        let (set, _) = convert_str(
            r#"{"vulnerabilities":[{"cve":{
                "id":"CVE-2024-1",
                "descriptions":[
                    {"lang":"es","value":"hola"},
                    {"lang":"en","value":"buffer overflow"}
                ]}}]}"#,
            None,
        );
        assert_eq!(set.records[0].get("descriptions"), Some("buffer overflow"));
    }

    #[test]
    fn explicit_root_and_misp_values() {
        let (set, _) = convert_str(
            r#"{"values":[{"value":"APT1","meta":{"country":"CN"}}]}"#,
            Some("values"),
        );
        assert_eq!(set.records[0].get("value"), Some("APT1"));
        assert_eq!(set.records[0].get("meta_country"), Some("CN"));
    }

    #[test]
    fn non_object_items_are_skipped_and_counted() {
        let (set, skipped) = convert_str(r#"[{"id":"A"},"stray",42]"#, None);
        assert_eq!(set.len(), 1);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn unlocatable_root_is_an_error() {
        let json: Value = serde_json::from_str(r#"{"other":{"x":1}}"#).unwrap();
        let err = locate_records(&json, None).unwrap_err();
        assert!(err.contains("--root"));
    }

    #[test]
    fn convert_writes_csv_atomically() {
        let dir = tempdir().unwrap();
        let feed = dir.path().join("groups.json");
        fs::write(&feed, r#"[{"name":"lockbit","captcha":false}]"#).unwrap();
        let out = dir.path().join("ransomwatch_DB.csv");

        cmd_convert(Some(feed), None, out.clone(), None).unwrap();

        let content = fs::read_to_string(&out).unwrap();
        assert_eq!(content, "name,captcha\nlockbit,false\n");
        assert!(!out.with_file_name("ransomwatch_DB.csv.part").exists());
    }
}
