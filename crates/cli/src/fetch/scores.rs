//! `vulnbase scores` — batch scoring fetch with record-granularity resume.
//!
//! Identity keys are read from an input CSV, batched against the scoring
//! API, and appended to the destination with an fsync per row. Keys already
//! present in the destination are skipped on resume. A rate-limited batch
//! is retried after a sleep, never skipped; any other failure skips that
//! batch only, leaving its keys unwritten so a later run retries them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use vulnbase_io::checkpoint::{sidecar_path, Progress};
use vulnbase_io::{load_checkpoint, AppendWriter};
use vulnbase_recon::config::BatchConfig;
use vulnbase_recon::SourceConfig;

use crate::exit_codes::{
    EXIT_DESTINATION, EXIT_FETCH_RATE_LIMIT, EXIT_INVALID_CONFIG, EXIT_PARSE,
};
use crate::fetch::common::FetchClient;
use crate::CliError;

fn scores_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

pub fn cmd_scores(config_path: PathBuf, input: PathBuf) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| scores_err(EXIT_PARSE, format!("cannot read config: {e}")))?;
    let config = SourceConfig::from_toml(&config_str)
        .map_err(|e| scores_err(EXIT_INVALID_CONFIG, e.to_string()))?;
    let Some(batch) = config.batch.clone() else {
        return Err(scores_err(EXIT_INVALID_CONFIG, "config has no [batch] section"));
    };

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let destination = base_dir.join(&config.destination);

    // Keys to score, in input order, deduplicated.
    let input_set = vulnbase_io::csv::read_record_set(&input)
        .map_err(|e| scores_err(EXIT_PARSE, e.to_string()))?;
    if input_set.resolve_field(&config.identity_field).is_none() {
        return Err(scores_err(
            EXIT_PARSE,
            format!(
                "identity field '{}' not found in {}",
                config.identity_field,
                input.display(),
            ),
        ));
    }
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    for record in &input_set.records {
        let Some(value) = record.get(&config.identity_field) else { continue };
        let value = value.trim();
        if !value.is_empty() && seen.insert(value.to_string()) {
            keys.push(value.to_string());
        }
    }

    // Resume state is rebuilt from the destination's own identity column.
    let checkpoint = load_checkpoint(&destination, &batch.response_fields[0])
        .map_err(|e| scores_err(EXIT_PARSE, e.to_string()))?;
    if checkpoint.truncated_tail {
        eprintln!(
            "warning: truncated record at end of {}, resuming from last complete row",
            destination.display(),
        );
    }
    eprintln!(
        "{} key(s) to process, {} already written",
        keys.len(),
        checkpoint.keys.len(),
    );

    let mut writer = AppendWriter::open(&destination, &batch.response_fields)
        .map_err(|e| scores_err(EXIT_DESTINATION, e.to_string()))?;
    let client = FetchClient::new(&config.name, Duration::from_millis(batch.throttle_ms));

    let stats = fetch_scores(
        &client,
        &batch,
        &keys,
        checkpoint.keys,
        &mut writer,
        &sidecar_path(&destination),
    )?;

    eprintln!(
        "done: {} written, {} batch(es) skipped — {}",
        stats.written,
        stats.skipped_batches,
        destination.display(),
    );
    Ok(())
}

// ── Batch loop ──────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct ScoreStats {
    pub written: u64,
    pub skipped_batches: u32,
}

pub(crate) fn fetch_scores(
    client: &FetchClient,
    batch: &BatchConfig,
    keys: &[String],
    mut done: HashSet<String>,
    writer: &mut AppendWriter,
    progress_path: &Path,
) -> Result<ScoreStats, CliError> {
    let mut stats = ScoreStats { written: 0, skipped_batches: 0 };
    let mut consecutive_rate_limits = 0u32;
    let mut position = 0u64;

    for chunk in keys.chunks(batch.batch_size) {
        position += chunk.len() as u64;
        let pending: Vec<&str> =
            chunk.iter().map(String::as_str).filter(|k| !done.contains(*k)).collect();
        if pending.is_empty() {
            continue;
        }

        let url = format!("{}?{}={}", batch.api_url, batch.query_param, pending.join(","));

        loop {
            let resp = match client.get(&url) {
                Ok(resp) => resp,
                Err(err) => {
                    // Keys stay out of the checkpoint; a later run retries.
                    eprintln!("warning: {} — skipping batch", err.message);
                    stats.skipped_batches += 1;
                    consecutive_rate_limits = 0;
                    break;
                }
            };

            if resp.status == 429 {
                consecutive_rate_limits += 1;
                if consecutive_rate_limits > batch.max_rate_limit_retries {
                    return Err(CliError {
                        code: EXIT_FETCH_RATE_LIMIT,
                        message: format!(
                            "rate limited {consecutive_rate_limits} times in a row, giving up",
                        ),
                        hint: Some(
                            "re-run later; already-written keys are skipped on resume".into(),
                        ),
                    });
                }
                let wait = resp.retry_after.unwrap_or(batch.rate_limit_sleep_secs);
                eprintln!("warning: rate limited, sleeping {wait}s before retrying this batch");
                thread::sleep(Duration::from_secs(wait));
                continue; // same batch, never skipped
            }
            consecutive_rate_limits = 0;

            if !resp.is_success() {
                eprintln!("warning: HTTP {} — skipping batch", resp.status);
                stats.skipped_batches += 1;
                break;
            }

            let items = match parse_items(&resp.body, batch) {
                Ok(items) => items,
                Err(detail) => {
                    eprintln!("warning: {detail} — skipping batch");
                    stats.skipped_batches += 1;
                    break;
                }
            };

            for values in items {
                let key = values[0].trim().to_string();
                if key.is_empty() || done.contains(&key) {
                    continue;
                }
                let row: Vec<&str> = values.iter().map(String::as_str).collect();
                writer
                    .append(&row)
                    .map_err(|e| scores_err(EXIT_DESTINATION, e.to_string()))?;
                done.insert(key);
                stats.written += 1;
            }

            Progress { position, written: writer.written() }
                .save(progress_path)
                .map_err(|e| scores_err(EXIT_DESTINATION, e.to_string()))?;
            break;
        }
    }

    Ok(stats)
}

/// Extract the configured fields from each item of the response array.
/// The first field is the identity key.
fn parse_items(body: &str, batch: &BatchConfig) -> Result<Vec<Vec<String>>, String> {
    let json: serde_json::Value = serde_json::from_str(body.trim_start_matches('\u{feff}'))
        .map_err(|e| format!("bad JSON response: {e}"))?;
    let items = json
        .get(&batch.response_root)
        .and_then(|v| v.as_array())
        .ok_or_else(|| format!("response missing '{}' array", batch.response_root))?;

    Ok(items
        .iter()
        .map(|item| batch.response_fields.iter().map(|f| field_text(item, f)).collect())
        .collect())
}

fn field_text(item: &serde_json::Value, field: &str) -> String {
    match item.get(field) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(v) => v.to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tempfile::tempdir;

    fn batch_config(api_url: String) -> BatchConfig {
        BatchConfig {
            api_url,
            query_param: "cve".into(),
            response_root: "data".into(),
            response_fields: vec![
                "cve".into(),
                "epss".into(),
                "percentile".into(),
                "date".into(),
            ],
            batch_size: 2,
            throttle_ms: 0,
            rate_limit_sleep_secs: 0,
            max_rate_limit_retries: 2,
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn writes_scores_and_updates_progress() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/epss");
            then.status(200).body(
                r#"{"data":[
                    {"cve":"CVE-2024-1","epss":"0.5","percentile":"0.9","date":"2026-08-05"},
                    {"cve":"CVE-2024-2","epss":"0.1","percentile":"0.4","date":"2026-08-05"}
                ]}"#,
            );
        });

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epss_DB.csv");
        let batch = batch_config(server.url("/epss"));
        let mut writer = AppendWriter::open(&dest, &batch.response_fields).unwrap();
        let client = FetchClient::new("epss", Duration::ZERO);
        let progress = sidecar_path(&dest);

        let stats = fetch_scores(
            &client,
            &batch,
            &keys(&["CVE-2024-1", "CVE-2024-2"]),
            HashSet::new(),
            &mut writer,
            &progress,
        )
        .unwrap();

        assert_eq!(stats.written, 2);
        assert_eq!(stats.skipped_batches, 0);
        mock.assert();

        let content = std::fs::read_to_string(&dest).unwrap();
        assert!(content.starts_with("cve,epss,percentile,date\n"));
        assert!(content.contains("CVE-2024-1,0.5,0.9,2026-08-05"));

        let saved = Progress::load(&progress);
        assert_eq!(saved.written, 2);
        assert_eq!(saved.position, 2);
    }

    #[test]
    fn already_written_keys_are_not_refetched() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/epss");
            then.status(200).body(r#"{"data":[]}"#);
        });

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epss_DB.csv");
        let batch = batch_config(server.url("/epss"));
        let mut writer = AppendWriter::open(&dest, &batch.response_fields).unwrap();
        let client = FetchClient::new("epss", Duration::ZERO);

        let done: HashSet<String> =
            ["CVE-2024-1", "CVE-2024-2"].iter().map(|s| s.to_string()).collect();
        let stats = fetch_scores(
            &client,
            &batch,
            &keys(&["CVE-2024-1", "CVE-2024-2"]),
            done,
            &mut writer,
            &sidecar_path(&dest),
        )
        .unwrap();

        assert_eq!(stats.written, 0);
        assert_eq!(mock.hits(), 0, "fully-checkpointed batch must not hit the API");
    }

    #[test]
    fn resume_reattempts_only_unwritten_keys() {
        let server = MockServer::start();
        // Only the keys missing from the checkpoint may reach the API.
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/epss")
                .query_param("cve", "CVE-2024-3,CVE-2024-4");
            then.status(200).body(
                r#"{"data":[
                    {"cve":"CVE-2024-3","epss":"0.2","percentile":"0.6","date":"2026-08-05"},
                    {"cve":"CVE-2024-4","epss":"0.3","percentile":"0.7","date":"2026-08-05"}
                ]}"#,
            );
        });

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epss_DB.csv");
        // Prior run wrote A and B, then crashed before C.
        std::fs::write(
            &dest,
            "cve,epss,percentile,date\nCVE-2024-1,0.5,0.9,2026-08-05\nCVE-2024-2,0.1,0.4,2026-08-05\n",
        )
        .unwrap();

        let batch = batch_config(server.url("/epss"));
        let done = load_checkpoint(&dest, "cve").unwrap().keys;
        let mut writer = AppendWriter::open(&dest, &batch.response_fields).unwrap();
        let client = FetchClient::new("epss", Duration::ZERO);

        let stats = fetch_scores(
            &client,
            &batch,
            &keys(&["CVE-2024-1", "CVE-2024-2", "CVE-2024-3", "CVE-2024-4"]),
            done,
            &mut writer,
            &sidecar_path(&dest),
        )
        .unwrap();

        assert_eq!(stats.written, 2);
        mock.assert_hits(1);

        // No duplicates: every key appears exactly once.
        drop(writer);
        let content = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(content.matches("CVE-2024-1").count(), 1);
        assert_eq!(content.matches("CVE-2024-3").count(), 1);
        let state = load_checkpoint(&dest, "cve").unwrap();
        assert_eq!(state.keys.len(), 4);
    }

    #[test]
    fn server_error_skips_batch_and_leaves_keys_unwritten() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/epss");
            then.status(500);
        });

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epss_DB.csv");
        let batch = batch_config(server.url("/epss"));
        let mut writer = AppendWriter::open(&dest, &batch.response_fields).unwrap();
        let client = FetchClient::new("epss", Duration::ZERO);

        let stats = fetch_scores(
            &client,
            &batch,
            &keys(&["CVE-2024-1"]),
            HashSet::new(),
            &mut writer,
            &sidecar_path(&dest),
        )
        .unwrap();

        assert_eq!(stats.written, 0);
        assert_eq!(stats.skipped_batches, 1);

        // Nothing beyond the header: the keys remain absent so a later run
        // retries them.
        drop(writer);
        let state = load_checkpoint(&dest, "cve").unwrap();
        assert!(state.keys.is_empty());
    }

    #[test]
    fn persistent_rate_limit_is_fatal_after_budget() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/epss");
            then.status(429);
        });

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epss_DB.csv");
        let batch = batch_config(server.url("/epss"));
        let mut writer = AppendWriter::open(&dest, &batch.response_fields).unwrap();
        let client = FetchClient::new("epss", Duration::ZERO);

        let err = fetch_scores(
            &client,
            &batch,
            &keys(&["CVE-2024-1"]),
            HashSet::new(),
            &mut writer,
            &sidecar_path(&dest),
        )
        .unwrap_err();

        assert_eq!(err.code, EXIT_FETCH_RATE_LIMIT);
        // Initial attempt + max_rate_limit_retries retries of the same batch.
        assert_eq!(mock.hits(), 3);
    }

    #[test]
    fn malformed_response_skips_batch() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/epss");
            then.status(200).body("not json at all");
        });

        let dir = tempdir().unwrap();
        let dest = dir.path().join("epss_DB.csv");
        let batch = batch_config(server.url("/epss"));
        let mut writer = AppendWriter::open(&dest, &batch.response_fields).unwrap();
        let client = FetchClient::new("epss", Duration::ZERO);

        let stats = fetch_scores(
            &client,
            &batch,
            &keys(&["CVE-2024-1"]),
            HashSet::new(),
            &mut writer,
            &sidecar_path(&dest),
        )
        .unwrap();

        assert_eq!(stats.written, 0);
        assert_eq!(stats.skipped_batches, 1);
    }
}
