//! `vulnbase update` — reconcile a fresh snapshot into a base database.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use vulnbase_recon::report::ChangeKind;
use vulnbase_recon::{reconcile, RecordSet, SourceConfig};

use crate::exit_codes::{
    EXIT_DESTINATION, EXIT_IDENTITY, EXIT_INVALID_CONFIG, EXIT_PARSE,
};
use crate::fetch::common::FetchClient;
use crate::CliError;

fn update_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

// ── Report output ───────────────────────────────────────────────────

#[derive(Serialize)]
struct UpdateReport {
    meta: RunMeta,
    summary: vulnbase_recon::report::ReconcileSummary,
    added: Vec<String>,
    updated: Vec<String>,
}

#[derive(Serialize)]
struct RunMeta {
    source: String,
    mode: String,
    engine_version: String,
    run_at: String,
}

// ── Commands ────────────────────────────────────────────────────────

pub fn cmd_update(
    config_path: PathBuf,
    snapshot: Option<PathBuf>,
    url: Option<String>,
    json: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| update_err(EXIT_PARSE, format!("cannot read config: {e}")))?;
    let config = SourceConfig::from_toml(&config_str)
        .map_err(|e| update_err(EXIT_INVALID_CONFIG, e.to_string()))?;

    // Resolve paths relative to the config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let destination = base_dir.join(&config.destination);

    // Acquire the incoming set up front; the engine itself never touches
    // the network or the filesystem.
    let incoming = match (&snapshot, url.as_deref().or(config.url.as_deref())) {
        (Some(path), _) => vulnbase_io::csv::read_record_set(path)
            .map_err(|e| update_err(EXIT_PARSE, e.to_string()))?,
        (None, Some(url)) => {
            let client = FetchClient::new(&config.name, Duration::ZERO);
            let body = client.download_text(url)?;
            vulnbase_io::csv::parse_record_set(&body).map_err(|e| {
                update_err(EXIT_PARSE, format!("cannot parse snapshot from {url}: {e}"))
            })?
        }
        (None, None) => {
            return Err(CliError::usage(
                "no snapshot: pass --snapshot or --url (or set url in the config)",
            ));
        }
    };

    let baseline = if destination.exists() {
        vulnbase_io::csv::read_record_set(&destination)
            .map_err(|e| update_err(EXIT_PARSE, e.to_string()))?
    } else {
        eprintln!("no base database yet, creating {}", destination.display());
        RecordSet::empty()
    };

    let outcome = reconcile(&config, &baseline, &incoming)
        .map_err(|e| update_err(EXIT_IDENTITY, e.to_string()))?;

    vulnbase_io::replace_atomic(&outcome.merged, &destination)
        .map_err(|e| update_err(EXIT_DESTINATION, e.to_string()))?;

    let summary = outcome.report.summary();
    eprintln!(
        "source '{}': {} keys — {} added, {} updated, {} unchanged, {} retained ({} malformed skipped)",
        config.name,
        summary.total_keys,
        summary.added,
        summary.updated,
        summary.unchanged,
        summary.retained,
        summary.skipped_malformed,
    );

    if json || output.is_some() {
        let report = UpdateReport {
            meta: RunMeta {
                source: config.name.clone(),
                mode: config.mode.to_string(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary,
            added: owned(outcome.report.keys_with(ChangeKind::Added)),
            updated: owned(outcome.report.keys_with(ChangeKind::Updated)),
        };
        let json_str = serde_json::to_string_pretty(&report)
            .map_err(|e| update_err(EXIT_PARSE, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = output {
            std::fs::write(path, &json_str)
                .map_err(|e| update_err(EXIT_DESTINATION, format!("cannot write report: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        if json {
            println!("{json_str}");
        }
    }

    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| update_err(EXIT_PARSE, format!("cannot read config: {e}")))?;

    match SourceConfig::from_toml(&config_str) {
        Ok(config) => {
            let freshness = config
                .freshness_field
                .as_deref()
                .map(|f| format!(", freshness '{f}'"))
                .unwrap_or_default();
            eprintln!(
                "valid: source '{}' ({}, identity '{}'{})",
                config.name, config.mode, config.identity_field, freshness,
            );
            Ok(())
        }
        Err(e) => Err(update_err(EXIT_INVALID_CONFIG, e.to_string())),
    }
}

fn owned(keys: Vec<&str>) -> Vec<String> {
    keys.into_iter().map(String::from).collect()
}

// ── Tests ───────────────────────────────────────────────────────────
