// vulnbase CLI - incremental base-database maintenance for vulnerability feeds

mod combine;
mod convert;
mod exit_codes;
mod fetch;
mod partition;
mod update;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::EXIT_USAGE;

#[derive(Parser)]
#[command(name = "vulnbase")]
#[command(about = "Incremental base-database maintenance for vulnerability feeds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a fresh snapshot into a source's base database
    #[command(after_help = "\
Examples:
  vulnbase update cisa.toml --snapshot kev_2026-08-05.csv
  vulnbase update cisa.toml --url https://example.org/kev.csv
  vulnbase update nvd.toml --snapshot CVE-2026.csv --json")]
    Update {
        /// Path to the source .toml config
        config: PathBuf,

        /// Freshly fetched snapshot CSV
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Download the snapshot from this URL instead of reading a file
        #[arg(long)]
        url: Option<String>,

        /// Print the change report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON change report to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a source config without running
    #[command(after_help = "\
Examples:
  vulnbase validate cisa.toml")]
    Validate {
        /// Path to the source .toml config
        config: PathBuf,
    },

    /// Split snapshots into partition files and sync partitioned bases
    Partition {
        #[command(subcommand)]
        command: partition::PartitionCommands,
    },

    /// Merge every CSV in a directory into one; first key seen wins
    #[command(after_help = "\
Examples:
  vulnbase combine data/2026-08-05 -o data/2026-08-05/combined.csv
  vulnbase combine data/latest -o combined.csv --identity-field cveID")]
    Combine {
        /// Directory of CSV files to merge
        dir: PathBuf,

        /// Output CSV
        #[arg(long, short = 'o')]
        out: PathBuf,

        /// Column the rows are deduplicated on
        #[arg(long, default_value = "id")]
        identity_field: String,
    },

    /// Flatten a JSON feed into a CSV record set
    #[command(after_help = "\
Examples:
  vulnbase convert core-labs-exploits.json -o corelabs.csv
  vulnbase convert --url https://example.org/groups.json -o ransomwatch_DB.csv
  vulnbase convert threat-actor.json -o misp_DB.csv --root values")]
    Convert {
        /// JSON feed to flatten
        input: Option<PathBuf>,

        /// Download the feed from this URL instead of reading a file
        #[arg(long)]
        url: Option<String>,

        /// Output CSV
        #[arg(long, short = 'o')]
        out: PathBuf,

        /// JSON key holding the record array (auto-detected when omitted)
        #[arg(long)]
        root: Option<String>,
    },

    /// Fetch batch scores for identity keys, resumably
    #[command(after_help = "\
Examples:
  vulnbase scores epss.toml --input data/combined.csv")]
    Scores {
        /// Source config with a [batch] section
        config: PathBuf,

        /// CSV whose identity column lists the keys to score
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Debug)]
pub(crate) struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Update { config, snapshot, url, json, output } => {
            update::cmd_update(config, snapshot, url, json, output)
        }
        Commands::Validate { config } => update::cmd_validate(config),
        Commands::Partition { command } => partition::cmd_partition(command),
        Commands::Combine { dir, out, identity_field } => {
            combine::cmd_combine(dir, out, identity_field)
        }
        Commands::Convert { input, url, out, root } => {
            convert::cmd_convert(input, url, out, root)
        }
        Commands::Scores { config, input } => fetch::scores::cmd_scores(config, input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(err.code)
        }
    }
}
