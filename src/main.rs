//! mvdkit CLI
//!
//! Entry point for the `mvdkit` command-line tool.

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use matvird_ingest::logging::{init_subscriber, Verbosity};
use matvird_ingest::store::{clear_tag, read_tag, Promotion};
use matvird_ingest::{CacheLookup, IngestConfig, ParseOptions, ParserRegistry, TaskIngestor};

#[derive(Parser)]
#[command(name = "mvdkit")]
#[command(about = "Content-addressed task ingestion cache", version)]
struct Cli {
    /// Repository root (overrides config file and MVDKIT_REPOSITORY)
    #[arg(long, global = true)]
    repository: Option<PathBuf>,

    /// Path to config file (default: ~/.config/mvdkit/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a calculation directory
    Ingest {
        /// Source directory
        dir: PathBuf,

        /// Parser format
        #[arg(long, short = 'f', default_value = "vasp")]
        format: String,

        /// Metadata tag (repeatable)
        #[arg(long = "tag", short = 't')]
        tags: Vec<String>,

        /// Task label
        #[arg(long, default_value = "")]
        label: String,

        /// Task description
        #[arg(long, default_value = "")]
        description: String,

        /// Output files to keep (comma-separated; default depends on format)
        #[arg(long, value_delimiter = ',')]
        outputs: Option<Vec<String>>,

        /// Re-parse even when the cache tag is valid
        #[arg(long)]
        force: bool,

        /// Store transferred files uncompressed
        #[arg(long)]
        no_compress: bool,

        /// Keep original file names instead of content-digest names
        #[arg(long)]
        no_rename: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a stored task record
    Show {
        /// Task digest
        digest: String,

        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or remove a source directory's cache tag
    Tag {
        #[command(subcommand)]
        action: TagCommands,
    },

    /// Remove orphaned staging and quarantine directories
    Gc {
        /// Minimum age in seconds (default: staging.orphan_threshold_secs)
        #[arg(long)]
        older_than_secs: Option<u64>,

        /// Report without deleting
        #[arg(long)]
        dry_run: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List registered parser formats
    Formats,
}

#[derive(Subcommand)]
enum TagCommands {
    /// Print the tag and whether it still validates
    Show {
        dir: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete the tag file
    Clear { dir: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet));

    let config = load_config(cli.config.as_deref(), cli.repository.as_deref());

    match cli.command {
        Commands::Ingest {
            dir,
            format,
            tags,
            label,
            description,
            outputs,
            force,
            no_compress,
            no_rename,
            json,
        } => {
            let mut transfer = config.transfer_options();
            if no_compress {
                transfer.compress = None;
            }
            if no_rename {
                transfer.rename = false;
            }
            let options = ParseOptions {
                tags,
                label,
                description,
                transfer,
                outputs,
                force,
            };
            run_ingest(config, &dir, &format, &options, json);
        }
        Commands::Show { digest, json } => run_show(config, &digest, json),
        Commands::Tag { action } => match action {
            TagCommands::Show { dir, json } => run_tag_show(config, &dir, json),
            TagCommands::Clear { dir } => run_tag_clear(&dir),
        },
        Commands::Gc {
            older_than_secs,
            dry_run,
            json,
        } => run_gc(config, older_than_secs.map(Duration::from_secs), dry_run, json),
        Commands::Formats => {
            for format in ParserRegistry::with_builtin().formats() {
                println!("{}", format);
            }
        }
    }
}

fn load_config(path: Option<&Path>, repository: Option<&Path>) -> IngestConfig {
    let cli_overrides = repository.map(|r| serde_json::json!({ "repository": r }));
    match IngestConfig::load(path, cli_overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn open_ingestor(config: IngestConfig) -> TaskIngestor {
    match TaskIngestor::new(config, ParserRegistry::with_builtin()) {
        Ok(ingestor) => ingestor,
        Err(e) => {
            eprintln!("Error opening repository: {}", e);
            process::exit(1);
        }
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_ingest(config: IngestConfig, dir: &Path, format: &str, options: &ParseOptions, json_output: bool) {
    let ingestor = open_ingestor(config);
    let outcome = match ingestor.ingest(dir, format, options) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Ingestion failed: {}", e);
            process::exit(1);
        }
    };

    let status = match (&outcome.promotion, outcome.cached) {
        (_, true) => "cached",
        (Some(Promotion::Promoted(_)), _) => "promoted",
        (Some(Promotion::AlreadyPresent(_)), _) => "already_present",
        (None, false) => "unknown",
    };

    if json_output {
        print_json(&serde_json::json!({
            "digest": outcome.digest,
            "classification": outcome.classification,
            "status": status,
            "entry_dir": outcome.entry_dir,
        }));
    } else {
        println!("{}", outcome.digest);
        println!("  Classification: {}", outcome.classification);
        println!("  Status: {}", status);
        println!("  Entry: {}", outcome.entry_dir.display());
    }
}

fn run_show(config: IngestConfig, digest: &str, json_output: bool) {
    let ingestor = open_ingestor(config);
    let record = match ingestor.load(digest) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Cannot load task {}: {}", digest, e);
            process::exit(1);
        }
    };

    if json_output {
        match record.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("{}", record.task_id);
    println!("  Format: {}", record.format);
    println!("  Classification: {}", record.classification);
    println!("  Source: {}", record.meta.dir_name);
    println!("  Created: {}", record.meta.created_at.to_rfc3339());
    if !record.meta.label.is_empty() {
        println!("  Label: {}", record.meta.label);
    }
    if !record.meta.tags.is_empty() {
        println!("  Tags: {}", record.meta.tags.join(", "));
    }
    if let Some(state) = record.output.get("state").and_then(|v| v.as_str()) {
        println!("  State: {}", state);
    }
}

fn run_tag_show(config: IngestConfig, dir: &Path, json_output: bool) {
    let tag = match read_tag(dir) {
        Ok(Some(tag)) => tag,
        Ok(None) => {
            eprintln!("No tag in {}", dir.display());
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Unreadable tag in {}: {}", dir.display(), e);
            process::exit(1);
        }
    };

    let ingestor = open_ingestor(config);
    let validity = match ingestor.lookup(dir) {
        CacheLookup::Hit(_) => "valid".to_string(),
        CacheLookup::Miss(reason) => format!("stale ({})", reason),
    };

    if json_output {
        print_json(&serde_json::json!({
            "digest": tag.digest,
            "extra": tag.extra,
            "validity": validity,
        }));
    } else {
        println!("{}", tag.digest);
        for (key, value) in &tag.extra {
            match value.as_str() {
                Some(s) => println!("  {}: {}", key, s),
                None => println!("  {}: {}", key, value),
            }
        }
        println!("  Validity: {}", validity);
    }
}

fn run_tag_clear(dir: &Path) {
    match clear_tag(dir) {
        Ok(true) => println!("Removed tag from {}", dir.display()),
        Ok(false) => println!("No tag in {}", dir.display()),
        Err(e) => {
            eprintln!("Cannot remove tag: {}", e);
            process::exit(1);
        }
    }
}

fn run_gc(config: IngestConfig, older_than: Option<Duration>, dry_run: bool, json_output: bool) {
    let ingestor = open_ingestor(config);
    let report = match ingestor.collect_garbage(older_than, dry_run) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Garbage collection failed: {}", e);
            process::exit(1);
        }
    };

    if json_output {
        print_json(&serde_json::json!({
            "scanned": report.scanned,
            "removed": report.removed,
            "skipped": report.skipped,
            "bytes_reclaimed": report.bytes_reclaimed,
            "dry_run": dry_run,
            "errors": report.errors,
        }));
    } else {
        let verb = if dry_run { "Would remove" } else { "Removed" };
        println!(
            "{} {} of {} orphaned directories ({} bytes)",
            verb,
            report.removed.len(),
            report.scanned,
            report.bytes_reclaimed
        );
        for path in &report.removed {
            println!("  {}", path.display());
        }
        for error in &report.errors {
            eprintln!("  {}", error);
        }
    }

    if !report.errors.is_empty() {
        process::exit(1);
    }
}
