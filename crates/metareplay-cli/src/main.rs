mod commands;
mod logging;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use metareplay_core::event::read_events;
use metareplay_core::storage::models::BackupMapping;
use metareplay_core::storage::Database;
use metareplay_core::{AppConfig, EventApplier, LocalFsClient};
use tracing::{error, info, info_span};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match metareplay_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Apply { files }) => run_apply(&config, &files),
        Some(Commands::AddBackup { src, dest }) => run_add_backup(&config, &src, &dest),
        Some(Commands::ListBackups) => run_list_backups(&config),
        Some(Commands::ListDiffs { offset, limit }) => run_list_diffs(&config, offset, limit),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        Some(Commands::TruncateDb) => {
            match prompt_confirm(
                "Are you SURE you want to COMPLETELY DELETE the Database?",
                Some(false),
            ) {
                Ok(true) => run_truncate(&config),
                _ => process::exit(0),
            }
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

/// Opens the replica and registers any backups listed in the configuration.
fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path))?;
    for mapping in &config.backups {
        db.insert_backup_mapping(mapping)?;
    }
    Ok(db)
}

fn run_apply(config: &AppConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let client = LocalFsClient::new(&config.source_root);

    for (batch, path) in files.iter().enumerate() {
        let reader = BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        );
        let events = read_events(reader).with_context(|| format!("reading {}", path.display()))?;

        let span = info_span!("batch", n = batch, file = %path.display());
        let report = EventApplier::new(&client, &db)
            .with_delivery(config.diff_delivery)
            .with_span(span)
            .apply(&events)
            .with_context(|| format!("applying {}", path.display()))?;

        info!(
            "{}: {} events, {} mutation ops, {} file diffs",
            path.display(),
            format!("{}", report.events).green(),
            format!("{}", report.ops).cyan(),
            format!("{}", report.diffs).yellow(),
        );
    }

    Ok(())
}

fn run_add_backup(config: &AppConfig, src: &str, dest: &str) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let rid = db.insert_backup_mapping(&BackupMapping::new(src, dest))?;
    println!("Backup {} registered: {} -> {}", rid, src.green(), dest.cyan());
    Ok(())
}

fn run_list_backups(config: &AppConfig) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let mappings = db.list_backup_mappings()?;
    if mappings.is_empty() {
        println!("No backups registered");
    }
    for mapping in mappings {
        println!("{:>4}  {} -> {}", mapping.rid, mapping.src.green(), mapping.dest.cyan());
    }
    Ok(())
}

fn run_list_diffs(config: &AppConfig, offset: i64, limit: i64) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let total = db.count_file_diffs()?;
    for diff in db.get_file_diffs(offset, limit)? {
        println!(
            "{:>6}  {:<8}  {}  {}",
            diff.id,
            diff.diff_type.to_string().yellow(),
            diff.src,
            diff.parameters
        );
    }
    println!("{} file diffs in total", format!("{}", total).cyan());
    Ok(())
}

fn run_truncate(config: &AppConfig) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)?;
    db.truncate_all()?;
    println!("All tables truncated");
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        io::stdin().read_line(&mut input)?;

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
