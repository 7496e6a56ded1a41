use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tablesync::config::{Settings, WatchConfig, WatchOptions};
use tablesync::io::{EntityType, Envelope, ResultCode};
use tablesync::utils::list_directory;
use tablesync::watcher::{SettingsReloader, WatchManager};
use tablesync::{ConfigError, ConfigStore, EventBus, Table, TableAssembler, Topic, logging};

#[derive(Parser)]
#[command(name = "tablesync")]
#[command(version, about = "Parse tabular files and keep watching them for changes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .tablesync/settings.toml with defaults
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        #[arg(long)]
        json: bool,
    },

    /// Parse a csv, xlsx, xls or json file into a table
    Parse {
        file: PathBuf,

        /// Output the full table as JSON
        #[arg(long)]
        json: bool,

        /// Rows to show in text mode
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// List the files in a directory
    List {
        dir: PathBuf,

        /// Include subdirectories
        #[arg(short, long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Watch the configured directories and print every event as a JSON line
    Watch {
        /// Directory to watch instead of the configured ones (repeatable)
        #[arg(short, long = "dir")]
        dirs: Vec<PathBuf>,

        /// File type to watch instead of the configured ones (repeatable)
        #[arg(short = 't', long = "type")]
        types: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    });
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force, json } => run_init(force, json),
        Commands::Config { json } => run_config(&settings, json),
        Commands::Parse { file, json, limit } => run_parse(file, json, limit).await,
        Commands::List { dir, all, json } => run_list(dir, all, json).await,
        Commands::Watch { dirs, types } => run_watch(settings, dirs, types).await,
    }
}

fn run_init(force: bool, json: bool) -> anyhow::Result<ExitCode> {
    match (Settings::init_config_file(force), json) {
        (Ok(path), true) => {
            let envelope = Envelope::success(path.display().to_string())
                .with_message("Created configuration file");
            println!("{}", envelope.to_json()?);
            Ok(ExitCode::SUCCESS)
        }
        (Ok(path), false) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::SUCCESS)
        }
        (Err(e), true) => {
            let envelope: Envelope<()> = Envelope::config_error(&e);
            println!("{}", envelope.to_json()?);
            Ok(ExitCode::from(envelope.exit_code))
        }
        (Err(e @ ConfigError::AlreadyExists { .. }), false) => {
            eprintln!("{e}");
            eprintln!("Use --force to overwrite it.");
            Ok(ExitCode::from(1))
        }
        (Err(e), false) => Err(e).context("Failed to create configuration"),
    }
}

fn run_config(settings: &Settings, json: bool) -> anyhow::Result<ExitCode> {
    if json {
        let envelope = Envelope::success(settings).with_entity_type(EntityType::Settings);
        println!("{}", envelope.to_json()?);
    } else {
        println!("# {}", Settings::config_path().display());
        println!("{}", toml::to_string_pretty(settings)?);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_parse(file: PathBuf, json: bool, limit: usize) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    let result = TableAssembler::new().parse_file(&file).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match (result, json) {
        (Ok(table), true) => {
            let count = table.rows.len();
            let envelope = Envelope::success(table)
                .with_entity_type(EntityType::Table)
                .with_count(count)
                .with_duration_ms(duration_ms);
            println!("{}", envelope.to_json()?);
            Ok(ExitCode::SUCCESS)
        }
        (Ok(table), false) => {
            print_table(&table, limit);
            Ok(ExitCode::SUCCESS)
        }
        (Err(e), true) => {
            let envelope: Envelope<()> = Envelope::table_error(&e).with_duration_ms(duration_ms);
            println!("{}", envelope.to_json()?);
            Ok(ExitCode::from(envelope.exit_code))
        }
        (Err(e), false) => {
            eprintln!("Error: {e}");
            for suggestion in e.suggestions() {
                eprintln!("  hint: {suggestion}");
            }
            Ok(ExitCode::from(Envelope::<()>::table_error(&e).exit_code))
        }
    }
}

fn print_table(table: &Table, limit: usize) {
    let meta = &table.metadata;
    println!(
        "{} ({}): {} rows, {} columns",
        meta.file_name,
        meta.file_type,
        meta.row_count,
        table.headers.len()
    );
    for header in &table.headers {
        println!("  {:<24} {}", header.key, header.column_type.as_str());
    }

    if limit == 0 || table.rows.is_empty() {
        return;
    }

    println!();
    let keys: Vec<&str> = table.headers.iter().map(|h| h.key.as_str()).collect();
    println!("{}", keys.join("\t"));
    for row in table.rows.iter().take(limit) {
        let cells: Vec<String> = keys
            .iter()
            .map(|k| row.get(*k).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        println!("{}", cells.join("\t"));
    }
    if table.rows.len() > limit {
        println!("... {} more rows", table.rows.len() - limit);
    }
}

async fn run_list(dir: PathBuf, all: bool, json: bool) -> anyhow::Result<ExitCode> {
    let entries = list_directory(&dir, all)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    if json {
        let count = entries.len();
        let envelope = Envelope::success(entries)
            .with_entity_type(EntityType::FileList)
            .with_count(count);
        println!("{}", envelope.to_json()?);
    } else {
        for entry in &entries {
            let kind = if entry.is_directory { "dir" } else { entry.file_type.as_str() };
            println!("{:<6} {:>10}  {}", kind, entry.size, entry.name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_watch(
    settings: Settings,
    dirs: Vec<PathBuf>,
    types: Vec<String>,
) -> anyhow::Result<ExitCode> {
    let bus = EventBus::new();

    // Stream every topic to stdout, one envelope per line
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriptions: Vec<_> = Topic::ALL
        .iter()
        .map(|&topic| {
            let tx = tx.clone();
            bus.subscribe(topic, move |event| {
                let _ = tx.send(event.clone());
            })
        })
        .collect();
    drop(tx);

    let store = Arc::new(
        ConfigStore::open(Settings::config_path(), bus.clone())
            .unwrap_or_else(|e| {
                tracing::warn!("[config] {e}; using loaded settings in memory");
                ConfigStore::new(settings.clone(), bus.clone())
            }),
    );
    let current = store.current();

    let mut config = WatchConfig::from(&current.watching);
    if !dirs.is_empty() {
        config.directories = dirs;
    }
    if !types.is_empty() {
        config = WatchConfig::new(config.directories, types);
    }

    let manager = WatchManager::builder()
        .bus(bus.clone())
        .options(WatchOptions::from(&current.watching))
        .build()?;
    if let Err(e) = manager.init(config.clone()).await {
        // Keep stdout a stream of envelopes even when nothing could start
        let envelope: Envelope<()> = Envelope::watch_error(&e);
        println!("{}", envelope.to_json_compact()?);
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
        return Ok(ExitCode::from(envelope.exit_code));
    }

    for failure in manager.failures().await {
        eprintln!("Warning: {failure}");
    }
    eprintln!(
        "Watching {} for {}",
        manager
            .watched_directories()
            .await
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        config.file_types.join(", ")
    );

    let cancel = CancellationToken::new();
    let reloader = SettingsReloader::new(store.clone(), Duration::from_secs(1))
        .map(|reloader| reloader.spawn(cancel.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Shutting down...");
                break;
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let line = Envelope::event(&event)
                    .with_entity_type(EntityType::BusEvent)
                    .to_json_compact();
                match line {
                    Ok(line) => println!("{line}"),
                    Err(e) => {
                        let envelope: Envelope<()> =
                            Envelope::error(ResultCode::InternalError, e.to_string());
                        println!("{}", envelope.to_json_compact()?);
                    }
                }
            }
        }
    }

    cancel.cancel();
    if let Some(handle) = reloader {
        let _ = handle.await;
    }
    manager.shutdown().await;
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }

    Ok(ExitCode::SUCCESS)
}
