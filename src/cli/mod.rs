use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};

pub mod commands;

use self::commands::{AddArgs, DeleteArgs, EditArgs, ListArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(name = "moodj", version, about = "Personal mood journal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over MOODJOURNAL_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over MOODJOURNAL_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a new entry
    Add(AddArgs),
    /// Change an existing entry and stamp it as updated
    Edit(EditArgs),
    /// Delete an entry (its status annotation is kept)
    Delete(DeleteArgs),
    /// Print entries, optionally searched or sorted (default)
    List(ListArgs),
    /// Print a single entry
    Show(ShowArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);
    let mut app = App::new(config).context("starting journal")?;
    if let Some(error) = app.view().last_error() {
        tracing::warn!(%error, "entry statuses partially loaded");
    }

    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));
    match command {
        Commands::Add(args) => commands::add_entry(&mut app, args),
        Commands::Edit(args) => commands::edit_entry(&mut app, args),
        Commands::Delete(args) => commands::delete_entry(&mut app, args),
        Commands::List(args) => commands::list_entries(&mut app, args),
        Commands::Show(args) => commands::show_entry(&app, args),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
