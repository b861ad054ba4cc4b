//! Guidance store command-line tools.
//!
//! # Commands
//!
//! - `status` - Show schema version and record counts
//! - `export` - Write the dataset to an archive file
//! - `import` - Replace the dataset with an archive file
//! - `reset` - Clear every collection

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use guidance_core::{
    core_version, export_to_path, import_from_path, AppSettings, Collection, CoreConfig, Store,
};
use log::info;
use std::path::{Path, PathBuf};

/// Maintenance tools for a guidance counseling data directory.
#[derive(Parser)]
#[command(name = "guidance")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the database and logs
    #[arg(global = true, long, env = "GUIDANCE_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long, env = "GUIDANCE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show schema version and record counts
    Status,

    /// Write the dataset to an archive file
    Export {
        /// Destination archive path
        output: PathBuf,
    },

    /// Replace the dataset with the contents of an archive file
    Import {
        /// Source archive path
        input: PathBuf,
    },

    /// Delete every record and setting
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = std::path::absolute(&cli.data_dir)
        .with_context(|| format!("invalid data directory {}", cli.data_dir.display()))?;
    let mut config = CoreConfig::new(data_dir);
    if let Some(level) = cli.log_level {
        config = config.with_log_level(level);
    }
    config.init_logging().context("failed to initialize logging")?;

    let store = config
        .open_store()
        .with_context(|| format!("failed to open {}", config.db_path().display()))?;

    match cli.command {
        Commands::Status => print_status(&store)?,
        Commands::Export { output } => export(&store, &output)?,
        Commands::Import { input } => import(&store, &input)?,
        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to reset without --yes");
            }
            store.full_reset().context("reset failed")?;
            info!("event=store_reset module=cli status=ok");
            println!("all collections cleared");
        }
    }
    Ok(())
}

fn print_status(store: &Store) -> anyhow::Result<()> {
    let report = store.migration_report();
    println!("guidance_core v{}", core_version());
    match store.path() {
        Some(path) => println!("database: {}", path.display()),
        None => println!("database: in-memory"),
    }
    println!(
        "schema version: {} (migrated from {}, {} step(s) applied)",
        store.schema_version()?,
        report.from_version,
        report.applied.len()
    );
    for collection in Collection::ALL {
        println!("{:<22} {}", collection.name(), store.count(collection)?);
    }
    Ok(())
}

fn export(store: &Store, output: &Path) -> anyhow::Result<()> {
    let summary = export_to_path(store, output)
        .with_context(|| format!("export to {} failed", output.display()))?;
    println!(
        "exported {} classroom(s), {} student(s), {} session(s); {} photo entr(ies), {} inline photo(s)",
        summary.classrooms,
        summary.students,
        summary.sessions,
        summary.photo_entries,
        summary.inline_photos
    );
    Ok(())
}

fn import(store: &Store, input: &Path) -> anyhow::Result<()> {
    let defaults = AppSettings::default();
    let summary = import_from_path(store, input, &defaults, |stage, percent| {
        println!("[{percent:>3}%] {}", stage.name());
    })
    .with_context(|| format!("import from {} failed", input.display()))?;
    println!(
        "imported {} classroom(s), {} student(s), {} session(s), {} photo(s) restored",
        summary.classrooms, summary.students, summary.sessions, summary.photos_restored
    );
    Ok(())
}
