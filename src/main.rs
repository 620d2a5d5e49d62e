use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{self, filter::EnvFilter};

use testify_migrate::{Migrator, config::MigrationConfig, engine::ENGINE_HELP};

/// Rewrite testify assertions into grailbio testutil assertions
#[derive(Parser, Debug)]
#[command(name = "testify-migrate")]
#[command(about = "Migrate Go tests from testify to grailbio testutil")]
#[command(version)]
#[command(after_help = ENGINE_HELP)]
struct Args {
    /// Packages to migrate, e.g. ./... or ./pkg/store
    #[arg(required = true, value_name = "PACKAGES")]
    packages: Vec<String>,

    /// Also migrate every package that depends on the given packages
    #[arg(long)]
    transitive: bool,

    /// Log derived matchers and template ASTs
    #[arg(short, long)]
    verbose: bool,

    /// Report matches without writing files
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Module root (default: current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// YAML rule catalog replacing the built-in one
    #[arg(long, value_name = "FILE")]
    rules: Option<PathBuf>,

    /// Parent directory for the scratch template directory
    #[arg(long = "scratch-dir", value_name = "DIR")]
    scratch_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::debug!("Starting migration with args: {:?}", args);

    let json = args.json;
    let config = create_config_from_args(args)?;
    let migrator = Migrator::new(config);

    let mut stdout = std::io::stdout().lock();
    let summary = migrator.run(&mut stdout)?;
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&summary)?)?;
    }
    Ok(())
}

/// Create a MigrationConfig from command line arguments
fn create_config_from_args(args: Args) -> Result<MigrationConfig> {
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    Ok(MigrationConfig {
        root,
        patterns: args.packages,
        transitive: args.transitive,
        verbose: args.verbose,
        dry_run: args.dry_run,
        rules_file: args.rules,
        scratch_dir: args.scratch_dir,
    })
}
