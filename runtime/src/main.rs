// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use harvester_runtime::cli;
use harvester_runtime::config::HarvesterConfig;

#[derive(Parser)]
#[command(
    name = "harvester",
    about = "Harvester — crawl an investment portfolio site into a company database",
    version,
    after_help = "Run 'harvester <command> --help' for details on each command.\nSettings are read from HARVESTER_* environment variables."
)]
struct Cli {
    /// Output results and logs as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// SQLite database file (overrides HARVESTER_DB_PATH)
    #[arg(long, global = true)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Port to listen on (overrides HARVESTER_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Address to bind (overrides HARVESTER_HOST)
        #[arg(long)]
        host: Option<String>,
    },
    /// Run one crawl pass and persist the results
    Crawl {
        /// Show the browser window
        #[arg(long)]
        headful: bool,
    },
    /// List stored companies
    Companies {
        /// Reload from the database instead of the in-memory list
        #[arg(long)]
        refresh: bool,
    },
    /// Show the number of stored companies and the latest update
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };
    cli::init_tracing(level, cli.json);

    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = HarvesterConfig::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.http_port = port;
            }
            if let Some(host) = host {
                config.http_host = host;
            }
            cli::serve::run(&config).await
        }
        Commands::Crawl { headful } => {
            config.headful |= headful;
            cli::crawl::run(&config, cli.json).await
        }
        Commands::Companies { refresh } => cli::companies::run(&config, refresh, cli.json).await,
        Commands::Summary => cli::summary::run(&config, cli.json).await,
    }
}
