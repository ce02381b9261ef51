/*!
 * Pixelwatch CLI - Command Line Interface
 */

use clap::{Parser, Subcommand};
use console::style;
use pixelwatch::{
    commands::{self, site::AddSite},
    config::{LogLevel, PixelwatchConfig},
    error::{AppError, Result, EXIT_SUCCESS},
    logging,
};
use pulsar::Ingestor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pixelwatch")]
#[command(version, about = "Monitor GTM, GA4 and Meta pixel health from browser heartbeats", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.pixelwatch/pixelwatch.toml if present)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config and PIXELWATCH_DB)
    #[arg(long = "db", value_name = "PATH", global = true)]
    database: Option<String>,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevel>,

    /// Write JSON logs to this file
    #[arg(long = "log", value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingest endpoint and site status API
    Serve {
        /// Bind address (overrides config)
        #[arg(long, value_name = "ADDR")]
        addr: Option<SocketAddr>,
    },

    /// Manage monitored sites
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },

    /// Print the current status of a site as JSON
    Status {
        /// Site ID
        site_id: i64,
    },

    /// Print the most recent heartbeats of a site as JSON, newest first
    Heartbeats {
        /// Site ID
        site_id: i64,

        /// Number of heartbeats (defaults to api.default_heartbeat_limit)
        #[arg(short = 'n', long)]
        limit: Option<u32>,
    },

    /// Replay a heartbeat payload from a file, or `-` for stdin
    Ingest {
        /// Payload file
        input: String,
    },

    /// Write a default configuration file
    InitConfig {
        /// Target path (defaults to ~/.pixelwatch/pixelwatch.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum SiteCommands {
    /// Register a site
    Add {
        /// Owning organization ID
        #[arg(long)]
        org: i64,

        /// Site URL, matched exactly against heartbeat siteUrl
        #[arg(long)]
        url: String,

        /// Display name (defaults to the URL)
        #[arg(long)]
        name: Option<String>,

        /// Expected GTM container ID
        #[arg(long = "gtm", value_name = "ID")]
        gtm_container_id: Option<String>,

        /// Expected GA4 measurement ID
        #[arg(long = "ga4", value_name = "ID")]
        ga4_measurement_id: Option<String>,

        /// Expected Meta pixel ID
        #[arg(long = "meta", value_name = "ID")]
        meta_pixel_id: Option<String>,
    },

    /// List an organization's sites with their status
    List {
        /// Organization ID
        #[arg(long)]
        org: i64,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove a site and all of its heartbeats
    Remove {
        /// Organization ID
        #[arg(long)]
        org: i64,

        /// Site ID
        site_id: i64,
    },
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // init-config must work before any config exists
    if let Commands::InitConfig { path, force } = &cli.command {
        let written = commands::init::write_default_config(path.as_deref(), *force)?;
        println!(
            "{} Wrote default configuration to {}",
            style("✓").green(),
            written.display()
        );
        return Ok(());
    }

    let mut config = PixelwatchConfig::load(cli.config.as_deref())?;
    config.apply_env()?;
    if let Some(db) = cli.database {
        config.database.path = db;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file;
    }
    config.verbose |= cli.verbose;

    logging::init_logging(&config)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| AppError::Server(format!("Failed to start async runtime: {}", e)))?;
    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Commands, config: PixelwatchConfig) -> Result<()> {
    match command {
        Commands::Serve { addr } => commands::serve::serve(&config, addr).await,
        Commands::Site { command } => {
            let store = commands::open_store(&config).await?;
            match command {
                SiteCommands::Add {
                    org,
                    url,
                    name,
                    gtm_container_id,
                    ga4_measurement_id,
                    meta_pixel_id,
                } => {
                    let site = commands::site::add_site(
                        &store,
                        AddSite {
                            org_id: org,
                            url,
                            name,
                            gtm_container_id,
                            ga4_measurement_id,
                            meta_pixel_id,
                        },
                    )
                    .await?;
                    println!("{}", serde_json::to_string_pretty(&site)?);
                }
                SiteCommands::List { org, json } => {
                    let sites = commands::site::list_sites(&store, org).await?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&sites)?);
                    } else {
                        println!("{}", commands::site::render_sites(&sites));
                    }
                }
                SiteCommands::Remove { org, site_id } => {
                    commands::site::remove_site(&store, org, site_id).await?;
                    println!("{} Removed site {}", style("✓").green(), site_id);
                }
            }
            Ok(())
        }
        Commands::Status { site_id } => {
            let store = commands::open_store(&config).await?;
            let status = commands::report::site_status(&store, site_id).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Heartbeats { site_id, limit } => {
            let store = commands::open_store(&config).await?;
            let limit = limit
                .unwrap_or(config.api.default_heartbeat_limit)
                .min(config.api.max_heartbeat_limit);
            let beats = commands::report::recent_heartbeats(&store, site_id, limit).await?;
            println!("{}", serde_json::to_string_pretty(&beats)?);
            Ok(())
        }
        Commands::Ingest { input } => {
            let payload = commands::replay::read_payload(&input)?;
            let store = Arc::new(commands::open_store(&config).await?);
            let id = commands::replay::replay(&Ingestor::with_backend(store), &payload).await?;
            println!("{}", serde_json::json!({ "success": true, "heartbeatId": id }));
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    }
}
