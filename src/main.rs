//! p2pstorage CLI Application
//!
//! Runs the coordinator, or talks to one as a peer.

use clap::{Parser, Subcommand};
use p2pstorage::cli;
use p2pstorage::config::CoordinatorConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "p2pstorage")]
#[command(version = "0.1.0")]
#[command(about = "Signaling coordinator for a peer-to-peer storage network", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(short, long)]
        bind: Option<String>,

        /// Message sent to every host that connects
        #[arg(long)]
        broadcast: Option<String>,
    },

    /// List hosts connected to a coordinator
    Hosts {
        /// Coordinator address (host:port)
        #[arg(short, long)]
        server: String,

        /// Name to announce
        #[arg(short, long, default_value = "p2pstorage-cli")]
        name: String,
    },

    /// List files shared on a coordinator
    Files {
        /// Coordinator address (host:port)
        #[arg(short, long)]
        server: String,

        /// Name to announce
        #[arg(short, long, default_value = "p2pstorage-cli")]
        name: String,
    },

    /// Share local files and wait for transfer requests
    Share {
        /// Coordinator address (host:port)
        #[arg(short, long)]
        server: String,

        /// Name to announce
        #[arg(short, long)]
        name: String,

        /// Files to advertise
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the digest of a file
    Hash {
        /// File to hash
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match cli.command {
            Commands::Hash { file } => {
                cli::cmd_hash(&file)?;
            }

            Commands::Serve {
                config,
                port,
                bind,
                broadcast,
            } => {
                let mut settings = match config {
                    Some(path) => CoordinatorConfig::load(&path)?,
                    None => CoordinatorConfig::default(),
                };
                settings.apply_env();
                if let Some(port) = port {
                    settings.port = port;
                }
                if let Some(bind) = bind {
                    settings.bind = bind;
                }
                if broadcast.is_some() {
                    settings.broadcast_message = broadcast;
                }

                cli::cmd_serve(settings).await?;
            }

            Commands::Hosts { server, name } => {
                cli::cmd_hosts(&server, &name).await?;
            }

            Commands::Files { server, name } => {
                cli::cmd_files(&server, &name).await?;
            }

            Commands::Share {
                server,
                name,
                files,
            } => {
                cli::cmd_share(&server, &name, &files).await?;
            }
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    Ok(())
}
