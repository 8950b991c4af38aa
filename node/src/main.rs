//! SURETY Node Binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use surety_core::{AccountId, NodeConfig};
use surety_crypto::keys::{KeyFile, KeyPair};
use surety_node::NodeBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "surety-node")]
#[command(about = "SURETY Node - Flight insurance with oracle consensus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// API listen address
        #[arg(long)]
        api_addr: Option<String>,

        /// Founding airline account id (hex)
        #[arg(long)]
        founding_airline: Option<String>,

        /// Administrator account id (hex)
        #[arg(long)]
        admin: Option<String>,

        /// Fixed seed for oracle index draws
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate a new keypair
    Keygen {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn parse_account(value: &str) -> anyhow::Result<AccountId> {
    AccountId::from_hex(value).map_err(|e| anyhow::anyhow!("invalid account id {}: {}", value, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            api_addr,
            founding_airline,
            admin,
            seed,
        } => {
            let node_config = match config {
                Some(path) => {
                    let content = std::fs::read_to_string(&path)?;
                    NodeConfig::from_json(&content)?
                }
                None => NodeConfig::default(),
            };
            init_logging(&node_config.log_level);

            info!("Starting SURETY Node...");

            let mut builder = NodeBuilder::new().config(node_config);
            if let Some(addr) = api_addr {
                builder = builder.api_addr(&addr);
            }
            if let Some(airline) = founding_airline {
                builder = builder.founding_airline(parse_account(&airline)?);
            }
            if let Some(admin) = admin {
                builder = builder.admin(parse_account(&admin)?);
            }
            if let Some(seed) = seed {
                builder = builder.rng_seed(seed);
            }

            let node = builder.build()?;
            node.start().await?;
        }

        Commands::Keygen { output } => {
            let keypair = KeyPair::generate();
            let json = serde_json::to_string_pretty(&KeyFile::from(&keypair))?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &json)?;
                    println!("Keypair saved to: {}", path.display());
                }
                None => {
                    println!("{}", json);
                }
            }
        }

        Commands::Config { output } => {
            let json = NodeConfig::default().to_json()?;
            std::fs::write(&output, &json)?;

            println!("Configuration saved to: {}", output.display());
        }
    }

    Ok(())
}
