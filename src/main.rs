//! Zero Wallet CLI
//!
//! Command-line front end for the connector: connect a wallet, inspect it and
//! send relayed transactions through the zero-wallet server.

use alloy::primitives::{Address, Bytes, U256};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zero_wallet::config::ConnectPolicy;
use zero_wallet::server::TransactionCall;
use zero_wallet::{ConnectorOptions, Error, Result, SupportedChain, ZeroWalletConnector};

#[derive(Parser)]
#[command(name = "zero-wallet")]
#[command(about = "Gasless smart-contract wallet backed by a local key")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON options file (defaults to environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Chain to operate on (defaults to the configured default chain)
    #[arg(long, global = true)]
    chain: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, recover or create the wallet key and mark the wallet connected
    Connect {
        /// Succeed with the existing session when already connected
        #[arg(long)]
        reuse: bool,
    },

    /// Print the wallet address
    Address,

    /// Sign a UTF-8 message (EIP-191)
    SignMessage { message: String },

    /// Send a relayed transaction from the smart-contract wallet
    Send {
        /// Target address
        #[arg(long)]
        to: String,

        /// Calldata (hex encoded)
        #[arg(long, default_value = "0x")]
        data: String,

        /// Value in wei
        #[arg(long, default_value = "0")]
        value: String,

        /// Gas limit hint for the transaction builder
        #[arg(long)]
        gas_limit: Option<u64>,
    },

    /// Check whether the account is authorized for its smart-contract wallet
    Authorize,

    /// Request deployment of the smart-contract wallet
    Deploy,

    /// Validate a chain switch and print the resulting network
    SwitchChain { chain_id: u64 },

    /// List supported chains and their RPC endpoints
    Networks,

    /// Mark the wallet disconnected
    Disconnect,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut options = match &cli.config {
        Some(path) => ConnectorOptions::load(path)?,
        None => ConnectorOptions::from_env()?,
    };

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&options)?);
        return Ok(());
    }
    if let Commands::Connect { reuse: true } = cli.command {
        options.connect_policy = ConnectPolicy::Reuse;
    }

    let connector = ZeroWalletConnector::new(options)?;
    if let Some(chain_id) = cli.chain {
        connector.switch_chain(chain_id).await?;
    }

    match cli.command {
        Commands::Connect { .. } => {
            let data = connector.connect().await?;
            print_json(&json!({
                "account": data.account,
                "chain": data.chain,
                "key": data.key_origin,
            }))?;
        }
        Commands::Address => {
            println!("{}", connector.account().await?);
        }
        Commands::SignMessage { message } => {
            println!("{}", connector.signer().await?.sign_message(&message)?);
        }
        Commands::Send {
            to,
            data,
            value,
            gas_limit,
        } => {
            let call = parse_call(&to, &data, &value, gas_limit)?;
            let signer = connector.signer().await?;
            let mined = signer.send_transaction(call).await?;
            print_json(&mined)?;
        }
        Commands::Authorize => {
            let authorized = connector.signer().await?.authorize().await?;
            print_json(&json!({ "authorized": authorized }))?;
        }
        Commands::Deploy => {
            connector.signer().await?.deploy_scw().await?;
            tracing::info!("Deployment accepted");
        }
        Commands::SwitchChain { chain_id } => {
            let network = connector.switch_chain(chain_id).await?;
            print_json(&network)?;
        }
        Commands::Networks => {
            let configured = &connector.options().rpc_urls;
            let networks: Vec<_> = SupportedChain::all()
                .iter()
                .map(|chain| {
                    json!({
                        "chain_id": chain.chain_id(),
                        "name": chain.name(),
                        "rpc_url": configured.get(&chain.chain_id()),
                    })
                })
                .collect();
            print_json(&networks)?;
        }
        Commands::Disconnect => {
            connector.disconnect().await?;
        }
        Commands::Config => {}
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_call(
    to: &str,
    data: &str,
    value: &str,
    gas_limit: Option<u64>,
) -> Result<TransactionCall> {
    let to = Address::from_str(to)
        .map_err(|e| Error::InvalidTransaction(format!("Invalid to address {}: {}", to, e)))?;
    let data = Bytes::from_str(data)
        .map_err(|e| Error::InvalidTransaction(format!("Invalid calldata: {}", e)))?;
    let value = U256::from_str(value)
        .map_err(|e| Error::InvalidTransaction(format!("Invalid value {}: {}", value, e)))?;

    Ok(TransactionCall {
        to,
        value,
        data,
        gas_limit,
    })
}
