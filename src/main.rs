//! djinn CLI entry point

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use djinn::agent::events::{AgentEvent, FINAL_MESSAGE, REVIEW_DATA, REVIEW_TEXT};
use djinn::agent::graph::ReviewDecision;
use djinn::agent::{Agent, AgentConfig, AgentDependencies, ExecuteInput, SessionConfig};
use djinn::config::AppConfig;
use djinn::network::{NetworkConfig, NetworkManager, NetworkName};
use djinn::plugins::{SwapPlugin, TokenPlugin, WalletPlugin};
use djinn::services::jupiter::{JupiterService, JupiterServiceConfig};
use djinn::services::birdeye::{BirdeyeService, BirdeyeServiceConfig};
use djinn::tool::Tool as _;
use djinn::wallet::FixedWallet;

#[derive(Parser)]
#[command(name = "djinn")]
#[command(about = "On-chain agent with pluggable tools and human-in-the-loop review")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.djinn/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to the agent and stream the answer
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Session thread ID
        #[arg(short, long, default_value = "cli:default")]
        thread: String,

        /// Automatically approve review requests instead of prompting
        #[arg(long)]
        yes: bool,
    },

    /// Show the tools the configured agent exposes
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => djinn::config::load_from(&path)?,
        None => djinn::config::load()?,
    };

    match cli.command {
        Commands::Chat { message, thread, yes } => {
            let agent = build_agent(&config).await?;
            run_chat(&agent, &message, &thread, yes).await?;
        }
        Commands::Tools => {
            let agent = build_agent(&config).await?;
            for tool in agent.tools() {
                println!("{:<20} {}", tool.name(), tool.description());
            }
        }
    }

    Ok(())
}

async fn build_agent(config: &AppConfig) -> Result<Agent> {
    let mut addresses = HashMap::new();
    for (network, address) in &config.wallet_addresses {
        addresses.insert(*network, address.clone());
    }

    let network = Arc::new(NetworkManager::new(config.networks.clone()));
    let deps = AgentDependencies {
        wallet: Arc::new(FixedWallet::new(addresses)),
        network: network.clone(),
    };

    let mut agent = Agent::new(
        AgentConfig {
            model: config.model.clone(),
            system_message: config.system_message.clone(),
        },
        deps,
    );

    if let Ok(NetworkConfig::Solana(solana)) = network.network_config(NetworkName::Solana) {
        agent.register_service(Box::new(JupiterService::new(JupiterServiceConfig {
            rpc_url: solana.rpc_url.clone(),
        })));
    }
    if let Ok(api_key) = std::env::var("BIRDEYE_API_KEY") {
        agent.register_service(Box::new(BirdeyeService::new(BirdeyeServiceConfig {
            api_key,
        })));
    }

    agent.register_plugin(Box::new(WalletPlugin::new()));
    agent.register_plugin(Box::new(TokenPlugin::new()));
    agent.register_plugin(Box::new(SwapPlugin::new()));

    agent
        .initialize(config.plugins.as_ref())
        .await
        .context("agent initialization failed")?;
    Ok(agent)
}

async fn run_chat(agent: &Agent, message: &str, thread: &str, auto_approve: bool) -> Result<()> {
    let mut input = ExecuteInput::text(message);

    // loop so a review suspension can be resolved and resumed in-process
    loop {
        let stream = agent
            .execute(input, SessionConfig::thread(thread))
            .await?;
        let review_requested = print_events(stream).await?;

        if !review_requested {
            return Ok(());
        }

        let decision = if auto_approve {
            println!("\n[auto-approved]");
            ReviewDecision::approve()
        } else {
            prompt_decision()?
        };
        input = ExecuteInput::Resume(decision);
    }
}

/// Print the event stream; returns true when the run suspended for review.
async fn print_events(mut stream: djinn::agent::events::EventStream) -> Result<bool> {
    let mut review_requested = false;
    let mut first_word = true;

    while let Some(event) = stream.next().await {
        match event.name.as_str() {
            FINAL_MESSAGE => {
                if first_word {
                    first_word = false;
                } else {
                    print!(" ");
                }
                print!("{}", event.content());
                std::io::stdout().flush()?;
            }
            REVIEW_TEXT => {
                review_requested = true;
                print!("{}", event.content());
                std::io::stdout().flush()?;
            }
            REVIEW_DATA => {
                review_requested = true;
                print_review_data(&event);
            }
            _ => {}
        }
    }
    println!();

    Ok(review_requested)
}

fn print_review_data(event: &AgentEvent) {
    match serde_json::from_str::<serde_json::Value>(event.content()) {
        Ok(data) => println!("--- transaction ---\n{:#}\n-------------------", data),
        Err(_) => println!("--- transaction ---\n{}\n-------------------", event.content()),
    }
}

fn prompt_decision() -> Result<ReviewDecision> {
    print!("\nApprove this action? [y/N/text]: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let answer = line.trim();

    Ok(match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => ReviewDecision::approve(),
        "" | "n" | "no" => ReviewDecision::reject(),
        _ => ReviewDecision {
            action: None,
            text: Some(answer.to_string()),
        },
    })
}
