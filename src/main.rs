use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use kling_dispatch::credentials::test_credential;
use kling_dispatch::dispatcher::{DispatchOptions, Dispatcher};
use kling_dispatch::models::{load_items, load_items_from_path, Config, Item};
use kling_dispatch::transport::KlingHttpClient;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "kling-dispatch")]
#[command(about = "Run batches of Kling AI API requests")]
struct CliArgs {
    /// Override the API base URL (defaults to KLING_BASE_URL or the public API).
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a batch of items and print one JSON result per item.
    Run {
        /// JSON file holding an array of items; `-` or omitted reads stdin.
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Record failed items as `{"error": ..}` instead of aborting.
        #[arg(long)]
        continue_on_fail: bool,
    },
    /// Check that the configured credentials are accepted by the API.
    TestCredentials,
}

fn read_items(input: Option<&Path>) -> Result<Vec<Item>> {
    match input {
        Some(path) if path != Path::new("-") => load_items_from_path(path)
            .with_context(|| format!("Failed to read items from {}", path.display())),
        _ => load_items(std::io::stdin().lock()).context("Failed to read items from stdin"),
    }
}

async fn run(args: CliArgs, config: Config) -> Result<()> {
    let base_url = args.base_url.unwrap_or_else(|| config.base_url.clone());
    let transport = KlingHttpClient::new(config.timeout)?.with_base_url(base_url);

    match args.command {
        Command::Run {
            input,
            continue_on_fail,
        } => {
            let items = read_items(input.as_deref())?;
            let dispatcher = Dispatcher::new(
                Box::new(transport),
                DispatchOptions {
                    continue_on_fail: continue_on_fail || config.continue_on_fail,
                },
            );

            let results = dispatcher.run(&config.credential, &items).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::TestCredentials => {
            let response = test_credential(&transport, &config.credential, Utc::now()).await?;
            info!("Credentials accepted");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kling_dispatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match run(args, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Batch failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
