use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kong::pools::HttpConnector;
use kong::{
    Address, ChainId, Config, ConfigError, Context, KongError, Pipeline, PostgresQueue,
    PostgresRepo, QueueName, Repo,
};

#[derive(Parser)]
#[command(name = "kong", version, about = "Multi-chain EVM ingestion for yield-vault analytics")]
struct Cli {
    /// TOML file with chains, abis and webhooks
    #[arg(long, env = "KONG_CONFIG", default_value = "kong.toml")]
    config: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Works the given queues until interrupted
    Ingest {
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "fanout,extract,compute,load,probe"
        )]
        queues: Vec<QueueName>,

        /// Leave fanout, probe and monitor scheduling to another process
        #[arg(long)]
        no_schedules: bool,
    },
    /// Forgets strides and logs above a block so they are extracted again
    Rollback {
        #[arg(long)]
        chain: ChainId,

        #[arg(long)]
        block: u64,

        /// Only this address instead of the whole chain
        #[arg(long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "Kong stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), KongError> {
    let config = Config::load(&cli.config)?.apply_env()?;
    config.validate()?;

    let repo = PostgresRepo::connect(&cli.database_url).await?;
    repo.migrate().await?;

    match cli.command {
        Command::Ingest {
            queues,
            no_schedules,
        } => ingest(config, repo, &cli.database_url, &queues, !no_schedules).await,
        Command::Rollback {
            chain,
            block,
            address,
        } => {
            let address = address
                .map(|address| {
                    address
                        .parse::<Address>()
                        .map_err(|_| ConfigError::InvalidValue(format!("address {address}")))
                })
                .transpose()?;

            let touched = repo.rollback(chain, block, address).await?;
            info!(chain, block, touched, "Rolled back");

            Ok(())
        }
    }
}

async fn ingest(
    config: Config,
    repo: PostgresRepo,
    database_url: &str,
    queues: &[QueueName],
    schedules: bool,
) -> Result<(), KongError> {
    let queue = PostgresQueue::connect(database_url).await?;
    queue.migrate().await?;

    let ctx = Context::new(config, Arc::new(HttpConnector), Arc::new(queue), Arc::new(repo))?;
    let ctx = Arc::new(ctx);
    ctx.up().await?;

    let pipeline = Pipeline::new(ctx.clone(), queues).with_schedules(schedules);
    pipeline.up().await?;

    info!(?queues, schedules, "Kong ingesting");

    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "Could not listen for shutdown");
    }

    info!("Shutting down");
    pipeline.down().await?;
    ctx.down().await?;

    Ok(())
}
