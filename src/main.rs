//! Command-line interface for avro-pipeline
//!
//! ```bash
//! # Produce ten records, creating the topic first
//! avro-pipeline produce --topic users --count 10 --create-topic --partitions 3
//!
//! # Consume from the beginning with a new group
//! avro-pipeline consume --topic users --group-id replay --auto-offset-reset earliest
//! ```
//!
//! Secrets are read from the environment: `KAFKA_SASL_PASSWORD`,
//! `KAFKA_SASL_JAAS_CONFIG`, `KAFKA_SSL_KEYSTORE_PASSWORD`,
//! `KAFKA_SSL_KEY_PASSWORD` and `SCHEMA_REGISTRY_BASIC_AUTH`.

use avro_pipeline::{
    run_consumer_loop, run_producer_loop, ConsumeArgs, ProduceArgs, RandomUserGenerator,
    UserLogger,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "avro-pipeline")]
#[command(about = "Publish and consume schema-registered Avro records over Kafka")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish random Users records
    Produce {
        #[command(flatten)]
        args: ProduceArgs,
    },

    /// Consume and log Users records
    Consume {
        #[command(flatten)]
        args: ConsumeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let shutdown = setup_shutdown_handler();

    match cli.command {
        Commands::Produce { args } => {
            let seed = args.seed.unwrap_or_else(rand::random);
            let config = args.into_config()?;
            let mut generator = RandomUserGenerator::new(seed);
            let report = run_producer_loop(config, &mut generator, shutdown).await?;
            if report.failed > 0 || report.abandoned > 0 {
                warn!(
                    "{} publishes failed and {} were abandoned",
                    report.failed, report.abandoned
                );
            }
        }
        Commands::Consume { args } => {
            let config = args.into_config()?;
            let mut handler = UserLogger::new();
            run_consumer_loop(config, &mut handler, shutdown).await?;
        }
    }

    Ok(())
}

/// Cancels the returned token on Ctrl+C.
fn setup_shutdown_handler() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            return;
        }
        info!("Received interrupt signal (Ctrl+C)");
        token.cancel();
    });

    shutdown
}
