use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use estate_watermark::config::Config;
use estate_watermark::{ApplyRequest, StoreSet, WatermarkService};
use std::path::PathBuf;

/// Estate Watermark - batch watermarking for listing images
#[derive(Parser, Debug)]
#[command(name = "estate-watermark")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print Prometheus metrics to stdout after the command finishes
    #[arg(long)]
    metrics: bool,

    /// Validate configuration and exit
    #[arg(long)]
    test: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watermark project, developer and individual images.
    /// With no ids, every project and developer is processed.
    Apply {
        /// Project id (repeatable)
        #[arg(long = "project")]
        project_ids: Vec<String>,

        /// Developer id (repeatable)
        #[arg(long = "developer")]
        developer_ids: Vec<String>,

        /// Image id (repeatable)
        #[arg(long = "image")]
        image_ids: Vec<String>,
    },

    /// Retry images recorded in the failure ledger
    RetryFailed,

    /// List referenced images that still need a watermark
    Pending,

    /// Re-render images from their archived originals
    Regenerate {
        /// Image ids
        #[arg(required = true)]
        image_ids: Vec<String>,
    },
}

fn non_empty(ids: Vec<String>) -> Option<Vec<String>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    estate_watermark::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize logging subsystem")?;

    tracing::info!(
        config_file = %args.config.display(),
        store = %config.store.base_url,
        concurrency_limit = config.batch.concurrency_limit,
        max_retry_count = config.batch.max_retry_count,
        "Configuration loaded successfully"
    );

    if args.test {
        println!("Configuration OK");
        return Ok(());
    }

    let Some(command) = args.command else {
        anyhow::bail!("No command given; see --help");
    };

    let stores = StoreSet::http(&config.store).context("Failed to create store client")?;
    let service =
        WatermarkService::from_stores(stores, &config).context("Failed to build pipeline")?;

    match command {
        Command::Apply {
            project_ids,
            developer_ids,
            image_ids,
        } => {
            let response = service
                .apply_watermark(ApplyRequest {
                    project_ids: non_empty(project_ids),
                    developer_ids: non_empty(developer_ids),
                    image_ids: non_empty(image_ids),
                })
                .await
                .context("Watermarking run failed")?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Command::RetryFailed => {
            let response = service
                .process_failed_watermarks()
                .await
                .context("Retry sweep failed")?;
            println!("{}", serde_json::to_string(&response)?);
        }
        Command::Pending => {
            let ids = service
                .pending_watermark_ids()
                .await
                .context("Candidate discovery failed")?;
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        Command::Regenerate { image_ids } => {
            let response = service
                .regenerate(image_ids)
                .await
                .context("Regeneration run failed")?;
            println!("{}", serde_json::to_string(&response)?);
        }
    }

    if args.metrics {
        let text = estate_watermark::metrics::export_text().context("Failed to export metrics")?;
        print!("{text}");
    }

    Ok(())
}
