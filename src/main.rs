mod catalog;
mod checkpoint;
mod config;
mod dedup;
mod enrich;
mod http;
mod media;
mod metrics;
mod models;
mod output;
mod pipeline;
mod translate;

use catalog::price::PriceUnit;
use catalog::{HttpCatalogSession, Normalizer, NormalizerConfig};
use checkpoint::BatchCheckpointer;
use clap::Parser;
use config::{AppConfig, TaskConfig};
use enrich::DetailEnricher;
use eyre::{Result, WrapErr, eyre};
use media::{HttpMediaFetcher, MediaCollector, MediaSettings};
use output::FileOutput;
use pipeline::{IngestionPipeline, PipelineComponents, PipelineSettings};
use std::{path::PathBuf, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use translate::{AttributeTranslator, HttpTranslator};

#[derive(Debug, Parser)]
#[command(name = "catalog-ingest", about = "Resumable catalog ingestion into JSON and 1C CSV")]
struct Cli {
    /// Path to the JSON or YAML configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Run a single task by name instead of every enabled task.
    #[arg(long)]
    task: Option<String>,
    /// Print configured tasks and exit.
    #[arg(long)]
    list: bool,
    /// Discard existing checkpoints for the selected tasks.
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "catalog.cli", "ingestion failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .wrap_err_with(|| format!("loading {}", cli.config.display()))?;

    if cli.list {
        list_tasks(&config);
        return Ok(());
    }

    let tasks = config.select_tasks(cli.task.as_deref());
    if tasks.is_empty() {
        return Err(match cli.task {
            Some(name) => eyre!("no task named `{name}`"),
            None => eyre!("no enabled tasks in {}", cli.config.display()),
        });
    }

    let mut failed = 0usize;
    for task in tasks {
        if let Err(err) = run_task(&config, task, cli.fresh).await {
            failed += 1;
            error!(target = "catalog.cli", task = %task.name, "task failed: {err:?}");
        }
    }
    if failed > 0 {
        return Err(eyre!("{failed} task(s) failed"));
    }
    Ok(())
}

async fn run_task(config: &AppConfig, task: &TaskConfig, fresh: bool) -> Result<()> {
    let batch_key = task.batch_key();
    let list_url = config
        .endpoint_url(&task.endpoint)
        .ok_or_else(|| eyre!("task `{}` has no endpoint url", task.name))?;
    let detail_url = config.detail_url();
    if detail_url.is_none() {
        warn!(target = "catalog.cli", task = %task.name, "no detail endpoint configured, enrichment will degrade");
    }
    info!(target = "catalog.cli", task = %task.name, batch_key = %batch_key, url = %list_url, "starting task");

    let parsing = &config.parsing;
    let checkpointer = BatchCheckpointer::new(&parsing.checkpoint_dir);
    if fresh {
        checkpointer
            .clear(&batch_key)
            .wrap_err("clearing checkpoint")?;
        info!(target = "catalog.checkpoint", batch_key = %batch_key, "checkpoint cleared");
    }

    let mut session = HttpCatalogSession::new(
        list_url,
        detail_url,
        config.device.clone(),
        task.payload.clone(),
    )
    .with_page_params(&config.api.page_param, &config.api.page_size_param)
    .with_accepted_codes(config.api.accepted_codes.clone());

    let translation = config.translation.clone();
    let translate_timeout = Duration::from_secs(translation.timeout_secs);
    let parts = PipelineComponents {
        normalizer: Normalizer::new(NormalizerConfig {
            media_base: config.api.image_cdn.clone(),
            currency: parsing.currency.clone(),
            price_unit: PriceUnit::from_cents_flag(task.price_in_cents),
            market_price_unit: PriceUnit::from_cents_flag(task.market_price_in_cents),
            brand_filter: task.brand_filter.clone(),
        }),
        enricher: DetailEnricher::new(config.api.accepted_codes.clone(), config.api.image_cdn.clone()),
        translator: AttributeTranslator::new(Box::new(HttpTranslator::new(translation)), translate_timeout),
        checkpointer,
        media: MediaCollector::new(
            HttpMediaFetcher::new(),
            MediaSettings {
                upload_dir: parsing.upload_dir.clone(),
                media_base: config.api.image_cdn.clone(),
                max_images: parsing.max_images,
                fetch_timeout: Duration::from_secs(parsing.fetch_timeout_secs),
            },
        ),
        output: Box::new(FileOutput::new(&parsing.output_dir)),
    };
    let settings = PipelineSettings {
        batch_key,
        max_items: parsing.max_products,
        page_size: parsing.page_size,
        batch_size: parsing.batch_size,
    };

    let mut pipeline = IngestionPipeline::new(settings, parts);
    let outcome = match pipeline.run(&mut session).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                target = "catalog.cli",
                task = %task.name,
                stage = err.stage(),
                kind = ?err.kind(),
                state = %pipeline.state(),
                detail = err.detail(),
                "pipeline aborted"
            );
            return Err(err.into());
        }
    };

    for stage in &outcome.stages {
        info!(target = "catalog.metrics", stage = %stage.name, elapsed_ms = stage.elapsed_ms as u64, "stage finished");
    }
    for path in &outcome.outputs {
        info!(target = "catalog.output", path = %path.display(), "output written");
    }
    let summary = serde_json::to_string(&outcome.summary).wrap_err("encoding summary")?;
    info!(
        target = "catalog.cli",
        task = %task.name,
        products = outcome.products.len(),
        translation_calls = pipeline.translator().external_calls(),
        cached_translations = pipeline.translator().cached_entries(),
        summary = %summary,
        "task complete"
    );
    Ok(())
}

fn list_tasks(config: &AppConfig) {
    for task in &config.tasks {
        let url = config.endpoint_url(&task.endpoint).unwrap_or_default();
        println!(
            "{:<24} enabled={:<5} brand={:<10} endpoint={} ({})",
            task.name,
            task.enabled,
            task.brand_id().unwrap_or_else(|| "-".into()),
            task.endpoint,
            url
        );
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
