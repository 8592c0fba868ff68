use crate::catalog::{CatalogSource, DetailSource, Normalizer, PageCursor, PageFetch};
use crate::checkpoint::BatchCheckpointer;
use crate::dedup::Deduplicator;
use crate::enrich::DetailEnricher;
use crate::media::{MediaCollector, MediaFetcher};
use crate::metrics;
use crate::models::{Product, RunSummary, StageReport};
use crate::output::OutputStage;
use crate::translate::AttributeTranslator;
use serde_json::{Value, json};
use std::{fmt, path::PathBuf, time::Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub batch_key: String,
    pub max_items: usize,
    pub page_size: usize,
    pub batch_size: usize,
}

pub struct PipelineComponents<F> {
    pub normalizer: Normalizer,
    pub enricher: DetailEnricher,
    pub translator: AttributeTranslator,
    pub checkpointer: BatchCheckpointer,
    pub media: MediaCollector<F>,
    pub output: Box<dyn OutputStage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Paginating,
    Enriching(usize),
    Checkpointing(usize),
    Collecting,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Paginating => write!(f, "paginating"),
            PipelineState::Enriching(batch) => write!(f, "enriching({batch})"),
            PipelineState::Checkpointing(batch) => write!(f, "checkpointing({batch})"),
            PipelineState::Collecting => write!(f, "collecting"),
            PipelineState::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Checkpoint,
    Output,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn checkpoint(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Checkpoint,
        }
    }

    pub fn output(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Output,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

/// Completed products plus the number of items already committed.
#[derive(Debug, Default)]
struct BatchState {
    items: Vec<Product>,
    cursor: usize,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub products: Vec<Product>,
    pub stages: Vec<StageReport>,
    pub outputs: Vec<PathBuf>,
}

pub struct IngestionPipeline<F> {
    settings: PipelineSettings,
    parts: PipelineComponents<F>,
    state: PipelineState,
    stages: Vec<StageReport>,
}

impl<F: MediaFetcher> IngestionPipeline<F> {
    pub fn new(settings: PipelineSettings, parts: PipelineComponents<F>) -> Self {
        Self {
            settings,
            parts,
            state: PipelineState::Idle,
            stages: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn translator(&self) -> &AttributeTranslator {
        &self.parts.translator
    }

    /// Drives one ingestion run against `session`, which serves both pages
    /// and detail lookups and is used by one request at a time.
    pub async fn run<C>(&mut self, session: &mut C) -> Result<RunOutcome, PipelineError>
    where
        C: CatalogSource + DetailSource,
    {
        self.validate()?;
        self.stages.clear();
        self.transition(PipelineState::Idle);
        let batch_key = self.settings.batch_key.clone();

        let loaded = self.parts.checkpointer.load(&batch_key);
        let mut batch = BatchState {
            items: loaded.items,
            cursor: loaded.resume_offset,
        };
        let resumed_from = batch.items.len();
        let mut dedup = Deduplicator::seeded_from(&batch.items);
        if !dedup.is_empty() {
            info!(
                target = "catalog.pipeline",
                batch_key = %batch_key,
                committed = resumed_from,
                source = ?loaded.source,
                "resuming from item {}",
                batch.cursor + 1
            );
        }

        self.transition(PipelineState::Paginating);
        let started = Instant::now();
        let pending = self.paginate(session, &mut dedup).await;
        self.record_stage(
            "paginate",
            started,
            json!({ "pending": pending.len(), "already_committed": resumed_from }),
        );

        let total = resumed_from + pending.len();
        let batch_size = self.settings.batch_size;
        let mut batches_committed = 0;
        let started = Instant::now();
        let mut queue = pending.into_iter().peekable();
        let mut batch_index = 0;
        while queue.peek().is_some() {
            batch_index += 1;
            self.transition(PipelineState::Enriching(batch_index));
            let mut images_found = 0;
            for mut product in queue.by_ref().take(batch_size) {
                images_found += self.enrich_one(session, &mut product).await;
                batch.items.push(product);
            }

            self.transition(PipelineState::Checkpointing(batch_index));
            self.parts
                .checkpointer
                .save(&batch_key, &batch.items)
                .map_err(|err| PipelineError::checkpoint("checkpoint", err.to_string()))?;
            batch.cursor = batch.items.len();
            batches_committed += 1;
            metrics::batch_committed(&batch_key, batch_index, batch.items.len());
            info!(
                target = "catalog.pipeline",
                batch_key = %batch_key,
                batch = batch_index,
                processed = batch.cursor,
                total = total,
                images_found = images_found,
                "batch committed"
            );
        }
        self.record_stage(
            "enrich",
            started,
            json!({ "batches": batches_committed, "items": batch.items.len() }),
        );

        self.transition(PipelineState::Collecting);
        let started = Instant::now();
        let mut images_stored = 0;
        for product in batch.items.iter_mut() {
            let report = self.parts.media.collect(product).await;
            if report.failed > 0 {
                warn!(
                    target = "catalog.media",
                    id = %product.id,
                    failed = report.failed,
                    stored = report.local_paths.len(),
                    "partial image download"
                );
            }
            debug!(
                target = "catalog.media",
                id = %product.id,
                fetched = report.fetched,
                reused = report.reused,
                "images collected"
            );
            images_stored += report.local_paths.len();
            product.local_images = report.local_paths;
        }
        self.record_stage("collect_media", started, json!({ "images_stored": images_stored }));

        self.parts
            .checkpointer
            .save(&batch_key, &batch.items)
            .map_err(|err| PipelineError::checkpoint("checkpoint", err.to_string()))?;
        self.parts
            .checkpointer
            .finalize(&batch_key)
            .map_err(|err| PipelineError::checkpoint("finalize", err.to_string()))?;

        self.transition(PipelineState::Done);
        let started = Instant::now();
        let outputs = self
            .parts
            .output
            .deliver(&batch_key, &batch.items)
            .map_err(|err| PipelineError::output("output", err.to_string()))?;
        self.record_stage(
            "output",
            started,
            Value::Array(
                outputs
                    .iter()
                    .map(|path| Value::String(path.display().to_string()))
                    .collect(),
            ),
        );

        let summary = RunSummary {
            batch_key,
            resumed_from,
            new_items: batch.items.len() - resumed_from,
            total_items: batch.items.len(),
            batches_committed,
            image_references: batch.items.iter().map(|p| p.images.len()).sum(),
            images_stored,
        };
        info!(
            target = "catalog.pipeline",
            batch_key = %summary.batch_key,
            total_items = summary.total_items,
            new_items = summary.new_items,
            image_references = summary.image_references,
            images_stored = summary.images_stored,
            "run complete"
        );

        Ok(RunOutcome {
            summary,
            products: batch.items,
            stages: std::mem::take(&mut self.stages),
            outputs,
        })
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.settings.page_size == 0 {
            return Err(PipelineError::invalid_input("configure", "page_size must be positive"));
        }
        if self.settings.batch_size == 0 {
            return Err(PipelineError::invalid_input("configure", "batch_size must be positive"));
        }
        if self.settings.batch_key.trim().is_empty() {
            return Err(PipelineError::invalid_input("configure", "batch_key is empty"));
        }
        Ok(())
    }

    /// Pulls pages until the item cap, a short or empty page, or a source
    /// failure. Identities already seen (this run or committed) are dropped.
    async fn paginate<C>(&self, source: &mut C, dedup: &mut Deduplicator) -> Vec<Product>
    where
        C: CatalogSource,
    {
        let max_items = self.settings.max_items;
        let mut pending = Vec::new();
        let mut cursor = PageCursor::first(self.settings.page_size);
        let mut previous_ids: Vec<String> = Vec::new();
        let mut filtered = 0usize;
        let mut duplicates = 0usize;

        while dedup.len() < max_items {
            let records = match source.fetch_page(cursor).await {
                PageFetch::Items(records) => records,
                PageFetch::Exhausted => {
                    debug!(target = "catalog.source", page = cursor.page, "source exhausted");
                    break;
                }
                PageFetch::Unavailable(reason) => {
                    warn!(target = "catalog.source", page = cursor.page, reason = %reason, "source unavailable, stopping pagination");
                    break;
                }
                PageFetch::Rejected { code, message } => {
                    warn!(target = "catalog.source", page = cursor.page, code = ?code, message = %message, "source rejected page, stopping pagination");
                    break;
                }
            };
            let received = records.len();

            let mut page_ids = Vec::with_capacity(received);
            for raw in &records {
                let Some(product) = self.parts.normalizer.normalize(raw) else {
                    filtered += 1;
                    continue;
                };
                page_ids.push(product.id.clone());
                if dedup.seen(&product.id) {
                    duplicates += 1;
                    continue;
                }
                if dedup.len() >= max_items {
                    continue;
                }
                dedup.mark(&product.id);
                pending.push(product);
            }

            if !page_ids.is_empty() && page_ids == previous_ids {
                warn!(target = "catalog.source", page = cursor.page, "source repeated previous page, stopping pagination");
                break;
            }
            if received < cursor.page_size {
                break;
            }
            previous_ids = page_ids;
            cursor = cursor.next();
        }

        info!(
            target = "catalog.pipeline",
            pages = cursor.page,
            pending = pending.len(),
            filtered = filtered,
            duplicates = duplicates,
            "pagination finished"
        );
        pending
    }

    /// Returns the number of image references the product ends up with.
    async fn enrich_one<C>(&mut self, session: &mut C, product: &mut Product) -> usize
    where
        C: DetailSource,
    {
        let parts = &mut self.parts;
        product.name_translated = parts.translator.translate_value(&product.name).await;

        let detail = parts
            .enricher
            .fetch_details(session, &mut parts.translator, &product.id, &product.article)
            .await;
        if !detail.is_success() {
            debug!(target = "catalog.detail", id = %product.id, outcome = detail.outcome(), "enrichment degraded");
        } else {
            debug!(target = "catalog.detail", id = %product.id, attributes = detail.record().attributes.len(), "enrichment merged");
        }
        let record = detail.into_record();
        product.attributes.extend(record.attributes);
        for url in record.image_urls {
            product.push_image(url);
        }
        if record.location_code.is_some() {
            product.location_code = record.location_code;
        }
        product.article = record.secondary_code;
        product.images.len()
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(target = "catalog.pipeline", from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    fn record_stage(&mut self, name: &'static str, started: Instant, output: Value) {
        let elapsed_ms = started.elapsed().as_millis();
        metrics::stage_elapsed(name, elapsed_ms);
        self.stages.push(StageReport::new(name, elapsed_ms, output));
    }
}
