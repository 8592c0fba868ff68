use tracing::trace;

// Counters are emitted as trace events; no exporter is wired in.

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "catalog.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn batch_committed(batch_key: &str, batch: usize, items: usize) {
    trace!(
        target = "catalog.metrics",
        batch_key = batch_key,
        batch = batch as u64,
        items = items as u64,
        "batch_committed"
    );
}

pub fn detail_outcome(outcome: &'static str) {
    trace!(
        target = "catalog.metrics",
        outcome = outcome,
        "detail_outcome_inc"
    );
}

pub fn media_outcome(outcome: &'static str) {
    trace!(
        target = "catalog.metrics",
        outcome = outcome,
        "media_outcome_inc"
    );
}
