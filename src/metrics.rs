use tracing::trace;

// Lightweight metrics helpers kept as trace events so no recorder or
// exporter dependency is needed for a one-shot CLI run.

pub fn inc_listing_fetches() {
    trace!(target = "sillage.metrics", "listing_fetches_total_inc");
}

pub fn inc_image_downloads(ok: bool) {
    trace!(
        target = "sillage.metrics",
        ok = ok,
        "image_downloads_total_inc"
    );
}

pub fn phase_elapsed(phase: &'static str, elapsed_ms: u128) {
    trace!(
        target = "sillage.metrics",
        phase = phase,
        elapsed_ms = elapsed_ms as u64,
        "phase_elapsed"
    );
}
