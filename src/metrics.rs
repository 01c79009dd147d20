use tracing::trace;

// Counters and timings go out as trace events; the Prometheus recorder in
// main only renders what the exporter has been handed.

pub fn inc_requests(route: &'static str) {
    trace!(target = "snaplist.metrics", route = route, "requests_total_inc");
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "snaplist.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}
