use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref POLLS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "airq_polls_total",
        "Total /data fetches started"
    ))
    .unwrap();
    pub static ref POLL_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "airq_poll_failures_total",
        "Total polls that ended in an error"
    ))
    .unwrap();
    pub static ref DECRYPT_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "airq_decrypt_failures_total",
        "Total polls rejected for a wrong password or corrupted payload"
    ))
    .unwrap();
    pub static ref SKIPPED_POLLS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "airq_skipped_polls_total",
        "Total timer ticks dropped because a fetch was still in flight"
    ))
    .unwrap();
    pub static ref EDGE_EVENTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "airq_edge_events_total",
        "Total restart, status and door events detected"
    ))
    .unwrap();
    pub static ref POLL_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "airq_poll_latency_seconds",
            "Time taken to fetch and decrypt one telemetry sample"
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
    pub static ref REACHABLE: Gauge = Gauge::with_opts(Opts::new(
        "airq_reachable",
        "1 if the last poll succeeded, 0 otherwise"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(POLLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECRYPT_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SKIPPED_POLLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EDGE_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(REACHABLE.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
