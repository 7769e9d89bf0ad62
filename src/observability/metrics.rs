use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_sessions_total: IntCounterVec,
    pub dispatch_queue_depth: IntGauge,
    pub dispatch_latency_seconds: HistogramVec,
    pub offers_total: IntCounterVec,
    pub bookings_total: IntCounterVec,
    pub active_trackers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_sessions_total = IntCounterVec::new(
            Opts::new(
                "dispatch_sessions_total",
                "Finished dispatch sessions by outcome",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_sessions_total metric");

        let dispatch_queue_depth =
            IntGauge::new("dispatch_queue_depth", "Requests waiting for a session")
                .expect("valid dispatch_queue_depth metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Wall time of a dispatch session in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Extended offers by response"),
            &["response"],
        )
        .expect("valid offers_total metric");

        let bookings_total = IntCounterVec::new(
            Opts::new("bookings_total", "Booking transitions by resulting status"),
            &["status"],
        )
        .expect("valid bookings_total metric");

        let active_trackers = IntGauge::new("active_trackers", "Live position trackers running")
            .expect("valid active_trackers metric");

        registry
            .register(Box::new(dispatch_sessions_total.clone()))
            .expect("register dispatch_sessions_total");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");
        registry
            .register(Box::new(active_trackers.clone()))
            .expect("register active_trackers");

        Self {
            registry,
            dispatch_sessions_total,
            dispatch_queue_depth,
            dispatch_latency_seconds,
            offers_total,
            bookings_total,
            active_trackers,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
