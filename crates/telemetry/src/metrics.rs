use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Frame Pipeline Metrics ====
    pub static ref FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "frame_dedup_frames_total",
                "Total number of frames by final outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FRAME_ATTEMPTS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "frame_dedup_frame_attempts_total",
                "Total number of frame processing attempts by result",
            ),
            &["result"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FRAMES_IN_FLIGHT: IntGauge = {
        let metric = IntGauge::new(
            "frame_dedup_frames_in_flight",
            "Number of frames currently holding a worker",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FRAME_DURATION: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "frame_dedup_frame_duration_seconds",
                "Time to process one frame end to end",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["pass"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Dedup Decision Metrics ====
    pub static ref FACES_INDEXED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "frame_dedup_faces_indexed_total",
                "Total number of faces indexed into the collection",
            ),
            &["pass"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FACES_NEW: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "frame_dedup_new_identities_total",
                "Total number of faces with no match in the collection",
            ),
            &["pass"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref FACES_DELETED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "frame_dedup_faces_deleted_total",
                "Total number of duplicate faces removed from the collection",
            ),
            &["pass"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref MULTI_MATCH_SEARCHES: IntCounter = {
        let metric = IntCounter::new(
            "frame_dedup_multi_match_searches_total",
            "Searches that returned more than one match (collection already held duplicates)",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Backend Metrics ====
    pub static ref BACKEND_CALLS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "frame_dedup_backend_calls_total",
                "Total number of collaborator calls by operation and status",
            ),
            &["operation", "status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref BACKEND_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "frame_dedup_backend_latency_seconds",
                "Collaborator call latency by operation",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_registered_and_encoded() {
        FRAMES_PROCESSED.with_label_values(&["persisted"]).inc();
        MULTI_MATCH_SEARCHES.inc();
        BACKEND_LATENCY
            .with_label_values(&["search_faces"])
            .observe(0.02);

        let text = encode_metrics().unwrap();
        assert!(text.contains("frame_dedup_frames_total"));
        assert!(text.contains("frame_dedup_multi_match_searches_total"));
        assert!(text.contains("frame_dedup_backend_latency_seconds"));
    }
}
