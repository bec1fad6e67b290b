use crate::Error;
use opentelemetry::trace::TraceId;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, exemplar::HistogramWithExemplars, family::Family},
    registry::{Registry, Unit},
};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub resources: ResourceMetrics,
    pub readiness: ReadinessMetrics,
    pub stages: StageMetrics,
    pub registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::with_prefix("minio_crud");
        let resources = ResourceMetrics::default().register(&mut registry);
        let readiness = ReadinessMetrics::default().register(&mut registry);
        let stages = StageMetrics::default().register(&mut registry);
        Self {
            registry: Arc::new(registry),
            resources,
            readiness,
            stages,
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceLabels {
    pub kind: String,
    pub outcome: String,
}

#[derive(Clone, Default)]
pub struct ResourceMetrics {
    pub applied: Family<ResourceLabels, Counter>,
}

impl ResourceMetrics {
    pub fn register(self, r: &mut Registry) -> Self {
        r.register(
            "resources_applied",
            "kubernetes objects applied by outcome",
            self.applied.clone(),
        );
        self
    }

    pub fn record(&self, kind: &str, outcome: &str) {
        self.applied
            .get_or_create(&ResourceLabels {
                kind: kind.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

#[derive(Clone, Default)]
pub struct ReadinessMetrics {
    pub polls: Counter,
    pub poll_errors: Counter,
}

impl ReadinessMetrics {
    pub fn register(self, r: &mut Registry) -> Self {
        r.register("readiness_polls", "pod list calls", self.polls.clone());
        r.register(
            "readiness_poll_errors",
            "pod list calls that failed",
            self.poll_errors.clone(),
        );
        self
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StageLabels {
    pub stage: String,
    pub trace_id: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    pub stage: String,
    pub error: String,
}

#[derive(Clone)]
pub struct StageMetrics {
    pub failures: Family<FailureLabels, Counter>,
    pub duration: HistogramWithExemplars<StageLabels>,
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self {
            failures: Family::<FailureLabels, Counter>::default(),
            duration: HistogramWithExemplars::new(
                [0.1, 0.5, 1., 5., 15., 60., 300., 600.].into_iter(),
            ),
        }
    }
}

impl StageMetrics {
    /// Register stage metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "stage_duration",
            "duration of a run stage",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register("stage_failures", "failed run stages", self.failures.clone());
        self
    }

    pub fn set_failure(&self, stage: &str, e: &Error) {
        self.failures
            .get_or_create(&FailureLabels {
                stage: stage.to_string(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn measure(&self, stage: &str, trace_id: &TraceId) -> StageMeasurer {
        StageMeasurer {
            start: Instant::now(),
            labels: StageLabels {
                stage: stage.to_string(),
                trace_id: trace_id.to_string(),
            },
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct StageMeasurer {
    start: Instant,
    labels: StageLabels,
    metric: HistogramWithExemplars<StageLabels>,
}

impl Drop for StageMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(
            duration,
            Some(self.labels.clone()),
            Some(std::time::SystemTime::now()),
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(metrics: &Metrics) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &metrics.registry).unwrap();
        buffer
    }

    #[test]
    fn resource_outcomes_are_counted_per_kind() {
        let metrics = Metrics::default();
        metrics.resources.record("Service", "created");
        metrics.resources.record("Service", "created");
        metrics.resources.record("Deployment", "already_exists");

        let text = encode(&metrics);
        assert!(text.contains(
            "minio_crud_resources_applied_total{kind=\"Service\",outcome=\"created\"} 2"
        ));
        assert!(text.contains(
            "minio_crud_resources_applied_total{kind=\"Deployment\",outcome=\"already_exists\"} 1"
        ));
    }

    #[test]
    fn stage_failures_use_error_label() {
        let metrics = Metrics::default();
        metrics.stages.set_failure("submit", &Error::MissingArgoServerUrl);

        let text = encode(&metrics);
        assert!(text.contains("error=\"missing_argo_server_url\""));
    }

    #[tokio::test]
    async fn measurer_observes_on_drop() {
        let metrics = Metrics::default();
        drop(metrics.stages.measure("wait", &TraceId::INVALID));

        let text = encode(&metrics);
        assert!(text.contains("minio_crud_stage_duration_seconds_count 1"));
    }
}
