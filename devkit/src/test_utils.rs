/*!
Test harness for collection cycles.

Wraps a `MockTelemetrySource` into a `Collector`, runs cycles and answers
questions about the samples they produced:
- lookups by metric name, instance id and node
- assertions returning `anyhow` errors with a readable listing of what was seen
*/

use crate::mock_source::MockTelemetrySource;
use anyhow::Result;
use scaleway_exporter::collector::{Collector, CycleSummary};
use scaleway_exporter::schema::MetricSample;
use scaleway_exporter::source::TelemetrySource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Routes `tracing` output through the test writer; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scaleway_exporter=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub source: Arc<MockTelemetrySource>,
    pub collector: Collector,
}

impl TestHarness {
    pub fn new(source: MockTelemetrySource, timeout: Duration) -> Self {
        init_tracing();

        let source = Arc::new(source);
        let collector = Collector::with_timeout(
            Arc::clone(&source) as Arc<dyn TelemetrySource>,
            timeout,
        );
        Self { source, collector }
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.collector = self.collector.with_max_concurrent_fetches(limit);
        self
    }

    /// Runs one cycle to completion.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let summary = self.collector.run_cycle(tx).await;

        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }

        CycleReport {
            samples,
            summary,
            elapsed: started.elapsed(),
        }
    }
}

#[derive(Debug)]
pub struct CycleReport {
    pub samples: Vec<MetricSample>,
    pub summary: CycleSummary,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Samples of `metric` for instance `id`, in emission order.
    pub fn find(&self, metric: &str, id: &str) -> Vec<&MetricSample> {
        self.samples
            .iter()
            .filter(|s| s.name() == metric && s.label("id") == Some(id))
            .collect()
    }

    /// Value of the first `metric` sample of instance `id`.
    pub fn value(&self, metric: &str, id: &str) -> Option<f64> {
        self.find(metric, id).first().map(|s| s.value)
    }

    pub fn node_value(&self, metric: &str, id: &str, node: &str) -> Option<f64> {
        self.find(metric, id)
            .into_iter()
            .find(|s| s.label("node") == Some(node))
            .map(|s| s.value)
    }

    pub fn count(&self, metric: &str) -> usize {
        self.samples.iter().filter(|s| s.name() == metric).count()
    }

    pub fn assert_value(&self, metric: &str, id: &str, expected: f64) -> Result<()> {
        match self.value(metric, id) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "{metric} for {id}: expected {expected}, got {actual}"
            ),
            None => anyhow::bail!(
                "no {metric} sample for {id}; cycle produced: {}",
                self.describe()
            ),
        }
    }

    pub fn assert_absent(&self, metric: &str, id: &str) -> Result<()> {
        let found = self.find(metric, id);
        if !found.is_empty() {
            anyhow::bail!("unexpected {metric} sample(s) for {id}: {found:?}");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.samples
            .iter()
            .map(|s| format!("{}{:?}={}", s.name(), s.labels, s.value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{instance, point_at, series};
    use scaleway_exporter::models::InstanceStatus;

    #[tokio::test]
    async fn test_harness_runs_cycle() {
        let source = MockTelemetrySource::new()
            .with_instance(instance("a", "alpha", "fr-par", InstanceStatus::Ready))
            .with_series("a", series("total_connections", "n1", vec![point_at(5, 12.0)]));

        let harness = TestHarness::new(source, Duration::from_secs(2));
        let report = harness.run_cycle().await;

        assert_eq!(report.summary.instances, 1);
        assert_eq!(report.summary.samples, 2);
        report.assert_value("scaleway_rdb_uptime", "a", 1.0).unwrap();
        assert_eq!(report.node_value("scaleway_rdb_total_connections", "a", "n1"), Some(12.0));
        assert_eq!(report.count("scaleway_rdb_cpu_usage_percent"), 0);
        report.assert_absent("scaleway_rdb_uptime", "b").unwrap();
        assert!(report.assert_value("scaleway_rdb_uptime", "b", 1.0).is_err());
    }
}
