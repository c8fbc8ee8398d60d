//! Prometheus text exposition of a cycle's samples.
//!
//! Every scrape gets a fresh registry with one gauge family per schema row, so
//! instances that disappeared upstream disappear from the output as well.
//! Process metrics come from a registry that lives as long as the exporter.

use crate::schema::{MetricKind, MetricSample, SCHEMA};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub use prometheus::TEXT_FORMAT;

#[derive(Debug, thiserror::Error)]
pub enum ExpositionError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Encoded metrics are not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub struct Exposition {
    runtime: Registry,
}

impl Exposition {
    /// Registers the process collector where the platform supports it.
    pub fn new() -> Result<Self, ExpositionError> {
        let runtime = Registry::new();
        #[cfg(target_os = "linux")]
        runtime.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;
        Ok(Self { runtime })
    }

    /// Exposition without process metrics.
    pub fn without_runtime_metrics() -> Self {
        Self { runtime: Registry::new() }
    }

    pub fn render(&self, samples: &[MetricSample]) -> Result<String, ExpositionError> {
        let scrape = Registry::new();
        let mut gauges: HashMap<MetricKind, GaugeVec> = HashMap::new();
        for row in SCHEMA.iter() {
            let gauge = GaugeVec::new(Opts::new(row.name, row.help), row.labels)?;
            scrape.register(Box::new(gauge.clone()))?;
            gauges.insert(row.kind, gauge);
        }

        // First sample per label set wins, like ties between points.
        let mut seen: HashSet<(MetricKind, &[String])> = HashSet::new();
        for sample in samples {
            if !seen.insert((sample.kind, sample.labels.as_slice())) {
                warn!(
                    "dropping duplicate {} sample {:?} = {}",
                    sample.name(),
                    sample.labels,
                    sample.value
                );
                continue;
            }
            if let Some(gauge) = gauges.get(&sample.kind) {
                let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
                gauge.get_metric_with_label_values(&values)?.set(sample.value);
            }
        }

        let mut families = self.runtime.gather();
        families.extend(scrape.gather());

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: MetricKind, labels: &[&str], value: f64) -> MetricSample {
        MetricSample {
            kind,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }

    #[test]
    fn test_render_samples() {
        let exposition = Exposition::without_runtime_metrics();
        let output = exposition
            .render(&[
                sample(MetricKind::Uptime, &["db-1", "orders", "fr-par", "MySQL-8", "db-dev-s"], 0.5),
                sample(MetricKind::DiskUsage, &["db-1", "orders", "replica"], 71.25),
            ])
            .unwrap();

        assert!(output.contains("# HELP scaleway_rdb_uptime If 1 the database is up and running"));
        assert!(output.contains("# TYPE scaleway_rdb_uptime gauge"));
        assert!(output.contains("region=\"fr-par\""));
        assert!(output.contains("engine=\"MySQL-8\""));
        assert!(output.contains("type=\"db-dev-s\""));
        assert!(output.contains("# TYPE scaleway_database_disk_usage_percent gauge"));
        assert!(output
            .lines()
            .any(|l| l.starts_with("scaleway_database_disk_usage_percent{") && l.ends_with(" 71.25")));
        assert!(output.lines().any(|l| l.starts_with("scaleway_rdb_uptime{") && l.ends_with(" 0.5")));
    }

    #[test]
    fn test_render_without_samples() {
        let exposition = Exposition::without_runtime_metrics();
        let output = exposition.render(&[]).unwrap();
        assert!(!output.contains("scaleway_rdb_uptime{"));
    }

    #[test]
    fn test_duplicate_label_set_keeps_first_sample() {
        let exposition = Exposition::without_runtime_metrics();
        let output = exposition
            .render(&[
                sample(MetricKind::CpuUsage, &["x", "x", ""], 1.0),
                sample(MetricKind::CpuUsage, &["x", "x", ""], 2.0),
                sample(MetricKind::MemoryUsage, &["x", "x", ""], 3.0),
            ])
            .unwrap();

        let cpu: Vec<&str> = output
            .lines()
            .filter(|l| l.starts_with("scaleway_rdb_cpu_usage_percent{"))
            .collect();
        assert_eq!(cpu, vec!["scaleway_rdb_cpu_usage_percent{id=\"x\",name=\"x\",node=\"\"} 1"]);
        assert!(output
            .lines()
            .any(|l| l.starts_with("scaleway_rdb_memory_usage_percent{") && l.ends_with(" 3")));
    }

    #[test]
    fn test_render_rejects_mismatched_labels() {
        let exposition = Exposition::without_runtime_metrics();
        let result = exposition.render(&[sample(MetricKind::CpuUsage, &["db-1"], 1.0)]);
        assert!(matches!(result, Err(ExpositionError::Prometheus(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_metrics_included() {
        let exposition = Exposition::new().unwrap();
        let output = exposition.render(&[]).unwrap();
        assert!(output.contains("process_resident_memory_bytes"));
    }
}
