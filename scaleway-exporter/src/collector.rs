//! RDB snapshot collector - one collection cycle per scrape.
//!
//! A cycle runs in three steps under a single deadline:
//! 1. discovery: list the instances of every configured region. Any region
//!    failing aborts the cycle with no samples at all.
//! 2. fan-out: one task per instance. The task emits the instance's health
//!    sample right away, then fetches its telemetry and emits one sample per
//!    recognized, non-empty series. A failed fetch only loses that instance's
//!    node samples.
//! 3. join: the cycle returns once every instance task has finished, which the
//!    deadline bounds.
//!
//! Nothing survives a cycle; concurrent scrapes run independent cycles.

use crate::config::Config;
use crate::models::{Instance, Region, TelemetrySeries};
use crate::schema::{MetricKind, MetricSample};
use crate::source::{SourceError, TelemetrySource};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error("failed to fetch the list of databases in {region}: {source}")]
pub struct DiscoveryError {
    pub region: Region,
    pub source: SourceError,
}

/// Outcome of one cycle, for logs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub instances: usize,
    pub samples: usize,
    pub failed_fetches: usize,
    pub aborted: bool,
}

#[derive(Debug, Default)]
struct InstanceOutcome {
    samples: usize,
    fetch_failed: bool,
}

pub struct Collector {
    source: Arc<dyn TelemetrySource>,
    timeout: Duration,
    max_concurrent_fetches: usize,
}

impl Collector {
    pub fn new(source: Arc<dyn TelemetrySource>, config: &Config) -> Self {
        info!("Creating new RDB collector");
        Self::with_timeout(source, Duration::from_millis(config.timeout_in_ms))
            .with_max_concurrent_fetches(config.max_concurrent_fetches)
    }

    pub fn with_timeout(source: Arc<dyn TelemetrySource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            max_concurrent_fetches: 0,
        }
    }

    /// Caps simultaneous telemetry fetches within a cycle; 0 removes the cap.
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs one cycle and returns every sample it produced.
    pub async fn collect(&self) -> Vec<MetricSample> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.run_cycle(tx).await;

        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }
        samples
    }

    /// Runs one cycle, streaming samples into `sink` as instance tasks
    /// produce them. `sink` is released only after every task has finished.
    pub async fn run_cycle(&self, sink: mpsc::UnboundedSender<MetricSample>) -> CycleSummary {
        let started = Instant::now();
        let deadline = started + self.timeout;

        let instances = match self.discover(deadline).await {
            Ok(instances) => instances,
            Err(e) => {
                error!(region = %e.region, "{e}");
                return CycleSummary { aborted: true, ..CycleSummary::default() };
            }
        };

        let limiter = (self.max_concurrent_fetches > 0)
            .then(|| Arc::new(Semaphore::new(self.max_concurrent_fetches)));

        let mut summary = CycleSummary {
            instances: instances.len(),
            ..CycleSummary::default()
        };

        let mut branches = JoinSet::new();
        for instance in instances {
            branches.spawn(collect_instance(
                Arc::clone(&self.source),
                instance,
                deadline,
                sink.clone(),
                limiter.clone(),
            ));
        }

        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(outcome) => {
                    summary.samples += outcome.samples;
                    summary.failed_fetches += usize::from(outcome.fetch_failed);
                }
                Err(e) => error!("instance task did not complete: {e}"),
            }
        }

        info!(
            instances = summary.instances,
            samples = summary.samples,
            failed_fetches = summary.failed_fetches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collection cycle complete"
        );
        summary
    }

    /// Lists all regions concurrently; the first failure wins.
    async fn discover(&self, deadline: Instant) -> Result<Vec<Instance>, DiscoveryError> {
        let per_region = try_join_all(self.source.regions().iter().map(|region| async move {
            let instances = timeout_at(deadline, self.source.list_instances(region, deadline))
                .await
                .unwrap_or_else(|_| Err(SourceError::DeadlineExceeded))
                .map_err(|source| DiscoveryError { region: region.clone(), source })?;
            info!(%region, "found {} database instances", instances.len());
            Ok::<_, DiscoveryError>(instances)
        }))
        .await?;

        Ok(per_region.into_iter().flatten().collect())
    }
}

async fn collect_instance(
    source: Arc<dyn TelemetrySource>,
    instance: Instance,
    deadline: Instant,
    sink: mpsc::UnboundedSender<MetricSample>,
    limiter: Option<Arc<Semaphore>>,
) -> InstanceOutcome {
    let mut outcome = InstanceOutcome::default();

    // The receiver outlives the cycle, a failed send only means nobody listens.
    if sink.send(health_sample(&instance)).is_ok() {
        outcome.samples += 1;
    }

    let _permit = match limiter {
        Some(limiter) => match timeout_at(deadline, limiter.acquire_owned()).await {
            Ok(Ok(permit)) => Some(permit),
            _ => {
                warn!(instance = %instance.name, "no fetch slot freed up before the deadline");
                outcome.fetch_failed = true;
                return outcome;
            }
        },
        None => None,
    };

    debug!(instance = %instance.name, "Fetching metrics for database instance");

    let fetched = timeout_at(
        deadline,
        source.fetch_instance_telemetry(&instance.region, &instance.id, deadline),
    )
    .await
    .unwrap_or_else(|_| Err(SourceError::DeadlineExceeded));

    let series = match fetched {
        Ok(series) => series,
        Err(e) => {
            warn!(
                instance = %instance.name,
                "failed to fetch metrics for database instance {}: {e}",
                instance.name
            );
            outcome.fetch_failed = true;
            return outcome;
        }
    };

    for s in &series {
        if let Some(sample) = node_sample(&instance, s) {
            if sink.send(sample).is_ok() {
                outcome.samples += 1;
            }
        }
    }

    outcome
}

/// `scaleway_rdb_uptime` sample of an instance, derived from its status only.
pub fn health_sample(instance: &Instance) -> MetricSample {
    MetricSample {
        kind: MetricKind::Uptime,
        labels: vec![
            instance.id.clone(),
            instance.name.clone(),
            instance.region.to_string(),
            instance.engine.clone(),
            instance.node_type.clone(),
        ],
        value: instance.status.health(),
    }
}

/// Node-level sample for one series: the value of its latest point. `None`
/// for series the schema does not know and for series without points.
pub fn node_sample(instance: &Instance, series: &TelemetrySeries) -> Option<MetricSample> {
    let Some(kind) = MetricKind::from_series_name(&series.name) else {
        warn!(instance = %instance.name, "unmapped scaleway metric: {}", series.name);
        return None;
    };

    let Some(point) = series.latest_point() else {
        warn!(instance = %instance.name, "no data were returned for the metric: {}", series.name);
        return None;
    };

    Some(MetricSample {
        kind,
        labels: vec![
            instance.id.clone(),
            instance.name.clone(),
            series.node().to_string(),
        ],
        value: point.value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InstanceStatus, TelemetryPoint};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn instance(status: InstanceStatus) -> Instance {
        Instance {
            id: "11111111-aaaa".into(),
            name: "orders".into(),
            region: Region::parse("fr-par").unwrap(),
            engine: "PostgreSQL-15".into(),
            node_type: "db-gp-xs".into(),
            status,
        }
    }

    fn series(name: &str, points: &[(i64, f64)]) -> TelemetrySeries {
        TelemetrySeries {
            name: name.into(),
            points: points
                .iter()
                .map(|(secs, value)| TelemetryPoint {
                    timestamp: Utc.timestamp_opt(*secs, 0).unwrap(),
                    value: *value,
                })
                .collect(),
            metadata: HashMap::from([("node".to_string(), "primary".to_string())]),
        }
    }

    #[test]
    fn test_health_sample_labels() {
        let sample = health_sample(&instance(InstanceStatus::Snapshotting));
        assert_eq!(sample.name(), "scaleway_rdb_uptime");
        assert_eq!(sample.value, 0.5);
        assert_eq!(sample.label("region"), Some("fr-par"));
        assert_eq!(sample.label("engine"), Some("PostgreSQL-15"));
        assert_eq!(sample.label("type"), Some("db-gp-xs"));
    }

    #[test]
    fn test_node_sample_takes_latest_point() {
        let sample = node_sample(
            &instance(InstanceStatus::Ready),
            &series("cpu_usage_percent", &[(200, 30.0), (100, 10.0)]),
        )
        .unwrap();
        assert_eq!(sample.kind, MetricKind::CpuUsage);
        assert_eq!(sample.value, 30.0);
        assert_eq!(sample.labels, vec!["11111111-aaaa", "orders", "primary"]);
    }

    #[test]
    fn test_node_sample_skips_unknown_and_empty() {
        let db = instance(InstanceStatus::Ready);
        assert!(node_sample(&db, &series("replication_lag_seconds", &[(1, 2.0)])).is_none());
        assert!(node_sample(&db, &series("mem_usage_percent", &[])).is_none());
        assert!(node_sample(&db, &series("mem_usage_percent", &[(1, 2.0)])).is_some());
    }
}
