/*!
In-memory `TelemetrySource` for collector tests.

Instances and series are scripted up front with the builder methods. Regions
and instances can be told to fail right away or to never answer, so deadline
and abort paths can be driven without a network. Every call is recorded.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use scaleway_exporter::models::{Instance, Region, TelemetrySeries};
use scaleway_exporter::source::{SourceError, TelemetrySource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::fixtures;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    ListInstances(Region),
    FetchTelemetry(String),
}

#[derive(Default)]
pub struct MockTelemetrySource {
    regions: Vec<Region>,
    instances: HashMap<Region, Vec<Instance>>,
    telemetry: HashMap<String, Vec<TelemetrySeries>>,
    failing_regions: HashSet<Region>,
    stalled_regions: HashSet<Region>,
    failing_instances: HashSet<String>,
    stalled_instances: HashSet<String>,
    fetch_delay: Option<Duration>,
    calls: Mutex<Vec<SourceCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTelemetrySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a region even if it holds no instance.
    pub fn with_region(mut self, name: &str) -> Self {
        self.add_region(fixtures::region(name));
        self
    }

    /// Adds an instance to its region, declaring the region if needed.
    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.add_region(instance.region.clone());
        self.instances
            .entry(instance.region.clone())
            .or_default()
            .push(instance);
        self
    }

    pub fn with_series(mut self, instance_id: &str, series: TelemetrySeries) -> Self {
        self.telemetry
            .entry(instance_id.to_string())
            .or_default()
            .push(series);
        self
    }

    /// Listing this region answers an upstream error immediately.
    pub fn failing_region(mut self, name: &str) -> Self {
        let region = fixtures::region(name);
        self.add_region(region.clone());
        self.failing_regions.insert(region);
        self
    }

    /// Listing this region never completes.
    pub fn stalled_region(mut self, name: &str) -> Self {
        let region = fixtures::region(name);
        self.add_region(region.clone());
        self.stalled_regions.insert(region);
        self
    }

    pub fn failing_instance(mut self, instance_id: &str) -> Self {
        self.failing_instances.insert(instance_id.to_string());
        self
    }

    /// Fetching this instance's telemetry never completes.
    pub fn stalled_instance(mut self, instance_id: &str) -> Self {
        self.stalled_instances.insert(instance_id.to_string());
        self
    }

    /// Every telemetry fetch sleeps this long before answering.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, SourceCall::FetchTelemetry(_)))
            .count()
    }

    /// Highest number of telemetry fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn add_region(&mut self, region: Region) {
        if !self.regions.contains(&region) {
            self.regions.push(region);
        }
    }
}

// Decrements the in-flight counter even when the fetch future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    fn regions(&self) -> &[Region] {
        &self.regions
    }

    async fn list_instances(
        &self,
        region: &Region,
        _deadline: Instant,
    ) -> Result<Vec<Instance>, SourceError> {
        self.calls.lock().push(SourceCall::ListInstances(region.clone()));

        if self.failing_regions.contains(region) {
            return Err(SourceError::Upstream {
                status: 503,
                message: format!("region {region} unavailable"),
            });
        }
        if self.stalled_regions.contains(region) {
            std::future::pending::<()>().await;
        }

        Ok(self.instances.get(region).cloned().unwrap_or_default())
    }

    async fn fetch_instance_telemetry(
        &self,
        _region: &Region,
        instance_id: &str,
        _deadline: Instant,
    ) -> Result<Vec<TelemetrySeries>, SourceError> {
        self.calls
            .lock()
            .push(SourceCall::FetchTelemetry(instance_id.to_string()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_instances.contains(instance_id) {
            return Err(SourceError::Upstream {
                status: 500,
                message: format!("metrics of {instance_id} unavailable"),
            });
        }
        if self.stalled_instances.contains(instance_id) {
            std::future::pending::<()>().await;
        }

        Ok(self.telemetry.get(instance_id).cloned().unwrap_or_default())
    }
}
