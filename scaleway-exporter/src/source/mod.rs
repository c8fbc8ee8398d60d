/*!
Telemetry sources - where instances and their time series come from.

A source answers two questions for the collector: which RDB instances exist in
a region, and what telemetry one instance currently reports. Authentication,
region defaults and transport stay behind the trait; the collector only ever
sees [`Instance`] and [`TelemetrySeries`] values.

Every call receives the cycle deadline. Implementations should stop waiting
once it has passed; the collector also enforces it around each call.
*/

pub mod scaleway;

use crate::models::{Instance, Region, TelemetrySeries};
use async_trait::async_trait;
use tokio::time::Instant;

pub use scaleway::ScalewayClient;

/// Failures a source can report.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Scaleway access key and secret key must be set")]
    MissingCredentials,
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    #[error("Invalid zone: {0}")]
    InvalidZone(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

/// Read-only view of the managed database inventory and its telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Regions to discover instances in, resolved once at construction.
    fn regions(&self) -> &[Region];

    /// Every instance of `region`, all pages included.
    async fn list_instances(
        &self,
        region: &Region,
        deadline: Instant,
    ) -> Result<Vec<Instance>, SourceError>;

    /// Current telemetry of one instance, one series per metric and node.
    /// Never retried.
    async fn fetch_instance_telemetry(
        &self,
        region: &Region,
        instance_id: &str,
        deadline: Instant,
    ) -> Result<Vec<TelemetrySeries>, SourceError>;
}
