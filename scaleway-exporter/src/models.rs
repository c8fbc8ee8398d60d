//! Scaleway RDB data model: instances, lifecycle status, telemetry series.
//!
//! These types mirror the JSON shapes of the `rdb/v1` API closely enough to be
//! deserialized directly from the responses; nothing here performs I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Health score of a fully operational instance.
pub const HEALTH_UP: f64 = 1.0;
/// Health score of an instance in a transitional state (healing, restarting...).
pub const HEALTH_DEGRADED: f64 = 0.5;
/// Health score of an unavailable instance, and of any status we do not know.
pub const HEALTH_DOWN: f64 = 0.0;

/// Regions served by the RDB product.
pub const KNOWN_REGIONS: [&str; 3] = ["fr-par", "nl-ams", "pl-waw"];

/// Availability zones of the known regions.
pub const KNOWN_ZONES: [&str; 9] = [
    "fr-par-1", "fr-par-2", "fr-par-3",
    "nl-ams-1", "nl-ams-2", "nl-ams-3",
    "pl-waw-1", "pl-waw-2", "pl-waw-3",
];

/// A Scaleway region, e.g. `fr-par`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    /// Parses `xx-yyy` (two letters, dash, three letters).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        let (country, city) = raw.split_once('-')?;
        let letters = |s: &str, n: usize| s.len() == n && s.chars().all(|c| c.is_ascii_lowercase());
        if letters(country, 2) && letters(city, 3) {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn all() -> Vec<Self> {
        KNOWN_REGIONS.iter().map(|r| Self((*r).to_string())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Scaleway availability zone, e.g. `fr-par-1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone(String);

impl Zone {
    /// Parses `<region>-<digit>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        let (region, index) = raw.rsplit_once('-')?;
        let valid_index = index.len() == 1 && index.chars().all(|c| ('1'..='9').contains(&c));
        if valid_index && Region::parse(region).is_some() {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn all() -> Vec<Self> {
        KNOWN_ZONES.iter().map(|z| Self((*z).to_string())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an RDB instance.
///
/// Any value the API adds later deserializes to [`InstanceStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Ready,
    Backuping,
    Autohealing,
    Provisioning,
    Configuring,
    Deleting,
    Snapshotting,
    Restarting,
    Error,
    Locked,
    Initializing,
    DiskFull,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 13] = [
        InstanceStatus::Ready,
        InstanceStatus::Backuping,
        InstanceStatus::Autohealing,
        InstanceStatus::Provisioning,
        InstanceStatus::Configuring,
        InstanceStatus::Deleting,
        InstanceStatus::Snapshotting,
        InstanceStatus::Restarting,
        InstanceStatus::Error,
        InstanceStatus::Locked,
        InstanceStatus::Initializing,
        InstanceStatus::DiskFull,
        InstanceStatus::Unknown,
    ];

    /// Health score exported as `scaleway_rdb_uptime`.
    pub fn health(self) -> f64 {
        match self {
            InstanceStatus::Ready | InstanceStatus::Backuping => HEALTH_UP,
            InstanceStatus::Autohealing
            | InstanceStatus::Provisioning
            | InstanceStatus::Configuring
            | InstanceStatus::Deleting
            | InstanceStatus::Snapshotting
            | InstanceStatus::Restarting => HEALTH_DEGRADED,
            InstanceStatus::Error
            | InstanceStatus::Locked
            | InstanceStatus::Initializing
            | InstanceStatus::DiskFull
            | InstanceStatus::Unknown => HEALTH_DOWN,
        }
    }
}

impl Default for InstanceStatus {
    fn default() -> Self {
        InstanceStatus::Unknown
    }
}

/// One managed database instance as returned by `ListInstances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub region: Region,
    #[serde(default)]
    pub engine: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub status: InstanceStatus,
}

/// A single `(timestamp, value)` measurement. The API encodes it as a
/// two-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(DateTime<Utc>, f64)", into = "(DateTime<Utc>, f64)")]
pub struct TelemetryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl From<(DateTime<Utc>, f64)> for TelemetryPoint {
    fn from((timestamp, value): (DateTime<Utc>, f64)) -> Self {
        Self { timestamp, value }
    }
}

impl From<TelemetryPoint> for (DateTime<Utc>, f64) {
    fn from(point: TelemetryPoint) -> Self {
        (point.timestamp, point.value)
    }
}

/// A named time series for one node of an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySeries {
    pub name: String,
    #[serde(default)]
    pub points: Vec<TelemetryPoint>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TelemetrySeries {
    /// Node the series was measured on; empty when the API omits it.
    pub fn node(&self) -> &str {
        self.metadata.get("node").map(String::as_str).unwrap_or_default()
    }

    /// Chronologically latest point. When several points share the latest
    /// timestamp, the first of them in response order wins.
    pub fn latest_point(&self) -> Option<&TelemetryPoint> {
        self.points.iter().reduce(|latest, point| {
            if point.timestamp > latest.timestamp { point } else { latest }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_health_mapping_is_total() {
        for status in InstanceStatus::ALL {
            let health = status.health();
            assert!(
                [HEALTH_UP, HEALTH_DEGRADED, HEALTH_DOWN].contains(&health),
                "{status:?} -> {health}"
            );
        }
        assert_eq!(InstanceStatus::Ready.health(), 1.0);
        assert_eq!(InstanceStatus::Backuping.health(), 1.0);
        assert_eq!(InstanceStatus::Autohealing.health(), 0.5);
        assert_eq!(InstanceStatus::Restarting.health(), 0.5);
        assert_eq!(InstanceStatus::DiskFull.health(), 0.0);
        assert_eq!(InstanceStatus::Unknown.health(), 0.0);
    }

    #[test]
    fn test_unrecognized_status_fails_safe() {
        let status: InstanceStatus = serde_json::from_str("\"upgrading_to_quantum\"").unwrap();
        assert_eq!(status, InstanceStatus::Unknown);
        assert_eq!(status.health(), HEALTH_DOWN);

        let status: InstanceStatus = serde_json::from_str("\"disk_full\"").unwrap();
        assert_eq!(status, InstanceStatus::DiskFull);
    }

    #[test]
    fn test_instance_from_api_json() {
        let instance: Instance = serde_json::from_value(serde_json::json!({
            "id": "7c1a",
            "name": "orders-db",
            "region": "fr-par",
            "engine": "PostgreSQL-15",
            "node_type": "db-dev-s",
            "status": "autohealing",
            "tags": ["prod"]
        }))
        .unwrap();
        assert_eq!(instance.region.as_str(), "fr-par");
        assert_eq!(instance.status, InstanceStatus::Autohealing);
        assert_eq!(instance.node_type, "db-dev-s");
    }

    #[test]
    fn test_series_points_from_arrays() {
        let series: TelemetrySeries = serde_json::from_value(serde_json::json!({
            "name": "cpu_usage_percent",
            "points": [["2024-03-01T10:00:00Z", 12.5], ["2024-03-01T10:01:00Z", 13.0]],
            "metadata": {"node": "primary"}
        }))
        .unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[1].value, 13.0);
        assert_eq!(series.node(), "primary");
    }

    #[test]
    fn test_latest_point_ignores_response_order() {
        let series = TelemetrySeries {
            name: "cpu_usage_percent".into(),
            points: vec![
                TelemetryPoint { timestamp: at(30), value: 3.0 },
                TelemetryPoint { timestamp: at(90), value: 9.0 },
                TelemetryPoint { timestamp: at(60), value: 6.0 },
            ],
            metadata: HashMap::new(),
        };
        assert_eq!(series.latest_point().map(|p| p.value), Some(9.0));
        assert_eq!(series.node(), "");
    }

    #[test]
    fn test_latest_point_tie_keeps_first() {
        let series = TelemetrySeries {
            name: "total_connections".into(),
            points: vec![
                TelemetryPoint { timestamp: at(10), value: 1.0 },
                TelemetryPoint { timestamp: at(50), value: 42.0 },
                TelemetryPoint { timestamp: at(50), value: 7.0 },
            ],
            metadata: HashMap::new(),
        };
        assert_eq!(series.latest_point().map(|p| p.value), Some(42.0));
    }

    #[test]
    fn test_latest_point_empty() {
        let series = TelemetrySeries {
            name: "disk_usage_percent".into(),
            points: vec![],
            metadata: HashMap::new(),
        };
        assert!(series.latest_point().is_none());
    }

    #[test]
    fn test_region_and_zone_parsing() {
        assert_eq!(Region::parse("FR-PAR").map(|r| r.to_string()), Some("fr-par".into()));
        assert!(Region::parse("france").is_none());
        assert!(Region::parse("fr-par-1").is_none());
        assert_eq!(Zone::parse("nl-ams-2").map(|z| z.to_string()), Some("nl-ams-2".into()));
        assert!(Zone::parse("nl-ams").is_none());
        assert!(Zone::parse("nl-ams-0").is_none());
        assert_eq!(Region::all().len(), KNOWN_REGIONS.len());
        assert_eq!(Zone::all().len(), KNOWN_ZONES.len());
    }
}
