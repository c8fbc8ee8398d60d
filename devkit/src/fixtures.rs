//! Ready-made model values for tests.

use chrono::{TimeZone, Utc};
use scaleway_exporter::config::Config;
use scaleway_exporter::models::{Instance, InstanceStatus, Region, TelemetryPoint, TelemetrySeries};
use std::collections::HashMap;

/// Panics on a malformed region; fixtures are only fed literals.
pub fn region(name: &str) -> Region {
    Region::parse(name).unwrap_or_else(|| panic!("invalid region literal: {name}"))
}

pub fn instance(id: &str, name: &str, region_name: &str, status: InstanceStatus) -> Instance {
    Instance {
        id: id.to_string(),
        name: name.to_string(),
        region: region(region_name),
        engine: "PostgreSQL-15".to_string(),
        node_type: "db-dev-s".to_string(),
        status,
    }
}

/// Point at `secs` seconds after the Unix epoch.
pub fn point_at(secs: i64, value: f64) -> TelemetryPoint {
    TelemetryPoint {
        timestamp: Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| panic!("timestamp out of range: {secs}")),
        value,
    }
}

pub fn series(name: &str, node: &str, points: Vec<TelemetryPoint>) -> TelemetrySeries {
    TelemetrySeries {
        name: name.to_string(),
        points,
        metadata: HashMap::from([("node".to_string(), node.to_string())]),
    }
}

/// Config with dummy credentials, scoped to one region.
pub fn config_for(region_name: &str) -> Config {
    Config {
        scaleway_access_key: "SCWXXXXXXXXXXXXXXXXX".to_string(),
        scaleway_secret_key: "11111111-2222-3333-4444-555555555555".to_string(),
        scaleway_region: region_name.to_string(),
        ..Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures() {
        let db = instance("id-1", "orders", "nl-ams", InstanceStatus::Ready);
        assert_eq!(db.region.as_str(), "nl-ams");

        let s = series("cpu_usage_percent", "primary", vec![point_at(10, 1.5)]);
        assert_eq!(s.node(), "primary");
        assert_eq!(s.points[0].timestamp.timestamp(), 10);

        let cfg = config_for("fr-par");
        assert!(!cfg.scaleway_secret_key.is_empty());
        assert_eq!(cfg.http_port, 9706);
    }
}
