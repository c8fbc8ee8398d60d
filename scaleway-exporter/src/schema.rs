//! Exported metric schema.
//!
//! One row per metric family: exported name, help text, label names, and the
//! upstream series name it is fed from. The collector looks series up here;
//! the exposition layer builds its gauge families from the same table.

use serde::Serialize;

/// Labels carried by instance-level samples.
pub const INSTANCE_LABELS: [&str; 5] = ["id", "name", "region", "engine", "type"];

/// Labels carried by node-level samples.
pub const NODE_LABELS: [&str; 3] = ["id", "name", "node"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Uptime,
    CpuUsage,
    MemoryUsage,
    TotalConnections,
    DiskUsage,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricDescriptor {
    pub kind: MetricKind,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
    /// Series name in the `GetInstanceMetrics` response, `None` for metrics
    /// derived from discovery data.
    pub source_series: Option<&'static str>,
}

/// Rows are ordered like the [`MetricKind`] variants.
pub static SCHEMA: [MetricDescriptor; 5] = [
    MetricDescriptor {
        kind: MetricKind::Uptime,
        name: "scaleway_rdb_uptime",
        help: "If 1 the database is up and running, 0.5 in auto healing, 0 otherwise",
        labels: &INSTANCE_LABELS,
        source_series: None,
    },
    MetricDescriptor {
        kind: MetricKind::CpuUsage,
        name: "scaleway_rdb_cpu_usage_percent",
        help: "RDB CPU percentage usage",
        labels: &NODE_LABELS,
        source_series: Some("cpu_usage_percent"),
    },
    MetricDescriptor {
        kind: MetricKind::MemoryUsage,
        name: "scaleway_rdb_memory_usage_percent",
        help: "RDB memory percentage usage",
        labels: &NODE_LABELS,
        source_series: Some("mem_usage_percent"),
    },
    MetricDescriptor {
        kind: MetricKind::TotalConnections,
        name: "scaleway_rdb_total_connections",
        help: "RDB connection count",
        labels: &NODE_LABELS,
        source_series: Some("total_connections"),
    },
    MetricDescriptor {
        kind: MetricKind::DiskUsage,
        // Kept as-is for dashboard compatibility, despite the odd prefix.
        name: "scaleway_database_disk_usage_percent",
        help: "RDB disk percentage usage",
        labels: &NODE_LABELS,
        source_series: Some("disk_usage_percent"),
    },
];

impl MetricKind {
    pub fn descriptor(self) -> &'static MetricDescriptor {
        &SCHEMA[self as usize]
    }

    /// Maps an upstream series name to the metric it feeds.
    pub fn from_series_name(series: &str) -> Option<Self> {
        SCHEMA
            .iter()
            .find(|d| d.source_series == Some(series))
            .map(|d| d.kind)
    }
}

/// One exported measurement. `labels` holds values in the order of the
/// descriptor's label names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub labels: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn name(&self) -> &'static str {
        self.kind.descriptor().name
    }

    /// Value of a label by name, `None` if the metric does not carry it.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.kind
            .descriptor()
            .labels
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_name_lookup() {
        assert_eq!(MetricKind::from_series_name("cpu_usage_percent"), Some(MetricKind::CpuUsage));
        assert_eq!(MetricKind::from_series_name("mem_usage_percent"), Some(MetricKind::MemoryUsage));
        assert_eq!(MetricKind::from_series_name("total_connections"), Some(MetricKind::TotalConnections));
        assert_eq!(MetricKind::from_series_name("disk_usage_percent"), Some(MetricKind::DiskUsage));
        assert_eq!(MetricKind::from_series_name("replication_lag"), None);
        assert_eq!(MetricKind::from_series_name(""), None);
    }

    #[test]
    fn test_descriptor_per_kind() {
        for (index, row) in SCHEMA.iter().enumerate() {
            assert_eq!(row.kind as usize, index);
            assert_eq!(row.kind.descriptor().name, row.name);
        }
        assert_eq!(MetricKind::Uptime.descriptor().labels, &INSTANCE_LABELS);
        assert_eq!(MetricKind::DiskUsage.descriptor().labels, &NODE_LABELS);
    }

    #[test]
    fn test_sample_label_lookup() {
        let sample = MetricSample {
            kind: MetricKind::CpuUsage,
            labels: vec!["id-1".into(), "orders".into(), "primary".into()],
            value: 30.0,
        };
        assert_eq!(sample.name(), "scaleway_rdb_cpu_usage_percent");
        assert_eq!(sample.label("node"), Some("primary"));
        assert_eq!(sample.label("region"), None);
    }
}
