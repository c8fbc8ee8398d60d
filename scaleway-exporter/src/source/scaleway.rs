//! Scaleway RDB API client.

use super::{SourceError, TelemetrySource};
use crate::config::Config;
use crate::models::{Instance, Region, TelemetrySeries, Zone};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_API_URL: &str = "https://api.scaleway.com";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListInstancesResponse {
    #[serde(default)]
    instances: Vec<Instance>,
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct InstanceMetricsResponse {
    #[serde(default)]
    timeseries: Vec<TelemetrySeries>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

pub struct ScalewayClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    project_id: Option<String>,
    regions: Vec<Region>,
    zones: Vec<Zone>,
}

impl ScalewayClient {
    pub fn new(config: &Config) -> Result<Self, SourceError> {
        Self::with_base_url(config, DEFAULT_API_URL)
    }

    /// Same as [`ScalewayClient::new`] against another API root (fake servers in tests).
    pub fn with_base_url(config: &Config, base_url: impl Into<String>) -> Result<Self, SourceError> {
        if config.scaleway_access_key.is_empty() || config.scaleway_secret_key.is_empty() {
            return Err(SourceError::MissingCredentials);
        }

        let regions = if config.scaleway_region.trim().is_empty() {
            warn!("scaleway region is not set, default setting to ALL regions");
            Region::all()
        } else {
            let region = Region::parse(&config.scaleway_region)
                .ok_or_else(|| SourceError::InvalidRegion(config.scaleway_region.clone()))?;
            vec![region]
        };

        let zones = if config.scaleway_zone.trim().is_empty() {
            warn!("scaleway zone is not set, default setting to ALL zones");
            Zone::all()
        } else {
            let zone = Zone::parse(&config.scaleway_zone)
                .ok_or_else(|| SourceError::InvalidZone(config.scaleway_zone.clone()))?;
            vec![zone]
        };

        let project_id = Some(config.scaleway_project_id.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let http = reqwest::Client::builder()
            .user_agent(concat!("scaleway-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(
            regions = ?regions.iter().map(Region::as_str).collect::<Vec<_>>(),
            default_zone = %zones[0],
            project = project_id.as_deref().unwrap_or("*"),
            "Scaleway client ready"
        );

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: config.scaleway_secret_key.clone(),
            project_id,
            regions,
            zones,
        })
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        deadline: Instant,
    ) -> Result<T, SourceError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SourceError::DeadlineExceeded);
        }

        let response = self
            .http
            .get(url)
            .header("X-Auth-Token", &self.secret_key)
            .query(query)
            .timeout(remaining)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&body).chars().take(500).collect());
            return Err(SourceError::Upstream { status: status.as_u16(), message });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

fn map_transport_error(error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::DeadlineExceeded
    } else {
        SourceError::Http(error)
    }
}

#[async_trait]
impl TelemetrySource for ScalewayClient {
    fn regions(&self) -> &[Region] {
        &self.regions
    }

    async fn list_instances(
        &self,
        region: &Region,
        deadline: Instant,
    ) -> Result<Vec<Instance>, SourceError> {
        let url = format!("{}/rdb/v1/regions/{}/instances", self.base_url, region);
        let mut instances = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![("page", page.to_string()), ("page_size", PAGE_SIZE.to_string())];
            if let Some(project_id) = &self.project_id {
                query.push(("project_id", project_id.clone()));
            }

            let response: ListInstancesResponse = self.get_json(&url, &query, deadline).await?;
            let fetched = response.instances.len();
            instances.extend(response.instances);
            debug!(%region, page, fetched, total = ?response.total_count, "listed instance page");

            let exhausted = match response.total_count {
                Some(total) => instances.len() as u64 >= total,
                // without a count, a short page is the last one
                None => fetched < PAGE_SIZE as usize,
            };
            if fetched == 0 || exhausted {
                break;
            }
            page += 1;
        }

        Ok(instances)
    }

    async fn fetch_instance_telemetry(
        &self,
        region: &Region,
        instance_id: &str,
        deadline: Instant,
    ) -> Result<Vec<TelemetrySeries>, SourceError> {
        let url = format!(
            "{}/rdb/v1/regions/{}/instances/{}/metrics",
            self.base_url, region, instance_id
        );
        let response: InstanceMetricsResponse = self.get_json(&url, &[], deadline).await?;
        Ok(response.timeseries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(access: &str, secret: &str) -> Config {
        Config {
            scaleway_access_key: access.into(),
            scaleway_secret_key: secret.into(),
            ..Config::default()
        }
    }

    #[test]
    fn test_missing_credentials_is_fatal() {
        assert!(matches!(
            ScalewayClient::new(&config("", "secret")),
            Err(SourceError::MissingCredentials)
        ));
        assert!(matches!(
            ScalewayClient::new(&config("SCWXXXX", "")),
            Err(SourceError::MissingCredentials)
        ));
    }

    #[test]
    fn test_defaults_to_all_regions_and_zones() {
        let client = ScalewayClient::new(&config("SCWXXXX", "secret")).unwrap();
        assert_eq!(client.regions(), Region::all().as_slice());
        assert_eq!(client.zones(), Zone::all().as_slice());
        assert!(client.project_id.is_none());
    }

    #[test]
    fn test_configured_region_and_zone() {
        let mut cfg = config("SCWXXXX", "secret");
        cfg.scaleway_region = "nl-ams".into();
        cfg.scaleway_zone = "nl-ams-1".into();
        cfg.scaleway_project_id = "proj-1".into();
        let client = ScalewayClient::with_base_url(&cfg, "http://localhost:1/").unwrap();
        assert_eq!(client.regions().len(), 1);
        assert_eq!(client.regions()[0].as_str(), "nl-ams");
        assert_eq!(client.zones()[0].as_str(), "nl-ams-1");
        assert_eq!(client.base_url, "http://localhost:1");
        assert_eq!(client.project_id.as_deref(), Some("proj-1"));
    }

    #[test]
    fn test_invalid_region_rejected() {
        let mut cfg = config("SCWXXXX", "secret");
        cfg.scaleway_region = "paris".into();
        assert!(matches!(ScalewayClient::new(&cfg), Err(SourceError::InvalidRegion(r)) if r == "paris"));

        let mut cfg = config("SCWXXXX", "secret");
        cfg.scaleway_zone = "fr-par".into();
        assert!(matches!(ScalewayClient::new(&cfg), Err(SourceError::InvalidZone(_))));
    }

    #[tokio::test]
    async fn test_expired_deadline_short_circuits() {
        let client = ScalewayClient::with_base_url(&config("SCWXXXX", "secret"), "http://127.0.0.1:9").unwrap();
        let region = Region::parse("fr-par").unwrap();
        let result = client.list_instances(&region, Instant::now()).await;
        assert!(matches!(result, Err(SourceError::DeadlineExceeded)));
    }
}
