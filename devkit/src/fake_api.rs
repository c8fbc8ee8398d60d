/*!
Fake Scaleway API - local axum server speaking the RDB `v1` JSON shapes.

Serves:
- `GET /rdb/v1/regions/{region}/instances`            paginated, `project_id` filter
- `GET /rdb/v1/regions/{region}/instances/{id}/metrics`

Requests are recorded with their query and `X-Auth-Token` so tests can check
what the client actually sent. The server stops when the value is dropped.
*/

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use scaleway_exporter::models::{Instance, TelemetrySeries};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub auth_token: Option<String>,
}

#[derive(Default)]
struct FakeState {
    // region -> instance JSON objects, listing order
    instances: Mutex<HashMap<String, Vec<Value>>>,
    metrics: Mutex<HashMap<String, Value>>,
    region_errors: Mutex<HashMap<String, (StatusCode, String)>>,
    page_size: Mutex<Option<usize>>,
    omit_total_count: Mutex<bool>,
    metrics_delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeState {
    fn record(&self, path: String, query: HashMap<String, String>, headers: &HeaderMap) {
        let auth_token = headers
            .get("x-auth-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().push(RecordedRequest { path, query, auth_token });
    }
}

pub struct FakeScalewayApi {
    base_url: String,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeScalewayApi {
    /// Binds `127.0.0.1:0` and starts serving in the background.
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(FakeState::default());

        let app = Router::new()
            .route("/rdb/v1/regions/{region}/instances", get(list_instances))
            .route("/rdb/v1/regions/{region}/instances/{id}/metrics", get(instance_metrics))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("fake scaleway api stopped: {e}");
            }
        });

        tracing::debug!("fake scaleway api listening on {addr}");
        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            server,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn add_instance(&self, instance: &Instance) {
        self.push_instance(instance, None);
    }

    /// Instance owned by `project_id`, only listed without filter or with that filter.
    pub fn add_project_instance(&self, project_id: &str, instance: &Instance) {
        self.push_instance(instance, Some(project_id));
    }

    pub fn set_series(&self, instance_id: &str, series: &[TelemetrySeries]) {
        self.set_raw_metrics(instance_id, json!({ "timeseries": series }));
    }

    /// Metrics body served verbatim, for payloads the model cannot produce.
    pub fn set_raw_metrics(&self, instance_id: &str, body: Value) {
        self.state.metrics.lock().insert(instance_id.to_string(), body);
    }

    /// Listing `region` answers `status` with a Scaleway-style error body.
    pub fn fail_region(&self, region: &str, status: u16, message: &str) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.state
            .region_errors
            .lock()
            .insert(region.to_string(), (status, message.to_string()));
    }

    /// Caps page sizes below what the client asks for.
    pub fn set_page_size(&self, page_size: usize) {
        *self.state.page_size.lock() = Some(page_size.max(1));
    }

    /// Listing responses leave out `total_count`.
    pub fn omit_total_count(&self) {
        *self.state.omit_total_count.lock() = true;
    }

    pub fn set_metrics_delay(&self, delay: Duration) {
        *self.state.metrics_delay.lock() = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    fn push_instance(&self, instance: &Instance, project_id: Option<&str>) {
        let mut body = json!(instance);
        if let (Some(project_id), Some(fields)) = (project_id, body.as_object_mut()) {
            fields.insert("project_id".to_string(), json!(project_id));
        }
        self.state
            .instances
            .lock()
            .entry(instance.region.to_string())
            .or_default()
            .push(body);
    }
}

impl Drop for FakeScalewayApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "type": "fake_error", "message": message }))).into_response()
}

async fn list_instances(
    State(state): State<Arc<FakeState>>,
    Path(region): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.record(format!("/rdb/v1/regions/{region}/instances"), query.clone(), &headers);

    if let Some((status, message)) = state.region_errors.lock().get(&region).cloned() {
        return error_body(status, &message);
    }

    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1).max(1);
    let requested: usize = query.get("page_size").and_then(|p| p.parse().ok()).unwrap_or(100);
    let page_size = match *state.page_size.lock() {
        Some(cap) => requested.min(cap),
        None => requested,
    }
    .max(1);

    let project_filter = query.get("project_id");
    let matching: Vec<Value> = state
        .instances
        .lock()
        .get(&region)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|i| match project_filter {
            Some(project) => i.get("project_id").and_then(Value::as_str) == Some(project.as_str()),
            None => true,
        })
        .collect();

    let total_count = matching.len();
    let instances: Vec<Value> = matching
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    if *state.omit_total_count.lock() {
        return Json(json!({ "instances": instances })).into_response();
    }
    Json(json!({ "instances": instances, "total_count": total_count })).into_response()
}

async fn instance_metrics(
    State(state): State<Arc<FakeState>>,
    Path((region, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.record(format!("/rdb/v1/regions/{region}/instances/{id}/metrics"), query, &headers);

    let delay = *state.metrics_delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let body = state.metrics.lock().get(&id).cloned();
    match body {
        Some(body) => Json(body).into_response(),
        None => error_body(StatusCode::NOT_FOUND, &format!("instance {id} not found")),
    }
}
