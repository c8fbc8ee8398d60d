/*!
# Scaleway Exporter DevKit - Test doubles and helpers

Lets the exporter be exercised without a Scaleway account:
- `MockTelemetrySource`: in-memory source with scripted failures and stalls
- `FakeScalewayApi`: local HTTP server speaking the `rdb/v1` JSON shapes
- fixtures for instances, series and points
- `TestHarness`: runs one collection cycle and queries its samples
*/

pub mod fake_api;
pub mod fixtures;
pub mod mock_source;
pub mod test_utils;

pub use fake_api::{FakeScalewayApi, RecordedRequest};
pub use mock_source::{MockTelemetrySource, SourceCall};
pub use test_utils::{init_tracing, CycleReport, TestHarness};
