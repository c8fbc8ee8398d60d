//! Scaleway Exporter - Prometheus exporter for Scaleway managed databases.
//!
//! Every scrape runs one collection cycle: the RDB instances of all configured
//! regions are listed, their telemetry is fetched concurrently under one
//! deadline, and the result is mapped onto a fixed metric schema.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod models;
pub mod schema;
pub mod source;
