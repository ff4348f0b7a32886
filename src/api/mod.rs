//! HTTP API Module
//!
//! Provides a REST API for failover status queries.

mod http;

pub use http::{HttpServer, StatusResponse, HealthResponse, LastChange};
