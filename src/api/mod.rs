//! HTTP API Module
//!
//! Control-plane stub serving virtual bucket lookups over HTTP.

mod http;

pub use http::{ApiError, AppState, ControlPlaneServer, HealthResponse, REQUEST_ID_HEADER};
