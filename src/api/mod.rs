//! HTTP endpoints for triggering sweeps and monitoring the service

pub mod routes;

pub use routes::{router, ApiState, HttpServer, HttpServerConfig, SWEEP_PATH};
