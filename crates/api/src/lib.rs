//! HTTP API: routing, request parsing and error mapping for the job service.

pub mod app;
