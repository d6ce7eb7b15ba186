//! Observability setup for sitesync: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
