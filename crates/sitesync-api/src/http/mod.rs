//! HTTP layer for sitesync.
//!
//! Axum-based endpoints for inbound triggers (`/sync`), forwarded runs
//! (`/worker/runs`) and liveness (`/health`), all answering with the
//! envelope response format.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
