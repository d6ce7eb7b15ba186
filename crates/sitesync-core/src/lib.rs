//! Deployment logic for sitesync.
//!
//! This crate defines the "ports" (`SourceFetcher`, `SiteBuilder`,
//! `Publisher`, `Dispatcher`) that the infrastructure layer implements, plus
//! everything that can be decided without touching the network or a
//! subprocess: request authentication, event filtering, run orchestration and
//! the trigger service. It depends only on `sitesync-types`, never on
//! `sitesync-infra`.

pub mod auth;
pub mod dispatch;
pub mod filter;
pub mod pipeline;
pub mod retry;
pub mod trigger;
