//! Shared domain types for sitesync.
//!
//! This crate contains the types passed between the trigger, the dispatcher
//! and the deployment pipeline: inbound requests, parsed webhook events,
//! deploy triggers, run reports, tuning configuration and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod request;
pub mod run;
pub mod trigger;
