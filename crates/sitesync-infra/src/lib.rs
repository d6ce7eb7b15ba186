//! Infrastructure layer for sitesync.
//!
//! Contains implementations of the pipeline ports defined in `sitesync-core`:
//! archive and git source fetchers, the command-driven site builder, the
//! rsync publisher and the HTTP worker dispatcher. Also owns configuration
//! loading (environment and the optional TOML tuning file).

pub mod build;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod publish;
