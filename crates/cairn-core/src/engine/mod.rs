//! Contains the execution machinery: engines, retries, leases, and
//! deduplication.

pub mod compute;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod feedback;
pub mod lease;
pub mod options;
pub mod progress;
pub mod retry;
pub mod run;
pub mod toolkit;
