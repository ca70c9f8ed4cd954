//! Contains the foundational data structures and storage layer.

pub mod models;
pub mod store;
pub mod utils;
