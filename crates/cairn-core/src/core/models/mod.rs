//! Defines the domain data model: keys, structures, and persisted records.

pub mod geometry;
pub mod key;
pub mod record;
