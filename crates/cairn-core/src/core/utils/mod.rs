//! Provides small shared utilities for the core layer.

pub mod elements;
pub mod ids;
