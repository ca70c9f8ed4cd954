//! High-level campaign workflows built on the store, the run supervisor,
//! and a geometry toolkit.

pub mod refine;
pub mod sample;
pub mod scan;
