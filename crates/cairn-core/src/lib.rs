//! # Cairn Core Library
//!
//! A content-addressed artifact cache and run supervisor for external
//! electronic-structure calculations, built around stochastic conformer
//! sampling campaigns.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (keys,
//!   geometries, run records), the deterministic key-to-path mapping, and the
//!   artifact store that persists every run and result as plain files.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer supervises
//!   individual run instances. It includes the retry engine that walks a
//!   fallback matrix of program options, the feedback loop that restarts
//!   unconverged optimizations, filesystem leases for cross-process
//!   ownership, and Coulomb-spectrum deduplication of results.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level,
//!   user-facing layer. It ties the `engine` and `core` together to execute
//!   complete campaigns: populating a sample space, harvesting unique
//!   results, scanning coordinates, and running follow-up jobs at saved
//!   structures.

pub mod core;
pub mod engine;
pub mod workflows;

#[cfg(test)]
pub(crate) mod test_support;
