//! bgav library crate: the versioning engine behind the `bgav` binary.
//!
//! Exposed so integration tests can drive whole sessions and the individual
//! stages (version algebra, descriptor patching, module walk) directly.

pub mod branch;
pub mod config;
pub mod error;
pub mod graph;
pub mod modify;
pub mod pom;
pub mod reconcile;
pub mod session;
pub mod telemetry;
pub mod version;
pub mod walk;

pub use error::{BgavError, Result};
pub use session::{ReconciliationSession, RunOptions, SessionReport};
