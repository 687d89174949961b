// ABOUTME: Command sandbox: risk classification, allowlist, approval queue, audit trail, and execution.
// ABOUTME: The Sandbox orchestrator in engine.rs is the main entry point.

pub mod allowlist;
pub mod analysis;
pub mod audit;
pub mod classifier;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod policy;
pub mod queue;
pub mod runner;
pub(crate) mod store;
pub mod types;

pub use allowlist::*;
pub use analysis::*;
pub use audit::*;
pub use classifier::*;
pub use engine::*;
pub use error::*;
pub use policy::*;
pub use queue::*;
pub use runner::*;
pub use types::*;
