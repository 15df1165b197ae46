//! `xlbench-harness`: Orchestrator, comparison engine and scoring.
//!
//! Loads the fixture manifest, runs every (fixture, adapter) unit on a
//! bounded worker pool, compares canonical payloads and grades each
//! operation 0-3. Run-level failures are [`HarnessError`]s; everything
//! below that is recorded in the returned [`BenchmarkResults`].
//!
//! [`BenchmarkResults`]: xlbench_model::BenchmarkResults

pub mod compare;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod gating;
pub mod isolation;
pub mod logger;
pub mod orchestrator;
pub mod pool;
pub mod probe;
pub mod replay;
pub mod report;
pub mod scoring;
pub mod unit;

pub use compare::{compare, Comparator, DEFAULT_EPSILON};
pub use config::BenchConfig;
pub use error::HarnessError;
pub use gating::Gate;
pub use orchestrator::Orchestrator;
pub use scoring::{score, EdgeOnlyPolicy};
pub use unit::{run_unit, UnitRequest};
