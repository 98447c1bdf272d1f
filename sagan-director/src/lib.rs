//! SAGAN Director - Research Loop Orchestration
//!
//! The top-level control loop of the SAGAN research core:
//! - Typed worker-agent messages with correlation ids
//! - Pending-request registry for in-flight asynchronous work
//! - A deterministic per-tick action decision tree
//! - Strategy-effectiveness tracking for design hints
//! - Worker failure absorption with bounded escalation
//! - Convergence evaluation, report export, and cancellation

pub mod actions;
pub mod config;
pub mod director;
pub mod messages;
pub mod registry;
pub mod report;
pub mod strategy;
pub mod telemetry;
pub mod worker;

pub use actions::{next_action, DirectorAction, LoopView};
pub use config::{RunConfig, RunConfigError};
pub use director::{Director, RunOutcome};
pub use messages::{
    RequestPayload, ResponseOutcome, ResponsePayload, WorkerRequest, WorkerResponse,
};
pub use registry::{PendingRequest, PendingRequests};
pub use report::{MemorySink, ReportSink, TracingSink};
pub use strategy::{StrategyRecord, StrategyStats};
pub use telemetry::init_telemetry;
pub use worker::{WorkerAgent, WorkerSet};
