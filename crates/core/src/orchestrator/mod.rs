//! Job orchestrator.
//!
//! Owns the job table and admits queued jobs to the encoder in priority
//! order, never running more than the concurrency limit at once:
//! - **Submission**: validated on the caller's task, then queued
//! - **Scheduling**: a single task admits jobs whenever a slot frees up
//! - **Supervision**: delegated to a [`JobRunner`](crate::encoder::JobRunner)

mod config;
mod queue;
mod runner;
mod scheduler;
mod types;

pub use config::{clamp_concurrency, QueueConfig, MAX_CONCURRENT, MIN_CONCURRENT};
pub use queue::WaitList;
pub use runner::Orchestrator;
pub use types::{JobFilter, OrchestratorError, OrchestratorStatus, SubmitRequest};
