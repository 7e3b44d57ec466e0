//! Conversion job records.
//!
//! A [`Job`] captures one conversion request from submission to its terminal
//! status. Status changes go through [`Job::transition_to`], which enforces
//! the state machine:
//!
//! ```text
//! pending -> queued -> processing -> completed | failed | cancelled
//! pending | queued -> cancelled
//! ```

mod settings;
mod types;

pub use settings::{
    ConversionSettings, EffectiveSettings, OutputFormat, QualityTier, Resolution, TrimWindow,
};
pub use types::{
    ErrorCode, InvalidTransition, Job, JobError, JobId, JobResult, JobStatus, ProgressSnapshot,
    DEFAULT_MAX_RETRIES,
};
