pub mod config;
pub mod encoder;
pub mod events;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, ServerConfig,
};
pub use encoder::{
    build_args, EncoderConfig, EncoderError, FfmpegSupervisor, FfprobeInspector, Inspector,
    JobRunner, MediaInfo,
};
pub use events::{EventBus, EventKind, JobEvent, Subscription};
pub use job::{
    ConversionSettings, ErrorCode, Job, JobError, JobId, JobResult, JobStatus, OutputFormat,
    ProgressSnapshot, QualityTier,
};
pub use orchestrator::{
    JobFilter, Orchestrator, OrchestratorError, OrchestratorStatus, QueueConfig, SubmitRequest,
};
