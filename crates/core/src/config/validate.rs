use super::{types::Config, ConfigError};
use crate::orchestrator::{MAX_CONCURRENT, MIN_CONCURRENT};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Queue concurrency is within the supported range
/// - Encoder paths are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Queue validation
    let max = config.queue.max_concurrent;
    if !(MIN_CONCURRENT..=MAX_CONCURRENT).contains(&max) {
        return Err(ConfigError::ValidationError(format!(
            "queue.max_concurrent must be between {} and {}, got {}",
            MIN_CONCURRENT, MAX_CONCURRENT, max
        )));
    }
    if config.queue.retention_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "queue.retention_secs cannot be 0".to_string(),
        ));
    }

    // Encoder validation
    if config.encoder.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "encoder.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if config.encoder.max_runtime_secs == Some(0) {
        return Err(ConfigError::ValidationError(
            "encoder.max_runtime_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                port: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_concurrency_range() {
        let mut config = Config::default();
        config.queue.max_concurrent = 0;
        assert!(validate_config(&config).is_err());

        config.queue.max_concurrent = 9;
        assert!(validate_config(&config).is_err());

        config.queue.max_concurrent = 8;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_runtime_limit() {
        let mut config = Config::default();
        config.encoder.max_runtime_secs = Some(0);
        assert!(validate_config(&config).is_err());
    }
}
