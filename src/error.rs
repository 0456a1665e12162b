use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("exporter error: {0}")]
    Exporter(String),

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("subscriber error: {0}")]
    Subscriber(String),

    #[error("shutdown error: {0}")]
    Shutdown(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_lists_every_failure() {
        let err = ObservabilityError::InvalidConfig(vec![
            "service_name is required".to_string(),
            "sampling_ratio must be between 0 and 1".to_string(),
        ]);

        assert_eq!(
            err.to_string(),
            "invalid configuration: service_name is required; sampling_ratio must be between 0 and 1"
        );
    }
}
