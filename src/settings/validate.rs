use url::Url;

use super::ObservabilityConfig;
use crate::{error::ObservabilityError, Result};

impl ObservabilityConfig {
    /// 校验配置，返回所有失败信息；空列表表示配置有效。
    ///
    /// 每一项检查都会执行，不会在第一个错误处停止。
    pub fn validate(&self) -> Vec<String> {
        let mut failures = Vec::new();

        if self.service_name.trim().is_empty() {
            failures.push("service_name is required".to_string());
        }

        if self.collector_endpoint.trim().is_empty() {
            failures.push("collector_endpoint is required".to_string());
        } else if !is_absolute_uri(&self.collector_endpoint) {
            failures.push("collector_endpoint must be a valid URI".to_string());
        }

        if !(0.0..=1.0).contains(&self.tracing.sampling_ratio) {
            failures.push("sampling_ratio must be between 0 and 1".to_string());
        }

        let overrides = [
            ("tracing", &self.tracing.collector_endpoint),
            ("metrics", &self.metrics.collector_endpoint),
            ("logging", &self.logging.collector_endpoint),
        ];
        for (pipeline, endpoint) in overrides {
            if let Some(endpoint) = endpoint {
                if !is_absolute_uri(endpoint) {
                    failures.push(format!("{pipeline}.collector_endpoint must be a valid URI"));
                }
            }
        }

        if self.metrics.prometheus_enabled && !self.metrics.prometheus_endpoint.starts_with('/') {
            failures.push("metrics.prometheus_endpoint must start with '/'".to_string());
        }

        failures
    }

    /// 校验失败时返回 [`ObservabilityError::InvalidConfig`]
    pub fn ensure_valid(&self) -> Result<()> {
        let failures = self.validate();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ObservabilityError::InvalidConfig(failures))
        }
    }
}

fn is_absolute_uri(value: &str) -> bool {
    Url::parse(value.trim()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATIO_MESSAGE: &str = "sampling_ratio must be between 0 and 1";

    #[test]
    fn default_config_is_valid() {
        let config = ObservabilityConfig::default();
        assert!(config.validate().is_empty());
        assert!(config.ensure_valid().is_ok());
    }

    #[test]
    fn sampling_ratio_out_of_range_is_reported() {
        for ratio in [-0.1, 1.0001, 2.0, -5.0, f64::NAN, f64::INFINITY] {
            let mut config = ObservabilityConfig::default();
            config.tracing.sampling_ratio = ratio;

            let failures = config.validate();
            assert_eq!(failures, vec![RATIO_MESSAGE.to_string()], "ratio {ratio}");
        }
    }

    #[test]
    fn sampling_ratio_bounds_are_inclusive() {
        for ratio in [0.0, 0.5, 1.0] {
            let mut config = ObservabilityConfig::default();
            config.tracing.sampling_ratio = ratio;
            assert!(config.validate().is_empty(), "ratio {ratio}");
        }
    }

    #[test]
    fn empty_endpoint_is_required_not_malformed() {
        for endpoint in ["", "   "] {
            let mut config = ObservabilityConfig::default();
            config.collector_endpoint = endpoint.to_string();

            let failures = config.validate();
            assert_eq!(failures, vec!["collector_endpoint is required".to_string()]);
        }
    }

    #[test]
    fn relative_endpoint_is_malformed() {
        let mut config = ObservabilityConfig::default();
        config.collector_endpoint = "/v1/traces".to_string();

        assert_eq!(
            config.validate(),
            vec!["collector_endpoint must be a valid URI".to_string()]
        );
    }

    #[test]
    fn every_failure_is_collected() {
        let mut config = ObservabilityConfig::default();
        config.service_name = String::new();
        config.collector_endpoint = "not-a-uri".to_string();
        config.tracing.sampling_ratio = 1.5;

        let failures = config.validate();
        assert_eq!(
            failures,
            vec![
                "service_name is required".to_string(),
                "collector_endpoint must be a valid URI".to_string(),
                RATIO_MESSAGE.to_string(),
            ]
        );

        match config.ensure_valid() {
            Err(ObservabilityError::InvalidConfig(list)) => assert_eq!(list.len(), 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_pipeline_override_is_reported() {
        let mut config = ObservabilityConfig::default();
        config.metrics.collector_endpoint = Some("collector".to_string());
        config.tracing.collector_endpoint = Some("http://jaeger:4317".to_string());

        assert_eq!(
            config.validate(),
            vec!["metrics.collector_endpoint must be a valid URI".to_string()]
        );
    }

    #[test]
    fn padded_endpoint_is_trimmed_for_exporters() {
        let mut config = ObservabilityConfig::default();
        config.collector_endpoint = " http://localhost:4317 ".to_string();
        config.logging.collector_endpoint = Some("\thttp://loki:4317".to_string());

        assert!(config.validate().is_empty());
        assert_eq!(config.tracing_endpoint(), "http://localhost:4317");
        assert_eq!(config.metrics_endpoint(), "http://localhost:4317");
        assert_eq!(config.logging_endpoint(), "http://loki:4317");
    }

    #[test]
    fn prometheus_endpoint_must_be_a_path() {
        let mut config = ObservabilityConfig::default();
        config.metrics.prometheus_endpoint = "metrics".to_string();
        assert_eq!(
            config.validate(),
            vec!["metrics.prometheus_endpoint must start with '/'".to_string()]
        );

        config.metrics.prometheus_enabled = false;
        assert!(config.validate().is_empty());
    }
}
