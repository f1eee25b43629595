//! Tests for [`ServiceConfig`] defaults, validation and environment overrides.

use super::*;
use std::collections::HashMap;

fn valid_config() -> ServiceConfig {
    ServiceConfig {
        source: SourceConfig {
            uri: "http://source.local:8080".to_string(),
            user: "source-user".to_string(),
            password: "source-pwd".to_string(),
            ..SourceConfig::default()
        },
        admin: AdminConfig {
            user: "admin".to_string(),
            password: "admin-pwd".to_string(),
        },
        ..ServiceConfig::default()
    }
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

mod defaults {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ServiceConfig::default();

        assert_eq!(config.server.port, 8080);
        assert!(!config.source.insecure_skip_verify);
        assert_eq!(config.source.timeout_seconds, 60);
        assert!(!config.logging.request_logging);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "source:\n  uri: http://source.local\nserver:\n  port: 9090\n";

        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.source.uri, "http://source.local");
        assert_eq!(config.source.timeout_seconds, 60);
    }

    #[test]
    fn test_client_options_follow_source_settings() {
        let mut config = valid_config();
        config.source.insecure_skip_verify = true;
        config.source.timeout_seconds = 5;

        let options = config.source.client_options();

        assert!(options.insecure_skip_verify);
        assert_eq!(options.timeout, Duration::from_secs(5));
    }
}

mod validation {
    use super::*;

    #[test]
    fn test_complete_config_is_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_config_is_missing_source() {
        let result = ServiceConfig::default().validate();

        assert!(matches!(result, Err(ConfigError::Missing { ref key }) if key == "source.uri"));
    }

    #[test]
    fn test_each_source_credential_is_required() {
        for key in ["source.user", "source.password"] {
            let mut config = valid_config();
            match key {
                "source.user" => config.source.user.clear(),
                _ => config.source.password.clear(),
            }

            let result = config.validate();

            assert!(
                matches!(result, Err(ConfigError::Missing { key: ref k }) if k == key),
                "expected {} to be reported missing",
                key
            );
        }
    }

    #[test]
    fn test_admin_credentials_are_required() {
        let mut config = valid_config();
        config.admin.password.clear();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing { ref key }) if key == "admin.password"
        ));
    }

    #[test]
    fn test_zero_port_is_invalid() {
        let mut config = valid_config();
        config.server.port = 0;

        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let mut config = valid_config();
        config.source.timeout_seconds = 0;

        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }
}

mod flat_env {
    use super::*;

    #[test]
    fn test_flat_variables_fill_source_settings() {
        let mut config = ServiceConfig::default();

        config.apply_flat_env(env_of(&[
            ("DPROXY_SOURCE_URI", "http://legacy:8080"),
            ("DPROXY_SOURCE_USER", "legacy-user"),
            ("DPROXY_SOURCE_PASSWORD", "legacy-pwd"),
            ("DPROXY_SOURCE_INSECURE_SKIP_VERIFY", "true"),
        ]));

        assert_eq!(config.source.uri, "http://legacy:8080");
        assert_eq!(config.source.user, "legacy-user");
        assert_eq!(config.source.password, "legacy-pwd");
        assert!(config.source.insecure_skip_verify);
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let mut config = valid_config();

        config.apply_flat_env(env_of(&[("DPROXY_SOURCE_URI", "")]));

        assert_eq!(config.source.uri, "http://source.local:8080");
    }

    #[test]
    fn test_unparseable_skip_verify_keeps_verification() {
        let mut config = valid_config();
        config.source.insecure_skip_verify = true;

        config.apply_flat_env(env_of(&[("DPROXY_SOURCE_INSECURE_SKIP_VERIFY", "yes")]));

        assert!(!config.source.insecure_skip_verify);
    }

    #[test]
    fn test_any_logging_value_enables_request_logging() {
        let mut config = valid_config();

        config.apply_flat_env(env_of(&[("DPROXY_LOGGING", "0")]));

        assert!(config.logging.request_logging);
    }

    #[test]
    fn test_no_variables_changes_nothing() {
        let mut config = valid_config();

        config.apply_flat_env(|_| None);

        assert_eq!(config.source.user, "source-user");
        assert!(!config.logging.request_logging);
    }
}

mod redaction {
    use super::*;

    #[test]
    fn test_debug_redacts_passwords() {
        let debug = format!("{:?}", valid_config());

        assert!(!debug.contains("source-pwd"));
        assert!(!debug.contains("admin-pwd"));
        assert!(debug.contains("<REDACTED>"));
        assert!(debug.contains("source-user"));
    }
}
