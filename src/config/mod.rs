use environment_type::EnvironmentType;
/**
 * Initialize server configuration, using hierarchical configuration
 * https://docs.rs/config/latest/config/
 *
 * 1. First stunward.yaml is read
 * 2. Then stunward.{environment}.yaml is read
 * 3. Then stunward.local.yaml is read (this is normally used for dev and not checked in git)
 * 4. Finally, environment variables are read
 */
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::stun::auth::AuthenticationType;

pub(crate) mod auth_type;
pub(crate) mod environment_type;
mod loglevel_type;

/**
 * Represents the configuration settings for the stunward server.
 *
 * Fields:
 * - `environment`: The environment type (e.g., development, staging, or production).
 * - `tcp_bind_address`: The address and port to bind the TCP server (hostname:port format)
 * - `udp_bind_address`: The address to bind the UDP server (hostname:port format)
 * - `disable_tcp`: Flag to disable TCP server port.
 * - `disable_udp`: Flag to disable UDP server port.
 * - `software_name`: The name of the software, which will be added to 'software' field in STUN responses.
 * - `auth`: The authentication mode for binding requests (none, short-term, or long-term).
 * - `realm`: The realm advertised during long-term authentication challenges.
 * - `log_level`: The logging level. By default, logging is inferred from environment type if no other settings are found.
 */
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct Settings {
    pub(crate) environment: EnvironmentType,
    pub(crate) tcp_bind_address: String,
    pub(crate) udp_bind_address: String,
    pub(crate) disable_tcp: bool,
    pub(crate) disable_udp: bool,
    pub(crate) software_name: String,
    #[serde(deserialize_with = "auth_type::deserialize")]
    pub(crate) auth: AuthenticationType,
    pub(crate) realm: String,
    #[serde(deserialize_with = "loglevel_type::deserialize")]
    pub(crate) log_level: slog::Level,
}

impl Settings {
    pub(crate) fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("STUNWARD_ENVIRONMENT").unwrap_or_else(|_| "production".into());

        let s = Config::builder()
            // default config file
            .add_source(File::with_name("stunward.yaml").required(false))
            // environment-based config file
            .add_source(File::with_name(&format!("stunward.{run_mode}.yaml")).required(false))
            // local config file (don't check this into source control)
            .add_source(File::with_name("stunward.local.yaml").required(false))
            .add_source(Environment::with_prefix("STUNWARD"))
            .set_default("tcp_bind_address", "0.0.0.0:3478")?
            .set_default("udp_bind_address", "0.0.0.0:3478")?
            .set_default("auth", AuthenticationType::default().as_str())?
            .set_default("realm", "default")?
            .set_default(
                "log_level",
                if run_mode.to_lowercase() == "development" {
                    "debug"
                } else {
                    "warn"
                },
            )?
            .set_default("environment", EnvironmentType::production.as_str())?
            .set_default("disable_tcp", false)?
            .set_default("disable_udp", false)?
            .set_default("software_name", crate::stun::SOFTWARE)?
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.environment = EnvironmentType::from(settings.environment);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn set_env_var(key: &str, value: &str) {
        env::set_var(key, value);
    }

    fn reset_env_var() {
        let v = env::vars().collect::<Vec<(String, String)>>();
        for (name, _) in v {
            if name.starts_with("STUNWARD_") {
                env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_environment_variable_dev() {
        reset_env_var();
        set_env_var("STUNWARD_ENVIRONMENT", "development");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(
            settings.environment.as_str(),
            EnvironmentType::development.as_str()
        );
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_environment_variable_prod() {
        reset_env_var();
        set_env_var("STUNWARD_ENVIRONMENT", "production");

        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(
            settings.environment.as_str(),
            EnvironmentType::production.as_str()
        );
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_environment_variable_garbage() {
        reset_env_var();
        set_env_var("STUNWARD_ENVIRONMENT", "garbage");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(
            settings.environment.as_str(),
            EnvironmentType::production.as_str()
        );
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_disable_udp_variable_bool() {
        reset_env_var();
        set_env_var("STUNWARD_DISABLE_UDP", "true");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.disable_udp, true);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_disable_udp_variable_num() {
        reset_env_var();
        set_env_var("STUNWARD_DISABLE_UDP", "1");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.disable_udp, true);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_tcp_bind_address_variable() {
        reset_env_var();
        set_env_var("STUNWARD_TCP_BIND_ADDRESS", "127.0.0.1:1234");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.tcp_bind_address, "127.0.0.1:1234");
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_udp_bind_address_variable() {
        reset_env_var();
        set_env_var("STUNWARD_UDP_BIND_ADDRESS", "127.0.0.1:5678");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.udp_bind_address, "127.0.0.1:5678");
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_log_level_defaults() {
        reset_env_var();
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.log_level, slog::Level::Warning);

        set_env_var("STUNWARD_ENVIRONMENT", "development");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.log_level, slog::Level::Debug);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_log_level_override() {
        reset_env_var();
        set_env_var("STUNWARD_ENVIRONMENT", "production");
        set_env_var("STUNWARD_LOG_LEVEL", "trace");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.log_level, slog::Level::Trace);

        reset_env_var();
        set_env_var("STUNWARD_ENVIRONMENT", "production");
        set_env_var("STUNWARD_LOG_LEVEL", "garbage");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.log_level, slog::Level::Warning);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_auth_default_is_none() {
        reset_env_var();
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.auth, AuthenticationType::None);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_auth_short_term() {
        reset_env_var();
        set_env_var("STUNWARD_AUTH", "short-term");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.auth, AuthenticationType::ShortTerm);

        set_env_var("STUNWARD_AUTH", "short_term");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.auth, AuthenticationType::ShortTerm);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_auth_long_term() {
        reset_env_var();
        set_env_var("STUNWARD_AUTH", "Long-Term");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.auth, AuthenticationType::LongTerm);
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_auth_garbage_is_rejected() {
        reset_env_var();
        set_env_var("STUNWARD_AUTH", "garbage");
        assert!(Settings::new().is_err());
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_realm_default_and_override() {
        reset_env_var();
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.realm, "default");

        set_env_var("STUNWARD_REALM", "example.org");
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.realm, "example.org");
        reset_env_var();
    }

    #[test]
    #[serial]
    fn test_software_name_default() {
        reset_env_var();
        let settings = Settings::new().expect("Deserialization failed");
        assert_eq!(settings.software_name, crate::stun::SOFTWARE);
        reset_env_var();
    }
}
