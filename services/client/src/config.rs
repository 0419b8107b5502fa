use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub gateway_url: String,
    pub api_base_url: String,
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub max_reconnect_attempts: u32,
    pub listen_window: Duration,
    pub wake_cooldown: Duration,
    pub suggest_debounce: Duration,
    pub settings_path: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let gateway_url = std::env::var("GATEWAY_URL")
            .map_err(|_| ConfigError::MissingVar("GATEWAY_URL".to_string()))?;

        let api_base_url = std::env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let reconnect_base = millis_var("RECONNECT_BASE_MS", 1_000)?;
        let reconnect_cap = millis_var("RECONNECT_CAP_MS", 10_000)?;
        if reconnect_cap < reconnect_base {
            return Err(ConfigError::InvalidValue(
                "RECONNECT_CAP_MS".to_string(),
                "cap must not be below RECONNECT_BASE_MS".to_string(),
            ));
        }
        let max_reconnect_attempts = u32_var("MAX_RECONNECT_ATTEMPTS", 5)?;

        let listen_window = millis_var("LISTEN_WINDOW_MS", 10_000)?;
        let wake_cooldown = millis_var("WAKE_COOLDOWN_MS", 300)?;
        let suggest_debounce = millis_var("SUGGEST_DEBOUNCE_MS", 1_500)?;

        let settings_path = std::env::var("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./duet-settings.json"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            gateway_url,
            api_base_url,
            reconnect_base,
            reconnect_cap,
            max_reconnect_attempts,
            listen_window,
            wake_cooldown,
            suggest_debounce,
            settings_path,
            log_level,
        })
    }
}

fn millis_var(name: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(Duration::from_millis(default_ms)),
    }
}

fn u32_var(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("GATEWAY_URL");
            env::remove_var("API_BASE_URL");
            env::remove_var("RECONNECT_BASE_MS");
            env::remove_var("RECONNECT_CAP_MS");
            env::remove_var("MAX_RECONNECT_ATTEMPTS");
            env::remove_var("LISTEN_WINDOW_MS");
            env::remove_var("WAKE_COOLDOWN_MS");
            env::remove_var("SUGGEST_DEBOUNCE_MS");
            env::remove_var("SETTINGS_PATH");
            env::remove_var("RUST_LOG");
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("GATEWAY_URL", "ws://localhost:3000/ws");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.gateway_url, "ws://localhost:3000/ws");
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.reconnect_base, Duration::from_secs(1));
        assert_eq!(config.reconnect_cap, Duration::from_secs(10));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.listen_window, Duration::from_secs(10));
        assert_eq!(config.wake_cooldown, Duration::from_millis(300));
        assert_eq!(config.suggest_debounce, Duration::from_millis(1_500));
        assert_eq!(config.settings_path, PathBuf::from("./duet-settings.json"));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("GATEWAY_URL", "wss://duet.example.com/ws");
            env::set_var("API_BASE_URL", "https://duet.example.com/api");
            env::set_var("RECONNECT_BASE_MS", "500");
            env::set_var("RECONNECT_CAP_MS", "30000");
            env::set_var("MAX_RECONNECT_ATTEMPTS", "8");
            env::set_var("LISTEN_WINDOW_MS", "15000");
            env::set_var("WAKE_COOLDOWN_MS", "1000");
            env::set_var("SUGGEST_DEBOUNCE_MS", "2000");
            env::set_var("SETTINGS_PATH", "/tmp/duet.json");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.gateway_url, "wss://duet.example.com/ws");
        assert_eq!(config.api_base_url, "https://duet.example.com/api");
        assert_eq!(config.reconnect_base, Duration::from_millis(500));
        assert_eq!(config.reconnect_cap, Duration::from_secs(30));
        assert_eq!(config.max_reconnect_attempts, 8);
        assert_eq!(config.listen_window, Duration::from_secs(15));
        assert_eq!(config.wake_cooldown, Duration::from_secs(1));
        assert_eq!(config.suggest_debounce, Duration::from_secs(2));
        assert_eq!(config.settings_path, PathBuf::from("/tmp/duet.json"));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_gateway_url() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "GATEWAY_URL"),
            _ => panic!("Expected MissingVar for GATEWAY_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_reconnect_base() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RECONNECT_BASE_MS", "not-a-number");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RECONNECT_BASE_MS"),
            _ => panic!("Expected InvalidValue for RECONNECT_BASE_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_cap_below_base_rejected() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RECONNECT_BASE_MS", "5000");
            env::set_var("RECONNECT_CAP_MS", "1000");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RECONNECT_CAP_MS"),
            _ => panic!("Expected InvalidValue for RECONNECT_CAP_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
