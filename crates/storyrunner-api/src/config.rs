//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use storyrunner_controller::ControllerConfig;
use uuid::Uuid;

use crate::error::AppError;

/// Settings of the API server and its story controller.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Id of the hosted story.
    pub story_id: String,
    /// Controller settings.
    pub controller: ControllerConfig,
}

impl ServerConfig {
    /// Reads `HOST`, `PORT`, `STORY_ID`, `MODULE_STOP_TIMEOUT_MS` and
    /// `DEVICE_ID` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if a variable does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if a variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;

        let story_id = lookup("STORY_ID").unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut controller = ControllerConfig::default();
        if let Some(timeout) = lookup("MODULE_STOP_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|e| {
                AppError::Config(format!("MODULE_STOP_TIMEOUT_MS must be a valid u64: {e}"))
            })?;
            controller = controller.with_module_stop_timeout(Duration::from_millis(millis));
        }
        if let Some(device_id) = lookup("DEVICE_ID") {
            controller = controller.with_device_id(device_id);
        }

        Ok(Self {
            addr,
            story_id,
            controller,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_environment_is_empty() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.addr, "0.0.0.0:3000".parse().unwrap());
        assert!(Uuid::parse_str(&config.story_id).is_ok());
        assert_eq!(config.controller.module_stop_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_variables_override_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("STORY_ID", "story-7"),
            ("MODULE_STOP_TIMEOUT_MS", "250"),
            ("DEVICE_ID", "kitchen"),
        ]))
        .unwrap();

        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.story_id, "story-7");
        assert_eq!(
            config.controller.module_stop_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.controller.device_id, "kitchen");
    }

    #[test]
    fn test_invalid_port_is_a_config_error() {
        let result = ServerConfig::from_lookup(lookup(&[("PORT", "http")]));

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_timeout_is_a_config_error() {
        let result = ServerConfig::from_lookup(lookup(&[("MODULE_STOP_TIMEOUT_MS", "soon")]));

        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
