//! Client configuration.
//!
//! Every value has a default, so `ClientConfig::default()` is usable as is
//! once a request URI is provided (either here or per request).
//!
//! # Example
//!
//! ```
//! use jxn_runtime::config::ClientConfig;
//! use jxn_core::RequestMode;
//!
//! # fn main() -> Result<(), jxn_runtime::config::ConfigError> {
//! let config = ClientConfig::default()
//!     .with_request_uri("/ajax.php")
//!     .with_default_mode(RequestMode::Synchronous)
//!     .with_default_retry(3);
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use jxn_core::{HttpMethod, RequestMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be parsed
    #[error("Invalid value for {var}: '{value}'")]
    InvalidValue {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Client-wide settings merged into every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Default target URI
    pub request_uri: Option<String>,
    /// Execution mode when the request does not set one
    pub default_mode: RequestMode,
    /// HTTP method when the request does not set one
    pub default_method: HttpMethod,
    /// Network attempt budget
    pub default_retry: u32,
    /// Timer of the `onResponseDelay` hook, in milliseconds
    pub response_delay_ms: u64,
    /// Timer of the `onExpiration` hook, in milliseconds
    pub expiration_ms: u64,
    /// Headers sent with every request
    pub common_headers: Vec<(String, String)>,
    /// Headers sent with POST requests
    pub post_headers: Vec<(String, String)>,
    /// Headers sent with GET requests
    pub get_headers: Vec<(String, String)>,
    /// Nesting limit applied to call arguments
    pub max_object_depth: usize,
    /// Per-container entry limit applied to call arguments
    pub max_object_size: usize,
    /// Longest GET URI before falling back to POST
    pub max_get_uri_length: usize,
    /// Capacity of the send and receive queues
    pub request_queue_size: usize,
    /// Capacity of a response's command queue
    pub response_queue_size: usize,
    /// Protocol version sent as `jxnv`
    pub protocol_version: String,
    /// Wake-up interval of polling commands, in milliseconds
    pub poll_interval_ms: u64,
    /// Delay between network attempts
    #[serde(skip)]
    pub retry_backoff: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_uri: None,
            default_mode: RequestMode::Asynchronous,
            default_method: HttpMethod::Post,
            default_retry: 5,
            response_delay_ms: 1000,
            expiration_ms: 10_000,
            common_headers: vec![(
                "If-Modified-Since".to_string(),
                "Sat, 1 Jan 2000 00:00:00 GMT".to_string(),
            )],
            post_headers: Vec::new(),
            get_headers: Vec::new(),
            max_object_depth: 20,
            max_object_size: 2000,
            max_get_uri_length: 2048,
            request_queue_size: 1000,
            response_queue_size: 1000,
            protocol_version: "5.x".to_string(),
            poll_interval_ms: 100,
            retry_backoff: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `JXN_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(uri) = lookup("JXN_REQUEST_URI") {
            config.request_uri = Some(uri);
        }
        if let Some(mode) = lookup("JXN_DEFAULT_MODE") {
            config.default_mode =
                RequestMode::parse(&mode).ok_or_else(|| invalid("JXN_DEFAULT_MODE", &mode))?;
        }
        if let Some(method) = lookup("JXN_DEFAULT_METHOD") {
            config.default_method = match method.to_ascii_uppercase().as_str() {
                "GET" => HttpMethod::Get,
                "POST" => HttpMethod::Post,
                _ => return Err(invalid("JXN_DEFAULT_METHOD", &method)),
            };
        }
        if let Some(retry) = lookup("JXN_DEFAULT_RETRY") {
            config.default_retry = parse("JXN_DEFAULT_RETRY", &retry)?;
        }
        if let Some(delay) = lookup("JXN_RESPONSE_DELAY_MS") {
            config.response_delay_ms = parse("JXN_RESPONSE_DELAY_MS", &delay)?;
        }
        if let Some(expiration) = lookup("JXN_EXPIRATION_MS") {
            config.expiration_ms = parse("JXN_EXPIRATION_MS", &expiration)?;
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for zero retry budgets or queue sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_retry == 0 {
            return Err(ConfigError::Validation("default_retry must be > 0".to_string()));
        }
        if self.request_queue_size == 0 {
            return Err(ConfigError::Validation(
                "request_queue_size must be > 0".to_string(),
            ));
        }
        if self.response_queue_size == 0 {
            return Err(ConfigError::Validation(
                "response_queue_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the default request URI.
    #[must_use]
    pub fn with_request_uri(mut self, uri: impl Into<String>) -> Self {
        self.request_uri = Some(uri.into());
        self
    }

    /// Set the default execution mode.
    #[must_use]
    pub const fn with_default_mode(mut self, mode: RequestMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Set the default HTTP method.
    #[must_use]
    pub const fn with_default_method(mut self, method: HttpMethod) -> Self {
        self.default_method = method;
        self
    }

    /// Set the default network attempt budget.
    #[must_use]
    pub const fn with_default_retry(mut self, retry: u32) -> Self {
        self.default_retry = retry;
        self
    }

    /// Set the hook timers.
    #[must_use]
    pub const fn with_timers(mut self, response_delay: Duration, expiration: Duration) -> Self {
        self.response_delay_ms = millis(response_delay);
        self.expiration_ms = millis(expiration);
        self
    }

    /// Add a header sent with every request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.common_headers.push((name.into(), value.into()));
        self
    }

    /// Set the queue capacities.
    #[must_use]
    pub const fn with_queue_sizes(mut self, requests: usize, responses: usize) -> Self {
        self.request_queue_size = requests;
        self.response_queue_size = responses;
        self
    }

    /// Set the longest GET URI before falling back to POST.
    #[must_use]
    pub const fn with_max_get_uri_length(mut self, length: usize) -> Self {
        self.max_get_uri_length = length;
        self
    }

    /// Set the wake-up interval of polling commands.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = millis(interval);
        self
    }

    /// Set the backoff between network attempts.
    #[must_use]
    pub fn with_retry_backoff(mut self, policy: RetryPolicy) -> Self {
        self.retry_backoff = policy;
        self
    }

    /// Timer of the `onResponseDelay` hook.
    #[must_use]
    pub const fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }

    /// Timer of the `onExpiration` hook.
    #[must_use]
    pub const fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_ms)
    }

    /// Wake-up interval of polling commands.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn invalid(var: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(var, value))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.default_mode, RequestMode::Asynchronous);
        assert_eq!(config.default_method, HttpMethod::Post);
        assert_eq!(config.default_retry, 5);
        assert_eq!(config.response_delay(), Duration::from_secs(1));
        assert_eq!(config.expiration(), Duration::from_secs(10));
        assert_eq!(config.common_headers[0].0, "If-Modified-Since");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("JXN_REQUEST_URI", "/ajax"),
            ("JXN_DEFAULT_MODE", "sync"),
            ("JXN_DEFAULT_METHOD", "get"),
            ("JXN_DEFAULT_RETRY", "2"),
            ("JXN_EXPIRATION_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.request_uri.as_deref(), Some("/ajax"));
        assert_eq!(config.default_mode, RequestMode::Synchronous);
        assert_eq!(config.default_method, HttpMethod::Get);
        assert_eq!(config.default_retry, 2);
        assert_eq!(config.expiration(), Duration::from_millis(500));
        assert_eq!(config.response_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup(&[("JXN_DEFAULT_RETRY", "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: "JXN_DEFAULT_RETRY".to_string(),
                value: "many".to_string(),
            }
        );
    }

    #[test]
    fn test_validation() {
        assert!(ClientConfig::default().with_default_retry(0).validate().is_err());
        assert!(ClientConfig::default().with_queue_sizes(0, 10).validate().is_err());
        assert!(ClientConfig::default().with_queue_sizes(10, 0).validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"request_uri": "/x", "default_mode": "synchronous"}"#).unwrap();
        assert_eq!(config.request_uri.as_deref(), Some("/x"));
        assert_eq!(config.default_mode, RequestMode::Synchronous);
        assert_eq!(config.max_object_depth, 20);
    }
}
