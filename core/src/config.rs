//! Client configuration from the environment.

use std::env;

use crate::error::ApiError;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost";

/// Where the service lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub service_url: String,
    pub token: String,
}

impl ClientConfig {
    pub fn new(service_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            token: token.into(),
        }
    }

    /// Read `PINRY_URL` (defaults to `http://localhost`) and `PINRY_TOKEN`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiError> {
        let service_url = lookup("PINRY_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        let token = lookup("PINRY_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Config("PINRY_TOKEN is not set".to_string()))?;
        Ok(Self { service_url, token })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_url_and_token() {
        let config =
            ClientConfig::from_lookup(lookup(&[("PINRY_URL", "https://pins.example.org"), ("PINRY_TOKEN", "abc\n")]))
                .unwrap();
        assert_eq!(config, ClientConfig::new("https://pins.example.org", "abc"));
    }

    #[test]
    fn url_defaults_to_localhost() {
        let config = ClientConfig::from_lookup(lookup(&[("PINRY_TOKEN", "abc")])).unwrap();
        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = ClientConfig::from_lookup(lookup(&[("PINRY_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
