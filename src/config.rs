//! Connection settings for one catalog environment.

use std::time::Duration;

use catalog_client::{ClientConfig, RestCatalogClient};
use url::Url;

use crate::error::{Result, ToolkitError};

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: Url,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
    pub verify_ssl: bool,
    pub dry_run: bool,
}

impl ConnectionConfig {
    pub fn new(endpoint: &str, user: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ToolkitError::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ToolkitError::Config(format!(
                "endpoint must be http or https, got {}",
                endpoint.scheme()
            )));
        }
        Ok(Self {
            endpoint,
            user: user.into(),
            password: password.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_ssl: true,
            dry_run: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
            verify_ssl: self.verify_ssl,
            dry_run: self.dry_run,
        }
    }

    /// Build the REST client and log in.
    pub async fn connect(&self) -> Result<RestCatalogClient> {
        Ok(RestCatalogClient::connect(self.client_config()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(matches!(
            ConnectionConfig::new("ftp://host", "u", "p"),
            Err(ToolkitError::Config(_))
        ));
        assert!(matches!(
            ConnectionConfig::new("not a url", "u", "p"),
            Err(ToolkitError::Config(_))
        ));
    }

    #[test]
    fn client_config_carries_every_setting() {
        let config = ConnectionConfig::new("https://catalog.example:9047", "admin", "pw")
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .with_verify_ssl(false)
            .with_dry_run(true);
        let client = config.client_config();
        assert_eq!(client.endpoint.as_str(), "https://catalog.example:9047/");
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert!(!client.verify_ssl);
        assert!(client.dry_run);
    }
}
