//! Where signed payloads come from

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::{AirlinkError, AirlinkResult};

/// Source of raw response bodies for a topic path.
pub trait RemoteSource: Send + Sync + 'static {
    /// Fetch the body at `path`. Transport failures and non-success
    /// statuses are errors.
    fn fetch(&self, path: &str) -> impl Future<Output = AirlinkResult<Vec<u8>>> + Send;
}

/// Plain HTTP GET against the authority's REST server.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AirlinkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AirlinkError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &RemoteConfig) -> AirlinkResult<Self> {
        Self::new(config.base_url.clone(), config.timeout())
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl RemoteSource for HttpRemote {
    async fn fetch(&self, path: &str) -> AirlinkResult<Vec<u8>> {
        let url = self.url(path);
        debug!(%url, "Fetching");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AirlinkError::Network(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| AirlinkError::Network(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let remote = HttpRemote::new("http://raspberrypi.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            remote.url("/api/ALL/data"),
            "http://raspberrypi.local/api/ALL/data"
        );
        assert_eq!(remote.url("api/ALL/news"), "http://raspberrypi.local/api/ALL/news");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // Nothing listens on the discard port
        let remote = HttpRemote::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = remote.fetch("api/ALL/data").await.unwrap_err();
        assert!(matches!(err, AirlinkError::Network(_)));
    }
}
