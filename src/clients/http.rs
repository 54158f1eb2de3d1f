//! Shared HTTP plumbing for the remote backends

use super::BackendError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Connection settings common to every HTTP backend
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Hard ceiling for one request; the pipeline usually cancels earlier
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Sent as `Authorization: Bearer <key>` when present
    pub api_key: Option<String>,
    pub user_agent: String,
}

impl HttpSettings {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            api_key: None,
            user_agent: format!("lawrag/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Pooled client plus the auth header policy
#[derive(Debug, Clone)]
pub(crate) struct JsonHttp {
    inner: reqwest::Client,
    api_key: Option<String>,
}

impl JsonHttp {
    pub(crate) fn new(settings: &HttpSettings) -> Result<Self, BackendError> {
        let inner = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .user_agent(&settings.user_agent)
            .build()
            .map_err(|e| BackendError::InitializationError(e.to_string()))?;

        Ok(Self {
            inner,
            api_key: settings.api_key.clone(),
        })
    }

    /// POST a JSON body and decode a JSON response, failing on non-2xx status
    pub(crate) async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!("HTTP POST: {}", url);

        let mut request = self.inner.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
                message: response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string()),
            });
        }

        Ok(response.json::<R>().await?)
    }
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:9200/", "/traffic_law/_search"),
            "http://localhost:9200/traffic_law/_search"
        );
        assert_eq!(join_url("http://q:6333", "collections"), "http://q:6333/collections");
    }

    #[test]
    fn test_client_creation() {
        let settings = HttpSettings::new(Duration::from_secs(3)).with_api_key(Some("k".into()));
        assert!(JsonHttp::new(&settings).is_ok());
    }
}
