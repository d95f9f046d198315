use crate::config::HttpSettings;
use crate::error::{NetworkError, WorkflowError};
use crate::utils::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// JSON request/response collaborator.
///
/// Implementations retry on their own; an `Err` means the retry budget is spent.
#[async_trait]
pub trait JsonService: Send + Sync {
    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, WorkflowError>;

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, WorkflowError>;
}

/// Builds a [`JsonService`] bound to the egress chosen for one account.
pub trait ServiceConnector: Send + Sync {
    fn connect(&self, proxy: Option<&str>) -> Result<Arc<dyn JsonService>, WorkflowError>;
}

pub struct HttpJsonService {
    client: Client,
    retry: RetryPolicy,
}

impl HttpJsonService {
    pub fn new(
        proxy: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, NetworkError> {
        let mut builder = Client::builder().timeout(timeout).user_agent(USER_AGENT);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| NetworkError::InvalidProxy {
                proxy: proxy.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| NetworkError::ClientBuild {
            reason: e.to_string(),
        })?;

        Ok(Self { client, retry })
    }

    async fn send(request: RequestBuilder) -> Result<Value, NetworkError> {
        let response = request.send().await?;
        let status = response.status();
        let endpoint = response.url().to_string();
        if !status.is_success() {
            return Err(NetworkError::HttpError {
                status_code: status.as_u16(),
                endpoint,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| NetworkError::InvalidResponse {
                endpoint,
                reason: e.to_string(),
            })
    }

    fn with_headers(mut request: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request
    }
}

#[async_trait]
impl JsonService for HttpJsonService {
    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, WorkflowError> {
        debug!("GET {}", url);
        with_retry(&self.retry, &format!("GET {}", url), || {
            Self::send(Self::with_headers(self.client.get(url), headers))
        })
        .await
        .map_err(|e| WorkflowError::service(url, e))
    }

    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, WorkflowError> {
        debug!("POST {}", url);
        with_retry(&self.retry, &format!("POST {}", url), || {
            Self::send(Self::with_headers(self.client.post(url).json(body), headers))
        })
        .await
        .map_err(|e| WorkflowError::service(url, e))
    }
}

/// Default connector: one reqwest client per account egress.
#[derive(Debug, Clone, Default)]
pub struct HttpServiceConnector {
    settings: HttpSettings,
}

impl HttpServiceConnector {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }
}

impl ServiceConnector for HttpServiceConnector {
    fn connect(&self, proxy: Option<&str>) -> Result<Arc<dyn JsonService>, WorkflowError> {
        let service = HttpJsonService::new(proxy, self.settings.timeout(), self.settings.retry)
            .map_err(|e| WorkflowError::service("http client", e))?;
        Ok(Arc::new(service))
    }
}
