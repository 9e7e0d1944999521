use super::Transport;
use crate::error::{ConfigError, ExportError};
use crate::wire::{serialize_binary, Batch, THRIFT_CONTENT_TYPE};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

/// Uploads each batch as one binary-encoded POST body to a Jaeger collector
#[derive(Debug, Clone)]
pub struct CollectorTransport {
    client: Client,
    endpoint: Url,
    credentials: Option<(String, String)>,
}

impl CollectorTransport {
    /// Credentials are attached only when both username and password are non-empty.
    pub fn new(endpoint: &str, username: &str, password: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidCollectorEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        let url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
        }

        let credentials = (!username.is_empty() && !password.is_empty())
            .then(|| (username.to_string(), password.to_string()));

        Ok(Self {
            client: Client::builder().build()?,
            endpoint: url,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Transport for CollectorTransport {
    async fn emit_batch(&self, batch: &Batch) -> Result<(), ExportError> {
        let body = Bytes::from(serialize_binary(batch)?);

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, THRIFT_CONTENT_TYPE)
            .body(body);
        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        // drain so the connection can be reused
        let _ = response.bytes().await;

        if !status.is_success() {
            return Err(ExportError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "collector"
    }
}
