use crate::util::http;
use async_trait::async_trait;
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument};
use tungstenite::http::{
    header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST},
    uri::InvalidUri,
    Request as HttpRequest, StatusCode, Uri,
};

/// Error from the text-transform service
#[derive(Debug, Error, Display)]
pub enum ServiceError {
    /// Could not connect to {0}: {1}
    Connect(String, #[source] io::Error),
    /// No response within {0:?}
    Timeout(Duration),
    /// Service responded with {0}: {1}
    Status(StatusCode, String),
    /// Malformed response: {0}
    Malformed(#[from] serde_json::Error),
    /// HTTP exchange failed: {0}
    Protocol(#[from] http::Error),
    /// Service returned no text
    Empty,
}

/// Error in the configured endpoint
#[derive(Debug, Error, Display)]
pub enum EndpointError {
    /// Invalid URI: {0}
    Uri(#[from] InvalidUri),
    /// Only plain `http://` endpoints are supported, got {0:?}
    Scheme(String),
    /// Endpoint {0:?} has no host
    Host(String),
}

/// A generative service that turns a prompt into text
#[async_trait]
pub trait TextTransform: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Calls `POST <endpoint>/api/generate` over plain HTTP/1.1
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    uri: Uri,
    host: String,
    port: u16,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(
        endpoint: &str,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let base: Uri = endpoint.trim().parse()?;
        match base.scheme_str() {
            Some("http") => {}
            _ => return Err(EndpointError::Scheme(endpoint.to_owned())),
        }
        let host = base
            .host()
            .ok_or_else(|| EndpointError::Host(endpoint.to_owned()))?
            .to_owned();
        let port = base.port_u16().unwrap_or(80);
        let uri = format!(
            "http://{}:{}{}/api/generate",
            host,
            port,
            base.path().trim_end_matches('/')
        )
        .parse()?;
        Ok(Self {
            uri,
            host,
            port,
            model,
            api_key,
            timeout,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[instrument(skip(self, prompt), fields(uri = %self.uri, model = %self.model))]
    async fn exchange(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = serde_json::to_vec(&GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        })?;

        let mut builder = HttpRequest::post(self.uri.clone())
            .header(HOST, format!("{}:{}", self.host, self.port))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len().to_string())
            .header(CONNECTION, "close");
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }
        let request = builder.body(body).map_err(http::Error::from)?;

        let mut head = Vec::new();
        http::write_request(&mut head, &request)?;

        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|err| ServiceError::Connect(addr.clone(), err))?;
        stream.write_all(&head).await.map_err(http::Error::from)?;

        let mut reader = BufReader::new(stream);
        let response = http::read_response(&mut reader).await?;
        debug!(status = %response.status(), len = response.body().len(), "Service responded");

        if !response.status().is_success() {
            let text = String::from_utf8_lossy(response.body()).into_owned();
            return Err(ServiceError::Status(response.status(), text));
        }
        let parsed: GenerateResponse = serde_json::from_slice(response.body())?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl TextTransform for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        match timeout(self.timeout, self.exchange(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(self.timeout)),
        }
    }
}
