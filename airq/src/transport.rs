use crate::errors::{Error, Result};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

/// A single HTTP exchange with the appliance.
///
/// Implementations never retry. A request that outlives `timeout` must tear
/// down its connection and fail with [`Error::Timeout`]; a non-200 status or
/// an empty body fails with [`Error::Http`].
pub trait Transport: Send + Sync {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response>> + Send;
}

/// Plain-HTTP transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response>> + Send {
        let url = format!("{}{}", self.base_url, path);

        let builder = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        }
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .timeout(timeout);

        let builder = match body {
            Some(body) => builder.header(CONTENT_LENGTH, body.len()).body(body),
            None => builder,
        };

        async move {
            debug!("{:?} {}", method, url);

            let response = builder
                .send()
                .await
                .map_err(|e| classify(e, timeout))?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| classify(e, timeout))?;

            if status != 200 || body.is_empty() {
                return Err(Error::Http { status, body });
            }

            Ok(Response { status, body })
        }
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Connection(err.to_string())
    }
}
