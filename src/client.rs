use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::error::ClientError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
}

/// One protocol exchange as issued by a session.
///
/// `label` is what outcomes are grouped under. It must never contain a room id, user id,
/// filter id or sync token.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub label: String,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();

        Self {
            method,
            label: path.clone(),
            path,
            params: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    /// `None` when the body was empty or not valid JSON.
    pub body: Option<Value>,
    pub elapsed: Duration,
}

impl Response {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self {
            status,
            body,
            elapsed: Duration::ZERO,
        }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(key))
    }
}

/// The transport a session talks through. Connection reuse, TLS and socket-level
/// retries are the implementor's business.
#[async_trait]
pub trait Client: Send + Sync {
    async fn request(&self, request: Request) -> Result<Response, ClientError>;
}

/// `Client` backed by a shared reqwest connection pool.
pub struct HttpClient {
    base_url: String,
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            inner,
        })
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn request(&self, request: Request) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let url = reqwest::Url::parse(&url).map_err(|_| ClientError::InvalidUrl(url))?;

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.inner.request(method, url).query(&request.params);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let start = Instant::now();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let elapsed = start.elapsed();

        let body = serde_json::from_slice::<Value>(&bytes).ok();
        if body.is_none() && !bytes.is_empty() {
            debug!("Non-JSON body from {}", request.label);
        }

        Ok(Response {
            status,
            body,
            elapsed,
        })
    }
}
