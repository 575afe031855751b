// clues/beacon.rs - Fire-and-forget discovery requests
//
// These requests exist so a student can spot them in the network panel.
// Their responses are never read and their failures never matter.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRequest {
    pub method: DiscoveryMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl DiscoveryRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: DiscoveryMethod::Get,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: DiscoveryMethod::Post,
            path: path.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("discovery request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Beacon: Send + Sync {
    async fn send(&self, request: DiscoveryRequest) -> Result<(), BeaconError>;
}

/// Sends discovery requests over HTTP to the challenge host
pub struct HttpBeacon {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBeacon {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        // The host usually beacons to itself; never route loopback through a proxy
        let mut builder = reqwest::Client::builder();
        if is_loopback(&base_url) {
            builder = builder.no_proxy();
        }
        let client = builder.build().unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });

        Self {
            client,
            base_url,
            timeout,
        }
    }
}

fn is_loopback(base_url: &str) -> bool {
    match url::Url::parse(base_url) {
        Ok(url) => matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]")),
        Err(_) => false,
    }
}

#[async_trait]
impl Beacon for HttpBeacon {
    async fn send(&self, request: DiscoveryRequest) -> Result<(), BeaconError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            DiscoveryMethod::Get => self.client.get(&url),
            DiscoveryMethod::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.timeout(self.timeout).send().await?;
        tracing::debug!(url = %url, status = %response.status(), "discovery request sent");
        Ok(())
    }
}

/// Drops every request; for hosts with nowhere to send them
pub struct NullBeacon;

#[async_trait]
impl Beacon for NullBeacon {
    async fn send(&self, request: DiscoveryRequest) -> Result<(), BeaconError> {
        tracing::trace!(path = %request.path, "discovery request dropped");
        Ok(())
    }
}
