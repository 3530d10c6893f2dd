use crate::models::node::{Node, NodesResponse};
use crate::models::speedtest::SpeedtestResult;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
pub use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

const NODES_ROUTE: &str = "api/nodes";
const SPEEDTEST_ROUTE: &str = "api/speedtest";

#[derive(Debug, thiserror::Error)]
pub enum CenterError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("backend answered with HTTP {0}")]
    BadStatus(StatusCode),
    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),
}

/// The two endpoints of the speedtest center backend.
#[async_trait]
pub trait CenterApi: Send + Sync {
    /// `GET /api/nodes`
    async fn fetch_nodes(&self) -> Result<Vec<Node>, CenterError>;

    /// `GET /api/speedtest?node=<name>`
    ///
    /// Application level failures come back as `Ok` with `error` set; `Err`
    /// means the request or the body never made it.
    async fn run_speedtest(&self, node_name: &str) -> Result<SpeedtestResult, CenterError>;
}

#[derive(Debug, Clone)]
pub struct CenterClient {
    client: Client,
    nodes_url: Url,
    speedtest_url: Url,
}

impl CenterClient {
    pub fn new(backend_url: &Url, request_timeout: Duration) -> Result<Self, CenterError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent("speedtest-orchestrator")
            .build()?;

        let base = with_trailing_slash(backend_url);
        Ok(Self {
            client,
            nodes_url: base.join(NODES_ROUTE)?,
            speedtest_url: base.join(SPEEDTEST_ROUTE)?,
        })
    }
}

// Without it `join` would replace the last path segment of the base url
fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl CenterApi for CenterClient {
    async fn fetch_nodes(&self) -> Result<Vec<Node>, CenterError> {
        debug!("Fetching nodes from: {}", self.nodes_url);
        let response = self.client.get(self.nodes_url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(CenterError::BadStatus(response.status()));
        }

        let response_text = response.text().await?;
        let parsed_response: NodesResponse = serde_json::from_str(&response_text)?;
        Ok(parsed_response.nodes)
    }

    async fn run_speedtest(&self, node_name: &str) -> Result<SpeedtestResult, CenterError> {
        debug!("Requesting speedtest for node {node_name}");
        let response = self
            .client
            .get(self.speedtest_url.clone())
            .query(&[("node", node_name)])
            .send()
            .await?;

        // Node servers answer failed tests with a 5xx and an error body, so the
        // body is parsed whatever the status.
        let status = response.status();
        let response_text = response.text().await?;
        match serde_json::from_str::<SpeedtestResult>(&response_text) {
            Ok(result) => Ok(result),
            Err(_) if !status.is_success() => Err(CenterError::BadStatus(status)),
            Err(e) => Err(e.into()),
        }
    }
}
