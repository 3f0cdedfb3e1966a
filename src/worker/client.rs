//! Typed HTTP client for the `/parser/urls` API

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

use crate::api::TOKEN_HEADER;
use crate::api::models::{
    ClaimRequest, ClaimResponse, ClaimedUrl, ReleaseRequest, ReleaseResponse, RenewRequest,
    RenewResponse, ReportRequest, ReportResponse,
};
use crate::queue::UrlResult;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("queue API returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Errors worth retrying later (network trouble, 503 from the store)
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Request(e) => e.is_timeout() || e.is_connect(),
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::InvalidUrl(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct QueueClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl QueueClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/parser/urls/{}", self.base_url, path)
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "Queue API call");

        if !status.is_success() {
            return Err(api_error(status, response).await);
        }

        Ok(response.json::<Resp>().await?)
    }

    pub async fn claim(&self, request: &ClaimRequest) -> Result<Vec<ClaimedUrl>> {
        let response: ClaimResponse = self.post("claim", request).await?;
        Ok(response.urls)
    }

    pub async fn report(&self, results: &[UrlResult]) -> Result<ReportResponse> {
        let body = ReportRequest {
            results: results.to_vec(),
        };
        self.post("report", &body).await
    }

    pub async fn release(&self, worker_id: &str, supplier_name: Option<&str>) -> Result<usize> {
        let body = ReleaseRequest {
            worker_id: worker_id.to_string(),
            supplier_name: supplier_name.map(str::to_string),
        };
        let response: ReleaseResponse = self.post("release", &body).await?;
        Ok(response.released)
    }

    pub async fn renew(&self, worker_id: &str, item_ids: Option<Vec<u64>>) -> Result<usize> {
        let body = RenewRequest {
            worker_id: worker_id.to_string(),
            item_ids,
        };
        let response: RenewResponse = self.post("renew", &body).await?;
        Ok(response.renewed)
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    ClientError::Api {
        status: status.as_u16(),
        code: body.code.unwrap_or_else(|| "UNKNOWN".to_string()),
        message: body
            .message
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
    }
}
