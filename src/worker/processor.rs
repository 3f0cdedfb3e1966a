//! Page processors turn a leased URL into an outcome

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::client::ClientError;
use crate::api::models::ClaimedUrl;
use crate::queue::{ReportOutcome, UrlResult};

/// Fetch-and-parse step run by the worker for each claimed URL.
///
/// Implementations never fail: every problem becomes a `failed` or
/// `blocked` result so the queue can apply its retry policy.
#[async_trait]
pub trait PageProcessor: Send + Sync {
    async fn process(&self, item: &ClaimedUrl) -> UrlResult;
}

/// Smoke-test processor: GETs the page and classifies the response
pub struct HttpStatusProcessor {
    client: Client,
}

impl HttpStatusProcessor {
    pub fn new(request_timeout: Duration, user_agent: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .timeout(request_timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

/// Outcome for a received HTTP status
pub fn classify_status(status: StatusCode) -> (ReportOutcome, Option<&'static str>) {
    if status.is_success() {
        return (ReportOutcome::Done, None);
    }
    match status {
        StatusCode::FORBIDDEN => (ReportOutcome::Blocked, Some("HTTP_403")),
        StatusCode::NOT_FOUND => (ReportOutcome::Blocked, Some("HTTP_404")),
        _ => (ReportOutcome::Failed, Some("UNKNOWN")),
    }
}

/// Outcome for a request that never produced a response
pub fn classify_error(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "NAV_TIMEOUT"
    } else if error.is_connect() || error.is_request() {
        "NETWORK_ERROR"
    } else {
        "UNKNOWN"
    }
}

#[async_trait]
impl PageProcessor for HttpStatusProcessor {
    async fn process(&self, item: &ClaimedUrl) -> UrlResult {
        debug!(item_id = item.item_id, url = %item.url, "Probing page");

        match self.client.get(&item.url).send().await {
            Ok(response) => {
                let status = response.status();
                let (outcome, code) = classify_status(status);
                let mut result = UrlResult::new(item.item_id, outcome);
                match code {
                    Some(code) => {
                        result = result.with_error(code, format!("HTTP {}", status.as_u16()));
                    }
                    None => result.completed_at = Some(Utc::now()),
                }
                result
            }
            Err(e) => {
                let code = classify_error(&e);
                warn!(item_id = item.item_id, url = %item.url, code, error = %e, "Request failed");
                UrlResult::new(item.item_id, ReportOutcome::Failed).with_error(code, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK), (ReportOutcome::Done, None));
        assert_eq!(classify_status(StatusCode::NO_CONTENT).0, ReportOutcome::Done);
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            (ReportOutcome::Blocked, Some("HTTP_403"))
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            (ReportOutcome::Blocked, Some("HTTP_404"))
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            (ReportOutcome::Failed, Some("UNKNOWN"))
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            (ReportOutcome::Failed, Some("UNKNOWN"))
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let processor = HttpStatusProcessor::new(Duration::from_secs(2), "status-test").unwrap();
        let item = ClaimedUrl {
            item_id: 1,
            // Port 9 on loopback: nothing listens, connection is refused
            url: "http://127.0.0.1:9/".to_string(),
            supplier_name: "acme".to_string(),
            material_type: None,
        };

        let result = processor.process(&item).await;
        assert_eq!(result.status, ReportOutcome::Failed);
        assert_eq!(result.error_code.as_deref(), Some("NETWORK_ERROR"));
    }
}
