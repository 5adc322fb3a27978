//! HTTP record source.
//!
//! `GET <base_url>/<collection>?page=<n>&limit=<m>[&<filter>=<value>...]`
//! returning `{ items: [...], pagination: { page, pages, total } }`.
//! Retries live in the loader; this adapter only classifies failures.

use async_trait::async_trait;
use reqwest::Client;

use crate::application::dto::RawPage;
use crate::application::ports::{PageQuery, RecordSource, SourceError};
use crate::config::SourceConfig;
use crate::resilience::{ErrorCategory, categorize_status};

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 256;

/// Record source backed by the screener REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    client: Client,
    endpoint: String,
}

impl HttpRecordSource {
    /// Create a source from config.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| SourceError::Transient {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let endpoint = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.collection.trim_start_matches('/')
        );

        Ok(Self { client, endpoint })
    }

    /// Collection URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<RawPage, SourceError> {
        let mut params: Vec<(String, String)> = vec![
            ("page".to_string(), query.page.to_string()),
            ("limit".to_string(), query.limit.to_string()),
        ];
        params.extend(query.filters.iter().map(|(k, v)| (k.clone(), v.clone())));

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| SourceError::Transient {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SourceError::Transient {
            status: Some(status.as_u16()),
            message: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            let code = status.as_u16();
            let message = truncate(&body);
            tracing::debug!(status = code, page = query.page, "Source returned error status");
            return Err(match categorize_status(code) {
                ErrorCategory::Retryable | ErrorCategory::RateLimited => SourceError::Transient {
                    status: Some(code),
                    message,
                },
                ErrorCategory::NonRetryable => SourceError::Rejected {
                    status: code,
                    message,
                },
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Malformed {
            message: e.to_string(),
        })
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
