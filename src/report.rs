use std::time::Duration;

use log::debug;
use reqwest::{header::AUTHORIZATION, Client, StatusCode, Url};
use serde::Deserialize;

use crate::aggregate::DateWindow;
use crate::config::Config;
use crate::error::Error;

const REPORT_PATH: &str = "reports-service/report";

/// One report result row. The field set depends on the requested
/// dimensions, so rows stay as raw JSON mappings until aggregation.
pub type ReportRow = serde_json::Map<String, serde_json::Value>;

/// Parameters for one report query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub date_period: String,
    pub dimensions: String,
    pub metrics: String,
    pub ad_spend_mode: Option<String>,
}

impl ReportQuery {
    pub fn new(window: &DateWindow, dimensions: &str, metrics: &str) -> Self {
        ReportQuery {
            date_period: window.date_period(),
            dimensions: dimensions.to_string(),
            metrics: metrics.to_string(),
            ad_spend_mode: None,
        }
    }

    pub fn with_ad_spend_mode(mut self, mode: &str) -> Self {
        self.ad_spend_mode = Some(mode.to_string());
        self
    }

    fn query_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = vec![
            ("date_period", self.date_period.as_str()),
            ("dimensions", self.dimensions.as_str()),
            ("metrics", self.metrics.as_str()),
        ];
        if let Some(mode) = &self.ad_spend_mode {
            pairs.push(("ad_spend_mode", mode.as_str()));
        }
        pairs
    }
}

#[derive(Deserialize)]
struct ReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReportApi: Send + Sync + 'static {
    /// Fetches report rows for the given query.
    ///
    /// A `204` response means "no rows" and yields an empty list; any other
    /// non-2xx status is an error.
    async fn fetch_rows(&self, query: &ReportQuery) -> Result<Vec<ReportRow>, Error>;
}

#[derive(Debug)]
pub struct ReportClient {
    client: Client,
    report_url: Url,
    token: String,
}

impl ReportClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_base_url(&config.report_base_url, &config.report_token)
    }

    /// Creates a client against a custom base URL (for tests against a
    /// mock server).
    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        // The base URL must end with exactly one slash so join() appends
        // the report path instead of replacing the last segment.
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        let report_url = base.join(REPORT_PATH)?;

        Ok(ReportClient {
            client,
            report_url,
            token: token.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ReportApi for ReportClient {
    async fn fetch_rows(&self, query: &ReportQuery) -> Result<Vec<ReportRow>, Error> {
        let resp = self
            .client
            .get(self.report_url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .query(&query.query_pairs())
            .send()
            .await?;

        if resp.status() == StatusCode::NO_CONTENT {
            debug!("report API returned no rows for {}", query.date_period);
            return Ok(Vec::new());
        }

        let body: ReportResponse = resp.error_for_status()?.json().await?;
        debug!(
            "report API returned {} rows for dimensions {}",
            body.rows.len(),
            query.dimensions
        );

        Ok(body.rows)
    }
}
