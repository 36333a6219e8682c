// ☁️ Remote sheet backend - a spreadsheet published behind an HTTP endpoint
//
// GET  <url>  -> CSV document with the list column
// PUT  <url>  <- CSV document replacing the whole sheet
//
// Reads may be served from a short freshness window (`ttl`); a zero ttl always goes
// to the network. Any successful write drops the cached copy. Compare-and-swap writes
// always check against a fresh copy of the sheet.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use super::table::{parse_column, render_column, DEFAULT_COLUMN};
use super::{Backend, ListVersion, StoreError};

/// Request timeout for sheet calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct SheetBackend {
    client: Client,
    url: String,
    token: Option<String>,
    column: String,
    ttl: Duration,
    cache: Mutex<Option<(Instant, Option<Vec<String>>)>>,
}

impl SheetBackend {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        SheetBackend {
            client,
            url: url.into(),
            token: None,
            column: DEFAULT_COLUMN.to_string(),
            ttl: Duration::ZERO,
            cache: Mutex::new(None),
        }
    }

    /// Bearer token sent with every request
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// How long a read may be reused (zero = always fresh)
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn cached(&self) -> Option<Option<Vec<String>>> {
        if self.ttl.is_zero() {
            return None;
        }

        let guard = self.cache.lock().ok()?;
        match guard.as_ref() {
            Some((fetched_at, lines)) if fetched_at.elapsed() < self.ttl => Some(lines.clone()),
            _ => None,
        }
    }

    fn remember(&self, lines: Option<Vec<String>>) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = if self.ttl.is_zero() {
                None
            } else {
                Some((Instant::now(), lines))
            };
        }
    }

    fn forget(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = None;
        }
    }

    /// GET the sheet from the network, refreshing the freshness window
    async fn fetch(&self) -> Result<Option<Vec<String>>, StoreError> {
        let response = self
            .authorize(self.client.get(&self.url))
            .header(header::ACCEPT, "text/csv")
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            self.remember(None);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.unavailable(format!("failed to read body: {}", e)))?;

        let lines = parse_column(&body, &self.column)
            .map_err(|e| self.unavailable(format!("malformed sheet: {}", e)))?;

        self.remember(Some(lines.clone()));
        Ok(Some(lines))
    }

    fn unavailable(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Unavailable {
            backend: self.describe(),
            reason: reason.into(),
        }
    }

    fn rejected(&self, reason: impl Into<String>) -> StoreError {
        StoreError::WriteRejected {
            backend: self.describe(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Backend for SheetBackend {
    fn describe(&self) -> String {
        format!("remote sheet {} (column '{}')", self.url, self.column)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn read(&self) -> Result<Option<Vec<String>>, StoreError> {
        if let Some(lines) = self.cached() {
            debug!("Serving sheet from freshness window");
            return Ok(lines);
        }

        self.fetch().await
    }

    #[instrument(skip(self, lines), fields(url = %self.url, rows = lines.len()))]
    async fn write(&self, lines: &[String]) -> Result<(), StoreError> {
        let body = render_column(&self.column, lines).map_err(|e| self.rejected(e.to_string()))?;

        let response = self
            .authorize(self.client.put(&self.url))
            .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| self.rejected(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(self.rejected(format!(
                "permission denied (HTTP {}); share the sheet with edit access",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(self.rejected(format!("HTTP {}", status)));
        }

        self.forget();
        Ok(())
    }

    #[instrument(skip(self, expected, lines), fields(url = %self.url, rows = lines.len()))]
    async fn write_if(&self, expected: &ListVersion, lines: &[String]) -> Result<(), StoreError> {
        let current = self
            .fetch()
            .await
            .map_err(|e| self.rejected(format!("current contents could not be verified: {}", e)))?
            .unwrap_or_default();

        if &ListVersion::of_lines(&current) != expected {
            debug!("Sheet changed since it was read");
            return Err(StoreError::Conflict);
        }

        self.write(lines).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
