//! Raw-row transports
//!
//! Every transport returns the same thing: a matrix of cell strings for one
//! period's sheet. Label/value decoding happens downstream and is identical
//! regardless of where the cells came from.
//!
//! - [`SheetsApiSource`] - authenticated spreadsheet values API (primary)
//! - [`PublishedCsvSource`] - public "publish to web" CSV export (fallback)
//! - [`FileSource`] - local CSV files, for imports and offline runs

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::line_parser::parse_lines;
use crate::models::{RowMatrix, SnapshotSource};
use crate::period::Period;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait RowSource: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &str;

    /// Snapshot tag recorded for rows fetched through this transport.
    fn kind(&self) -> SnapshotSource;

    async fn fetch(&self, period: Period) -> Result<RowMatrix, SourceError>;
}

/// Response body of the values endpoint. Trailing empty cells and rows are
/// omitted by the API, so `values` may be missing entirely.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct SheetsApiSource {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    access_token: Option<String>,
}

impl SheetsApiSource {
    pub fn new(
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            access_token,
        })
    }

    /// `None` when no spreadsheet id is configured.
    pub fn from_config(config: &SourceConfig) -> Result<Option<Self>, SourceError> {
        let Some(id) = config.spreadsheet_id.as_deref() else {
            return Ok(None);
        };
        Self::new(
            &config.api_base_url,
            id,
            config.access_token.clone(),
            Duration::from_secs(config.fetch_timeout_secs),
        )
        .map(Some)
    }

    fn values_url(&self, period: Period) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.base_url,
            self.spreadsheet_id,
            period.sheet_name()
        )
    }
}

#[async_trait]
impl RowSource for SheetsApiSource {
    fn name(&self) -> &str {
        "sheets_api"
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Primary
    }

    async fn fetch(&self, period: Period) -> Result<RowMatrix, SourceError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| SourceError::Auth("no access token configured".to_string()))?;

        let url = self.values_url(period);
        debug!(%url, "Requesting sheet values");

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body: ValueRange = response.json().await?;
        let rows: RowMatrix = body
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        info!(%period, rows = rows.len(), "Fetched rows from sheets API");
        Ok(rows)
    }
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub struct PublishedCsvSource {
    client: reqwest::Client,
    base_url: String,
    published_id: String,
}

impl PublishedCsvSource {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DEFAULT_MAX_REDIRECTS: usize = 5;
    pub const DEFAULT_USER_AGENT: &'static str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

    pub fn new(
        base_url: impl Into<String>,
        published_id: impl Into<String>,
        timeout: Duration,
        max_redirects: usize,
        user_agent: &str,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            published_id: published_id.into(),
        })
    }

    /// Falls back to the spreadsheet id when no separate published id is set.
    pub fn from_config(config: &SourceConfig) -> Result<Option<Self>, SourceError> {
        let Some(id) = config
            .published_id
            .as_deref()
            .or(config.spreadsheet_id.as_deref())
        else {
            return Ok(None);
        };
        Self::new(
            &config.public_base_url,
            id,
            Duration::from_secs(config.fetch_timeout_secs),
            config.max_redirects,
            &config.user_agent,
        )
        .map(Some)
    }
}

#[async_trait]
impl RowSource for PublishedCsvSource {
    fn name(&self) -> &str {
        "published_csv"
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Fallback
    }

    async fn fetch(&self, period: Period) -> Result<RowMatrix, SourceError> {
        let url = format!("{}/{}/pub", self.base_url, self.published_id);
        debug!(%url, sheet = period.sheet_name(), "Downloading published CSV");

        let response = self
            .client
            .get(&url)
            .query(&[("output", "csv"), ("sheet", period.sheet_name())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let text = response.text().await?;
        let rows: RowMatrix = parse_lines(&text).collect();
        info!(%period, rows = rows.len(), "Fetched rows from published CSV");
        Ok(rows)
    }
}

/// Reads label/value CSV from disk.
///
/// A file path serves every period. A directory is searched for
/// `<code>.csv` first, then `<sheet name>.csv`.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, period: Period) -> PathBuf {
        if !self.path.is_dir() {
            return self.path.clone();
        }
        let by_code = self.path.join(format!("{}.csv", period.code()));
        if by_code.exists() {
            by_code
        } else {
            self.path.join(format!("{}.csv", period.sheet_name()))
        }
    }
}

#[async_trait]
impl RowSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::File
    }

    async fn fetch(&self, period: Period) -> Result<RowMatrix, SourceError> {
        let path = self.resolve(period);
        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SourceError::Decode(format!("{}: {e}", path.display())))?;
        let rows: RowMatrix = parse_lines(&text).collect();
        debug!(path = %path.display(), rows = rows.len(), "Read rows from file");
        Ok(rows)
    }
}

/// Stand-in used when no remote transport is configured; every fetch fails
/// with a message pointing at the missing settings.
pub struct UnconfiguredSource;

#[async_trait]
impl RowSource for UnconfiguredSource {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn kind(&self) -> SnapshotSource {
        SnapshotSource::Primary
    }

    async fn fetch(&self, _period: Period) -> Result<RowMatrix, SourceError> {
        Err(SourceError::Auth(
            "no spreadsheet configured (set TICKET_INSIGHTS_SPREADSHEET_ID or TICKET_INSIGHTS_PUBLISHED_ID)"
                .to_string(),
        ))
    }
}

/// Primary and optional fallback transports described by `config`.
///
/// The values API is primary when an access token is available; the
/// published CSV is then the fallback, otherwise it is promoted to primary.
pub fn sources_from_config(
    config: &SourceConfig,
) -> Result<(Arc<dyn RowSource>, Option<Arc<dyn RowSource>>), SourceError> {
    let api = if config.access_token.is_some() {
        SheetsApiSource::from_config(config)?.map(|s| Arc::new(s) as Arc<dyn RowSource>)
    } else {
        None
    };
    let published =
        PublishedCsvSource::from_config(config)?.map(|s| Arc::new(s) as Arc<dyn RowSource>);

    let sources = match (api, published) {
        (Some(api), csv) => (api, csv),
        (None, Some(csv)) => (csv, None),
        (None, None) => (Arc::new(UnconfiguredSource) as Arc<dyn RowSource>, None),
    };
    debug!(
        primary = sources.0.name(),
        fallback = ?sources.1.as_ref().map(|s| s.name()),
        "Configured row sources"
    );
    Ok(sources)
}
