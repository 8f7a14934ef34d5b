//! Where the input tables come from.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::InputError;

/// Default Google Docs host for the CSV export endpoint.
const GOOGLE_DOCS_URL: &str = "https://docs.google.com";

/// A named-table reader returning raw CSV text.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Human-readable location, for logs.
    fn describe(&self) -> String;

    /// Fetch the CSV text of one table.
    async fn read_table(&self, name: &str) -> Result<String, InputError>;
}

/// Reads `<dir>/<name>.csv`.
pub struct CsvDirSource {
    dir: PathBuf,
}

impl CsvDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.csv"))
    }
}

#[async_trait]
impl TableSource for CsvDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    async fn read_table(&self, name: &str) -> Result<String, InputError> {
        let path = self.table_path(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| InputError::Unreadable {
                table: name.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
        info!(table = name, path = %path.display(), "Read table");
        Ok(text)
    }
}

/// Reads sheets of a Google spreadsheet through its CSV export endpoint.
///
/// The spreadsheet must be shared as "anyone with the link can view".
pub struct SheetsSource {
    spreadsheet_id: String,
    base_url: String,
    client: reqwest::Client,
}

impl SheetsSource {
    pub fn new(spreadsheet_id: impl Into<String>, timeout: Duration) -> Result<Self, InputError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InputError::Unreadable {
                table: "*".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            spreadsheet_id: spreadsheet_id.into(),
            base_url: GOOGLE_DOCS_URL.to_string(),
            client,
        })
    }

    /// Point at a different host (for tests and mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn export_url(&self) -> String {
        format!(
            "{}/spreadsheets/d/{}/gviz/tq",
            self.base_url, self.spreadsheet_id
        )
    }
}

#[async_trait]
impl TableSource for SheetsSource {
    fn describe(&self) -> String {
        format!("google sheet {}", self.spreadsheet_id)
    }

    async fn read_table(&self, name: &str) -> Result<String, InputError> {
        let unreadable = |reason: String| InputError::Unreadable {
            table: name.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(self.export_url())
            .query(&[("tqx", "out:csv"), ("sheet", name)])
            .send()
            .await
            .map_err(|e| unreadable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(unreadable(format!("export returned {status}: {preview}")));
        }

        let text = resp.text().await.map_err(|e| unreadable(e.to_string()))?;
        info!(
            table = name,
            spreadsheet = %self.spreadsheet_id,
            bytes = text.len(),
            "Fetched sheet"
        );
        Ok(text)
    }
}
