//! Output tables.
//!
//! All four tables are append-only logs keyed by email_id. The runner flushes
//! after every email so a crash loses at most the email in flight.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::OutputError;
use crate::pipeline::types::{Classification, EmailCategory, OrderLine, Response};
use crate::sheets::{
    CLASSIFICATION_TABLE, INQUIRY_RESPONSE_TABLE, ORDER_RESPONSE_TABLE, ORDER_STATUS_TABLE,
};

/// Destination for pipeline results.
pub trait OutputSink {
    fn record_classification(&mut self, row: &Classification) -> Result<(), OutputError>;

    fn record_order_line(&mut self, line: &OrderLine) -> Result<(), OutputError>;

    /// Routed to the order or inquiry response table by `response.category`.
    fn record_response(&mut self, response: &Response) -> Result<(), OutputError>;

    fn flush(&mut self) -> Result<(), OutputError>;
}

#[derive(Serialize)]
struct ClassificationRow<'a> {
    email_id: &'a str,
    category: &'a str,
}

#[derive(Serialize)]
struct OrderStatusRow<'a> {
    email_id: &'a str,
    product_id: &'a str,
    quantity: u32,
    status: &'a str,
}

#[derive(Serialize)]
struct ResponseRow<'a> {
    email_id: &'a str,
    response: &'a str,
}

/// One CSV file with its header already written.
struct TableWriter {
    table: &'static str,
    writer: csv::Writer<File>,
}

impl TableWriter {
    fn create(dir: &Path, table: &'static str, header: &[&str]) -> Result<Self, OutputError> {
        let path = dir.join(format!("{table}.csv"));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| write_error(table, e))?;
        writer
            .write_record(header)
            .map_err(|e| write_error(table, e))?;
        Ok(Self { table, writer })
    }

    fn append<T: Serialize>(&mut self, row: &T) -> Result<(), OutputError> {
        self.writer
            .serialize(row)
            .map_err(|e| write_error(self.table, e))
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

fn write_error(table: &str, e: csv::Error) -> OutputError {
    OutputError::Write {
        table: table.to_string(),
        reason: e.to_string(),
    }
}

/// Writes the four tables as `<dir>/<table>.csv`, truncating existing files.
pub struct CsvSink {
    dir: PathBuf,
    classifications: TableWriter,
    order_status: TableWriter,
    order_responses: TableWriter,
    inquiry_responses: TableWriter,
}

impl CsvSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let sink = Self {
            classifications: TableWriter::create(
                &dir,
                CLASSIFICATION_TABLE,
                &["email_id", "category"],
            )?,
            order_status: TableWriter::create(
                &dir,
                ORDER_STATUS_TABLE,
                &["email_id", "product_id", "quantity", "status"],
            )?,
            order_responses: TableWriter::create(
                &dir,
                ORDER_RESPONSE_TABLE,
                &["email_id", "response"],
            )?,
            inquiry_responses: TableWriter::create(
                &dir,
                INQUIRY_RESPONSE_TABLE,
                &["email_id", "response"],
            )?,
            dir,
        };
        info!(dir = %sink.dir.display(), "Output tables created");
        Ok(sink)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for CsvSink {
    fn record_classification(&mut self, row: &Classification) -> Result<(), OutputError> {
        self.classifications.append(&ClassificationRow {
            email_id: &row.email_id,
            category: row.category.as_str(),
        })
    }

    fn record_order_line(&mut self, line: &OrderLine) -> Result<(), OutputError> {
        self.order_status.append(&OrderStatusRow {
            email_id: &line.email_id,
            product_id: &line.product_id,
            quantity: line.quantity,
            status: line.status.as_str(),
        })
    }

    fn record_response(&mut self, response: &Response) -> Result<(), OutputError> {
        let row = ResponseRow {
            email_id: &response.email_id,
            response: &response.text,
        };
        match response.category {
            EmailCategory::OrderRequest => self.order_responses.append(&row),
            EmailCategory::ProductInquiry => self.inquiry_responses.append(&row),
        }
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        self.classifications.flush()?;
        self.order_status.flush()?;
        self.order_responses.flush()?;
        self.inquiry_responses.flush()
    }
}

/// Keeps every row in memory. Used for dry runs.
#[derive(Debug, Default, Serialize)]
pub struct MemorySink {
    pub classifications: Vec<Classification>,
    pub order_lines: Vec<OrderLine>,
    pub order_responses: Vec<Response>,
    pub inquiry_responses: Vec<Response>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four tables as a JSON object keyed by table name.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            CLASSIFICATION_TABLE: self.classifications,
            ORDER_STATUS_TABLE: self.order_lines,
            ORDER_RESPONSE_TABLE: self.order_responses,
            INQUIRY_RESPONSE_TABLE: self.inquiry_responses,
        })
    }
}

impl OutputSink for MemorySink {
    fn record_classification(&mut self, row: &Classification) -> Result<(), OutputError> {
        self.classifications.push(row.clone());
        Ok(())
    }

    fn record_order_line(&mut self, line: &OrderLine) -> Result<(), OutputError> {
        self.order_lines.push(line.clone());
        Ok(())
    }

    fn record_response(&mut self, response: &Response) -> Result<(), OutputError> {
        match response.category {
            EmailCategory::OrderRequest => self.order_responses.push(response.clone()),
            EmailCategory::ProductInquiry => self.inquiry_responses.push(response.clone()),
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        Ok(())
    }
}
