//! Table I/O: the two input tables and the four output tables.
//!
//! Inputs come from a `TableSource` (a directory of CSV files or a Google
//! Sheets spreadsheet). Outputs go to an `OutputSink`, either CSV files or an
//! in-memory buffer for dry runs.

pub mod loader;
pub mod sink;
pub mod source;

pub use loader::{Loaded, load_catalog, load_emails, parse_emails, parse_products};
pub use sink::{CsvSink, MemorySink, OutputSink};
pub use source::{CsvDirSource, SheetsSource, TableSource};

/// Input table: product catalog.
pub const PRODUCTS_TABLE: &str = "products";
/// Input table: customer emails.
pub const EMAILS_TABLE: &str = "emails";

/// Output table: one category per email.
pub const CLASSIFICATION_TABLE: &str = "email-classification";
/// Output table: one row per requested order line.
pub const ORDER_STATUS_TABLE: &str = "order-status";
/// Output table: replies to order requests.
pub const ORDER_RESPONSE_TABLE: &str = "order-response";
/// Output table: replies to product inquiries.
pub const INQUIRY_RESPONSE_TABLE: &str = "inquiry-response";
