//! Parse the product and email tables.
//!
//! A missing column rejects the whole table. A malformed row is skipped, logged,
//! and returned in `Loaded::skipped` so the run report can count it.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::catalog::{Catalog, Product};
use crate::error::InputError;
use crate::mail::Email;
use crate::sheets::source::TableSource;
use crate::sheets::{EMAILS_TABLE, PRODUCTS_TABLE};

const PRODUCT_COLUMNS: [&str; 6] = [
    "product_id",
    "name",
    "category",
    "description",
    "season",
    "stock",
];
const EMAIL_COLUMNS: [&str; 3] = ["email_id", "subject", "body"];

/// Parsed table plus the rows that were skipped.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: T,
    pub skipped: Vec<InputError>,
}

/// Read and parse the product table.
pub async fn load_catalog(source: &dyn TableSource) -> Result<Loaded<Catalog>, InputError> {
    let text = source.read_table(PRODUCTS_TABLE).await?;
    let loaded = parse_products(&text)?;
    info!(
        products = loaded.records.len(),
        skipped = loaded.skipped.len(),
        "Catalog loaded"
    );
    Ok(loaded)
}

/// Read and parse the email table.
pub async fn load_emails(source: &dyn TableSource) -> Result<Loaded<Vec<Email>>, InputError> {
    let text = source.read_table(EMAILS_TABLE).await?;
    let loaded = parse_emails(&text)?;
    info!(
        emails = loaded.records.len(),
        skipped = loaded.skipped.len(),
        "Emails loaded"
    );
    Ok(loaded)
}

/// Parse product CSV text into a catalog.
pub fn parse_products(text: &str) -> Result<Loaded<Catalog>, InputError> {
    let mut catalog = Catalog::new();
    let skipped = parse_rows(text, PRODUCTS_TABLE, &PRODUCT_COLUMNS, |fields| {
        let id = fields[0].trim();
        if id.is_empty() {
            return Err("empty product_id".to_string());
        }
        let stock = parse_stock(fields[5])?;
        catalog
            .insert(Product {
                id: id.to_string(),
                name: fields[1].trim().to_string(),
                category: fields[2].trim().to_string(),
                description: fields[3].trim().to_string(),
                season: fields[4].trim().to_string(),
                stock,
            })
            .map_err(|e| e.to_string())
    })?;
    Ok(Loaded {
        records: catalog,
        skipped,
    })
}

/// Parse email CSV text, keeping table order.
pub fn parse_emails(text: &str) -> Result<Loaded<Vec<Email>>, InputError> {
    let mut emails = Vec::new();
    let mut seen = HashSet::new();
    let skipped = parse_rows(text, EMAILS_TABLE, &EMAIL_COLUMNS, |fields| {
        let id = fields[0].trim();
        if id.is_empty() {
            return Err("empty email_id".to_string());
        }
        if !seen.insert(id.to_string()) {
            return Err(format!("duplicate email_id '{id}'"));
        }
        emails.push(Email {
            id: id.to_string(),
            subject: fields[1].trim().to_string(),
            body: fields[2].trim().to_string(),
        });
        Ok(())
    })?;
    Ok(Loaded {
        records: emails,
        skipped,
    })
}

/// Walk the rows of `text`, handing the required columns (in `columns` order)
/// to `accept`. Rows that fail are skipped and returned.
fn parse_rows<F>(
    text: &str,
    table: &str,
    columns: &[&str],
    mut accept: F,
) -> Result<Vec<InputError>, InputError>
where
    F: FnMut(&[&str]) -> Result<(), String>,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| InputError::Unreadable {
        table: table.to_string(),
        reason: e.to_string(),
    })?;
    let indexes = column_indexes(headers, table, columns)?;

    let mut skipped = Vec::new();
    for result in reader.records() {
        let skip = |line: u64, reason: String| {
            warn!(table, line, reason = %reason, "Skipping malformed row");
            InputError::InvalidRow {
                table: table.to_string(),
                line,
                reason,
            }
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                skipped.push(skip(line, e.to_string()));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        // Blank lines in exported sheets come through as a single empty field.
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let fields: Option<Vec<&str>> = indexes.iter().map(|&i| record.get(i)).collect();
        let Some(fields) = fields else {
            skipped.push(skip(
                line,
                format!("expected at least {} fields, got {}", indexes.len(), record.len()),
            ));
            continue;
        };

        if let Err(reason) = accept(&fields) {
            skipped.push(skip(line, reason));
        }
    }
    Ok(skipped)
}

fn column_indexes(
    headers: &csv::StringRecord,
    table: &str,
    columns: &[&str],
) -> Result<Vec<usize>, InputError> {
    let normalized: Vec<String> = headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect();

    columns
        .iter()
        .map(|column| {
            normalized
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| InputError::MissingColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                })
        })
        .collect()
}

/// Stock is a non-negative integer. Spreadsheet exports sometimes render
/// whole numbers as "12.0", which is accepted.
fn parse_stock(raw: &str) -> Result<u32, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty stock".to_string());
    }
    if let Ok(stock) = raw.parse::<u32>() {
        return Ok(stock);
    }
    match raw.parse::<f64>() {
        Ok(v) if v < 0.0 => Err(format!("stock must be non-negative, got {raw}")),
        Ok(v) if v.fract() == 0.0 && v <= f64::from(u32::MAX) => Ok(v as u32),
        _ => Err(format!("stock must be a whole number, got '{raw}'")),
    }
}
