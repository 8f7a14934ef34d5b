//! Order processing: extract requested items, check stock, reserve.
//!
//! Extraction is all-or-nothing: if any item is malformed the whole order
//! fails and no stock moves. Once items are parsed, each line is settled
//! independently against the live catalog.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, OrderStatus};
use crate::error::{PipelineError, Stage};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::mail::Email;
use crate::pipeline::types::{OrderLine, RequestedItem};

/// Temperature for extraction (near-deterministic).
const EXTRACT_TEMPERATURE: f32 = 0.1;
const EXTRACT_MAX_TOKENS: u32 = 500;

/// Turns order emails into order lines.
pub struct OrderProcessor {
    llm: Arc<dyn LlmProvider>,
}

impl OrderProcessor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the model which products and quantities the email requests.
    pub async fn extract(&self, email: &Email) -> Result<Vec<RequestedItem>, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extract_system_prompt()),
            ChatMessage::user(build_extract_user_prompt(email)),
        ])
        .with_temperature(EXTRACT_TEMPERATURE)
        .with_max_tokens(EXTRACT_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PipelineError::service(Stage::OrderExtraction, e))?;
        debug!(email_id = %email.id, raw = %response.content, "Extraction reply");

        parse_items(&response.content)
            .map_err(|reason| PipelineError::parse(Stage::OrderExtraction, reason))
    }

    /// Extract items and settle each against stock.
    ///
    /// Returns each line with the display name used in the reply.
    pub async fn process(
        &self,
        email: &Email,
        catalog: &mut Catalog,
    ) -> Result<Vec<(OrderLine, String)>, PipelineError> {
        let items = self.extract(email).await?;
        let lines = settle(&email.id, &items, catalog);

        let created = lines
            .iter()
            .filter(|(l, _)| l.status == OrderStatus::Created)
            .count();
        info!(
            email_id = %email.id,
            lines = lines.len(),
            created,
            out_of_stock = lines.len() - created,
            "Order processed"
        );
        Ok(lines)
    }
}

/// Settle requested items in order against the catalog.
pub fn settle(
    email_id: &str,
    items: &[RequestedItem],
    catalog: &mut Catalog,
) -> Vec<(OrderLine, String)> {
    items
        .iter()
        .map(|item| {
            let resolved = catalog
                .resolve(item.product_id.as_deref(), item.product_name.as_deref())
                .map(|p| (p.id.clone(), p.name.clone()));

            let (product_id, name, status) = match resolved {
                Some((id, name)) => {
                    let status = catalog.reserve(&id, item.quantity);
                    (id, name, status)
                }
                None => {
                    warn!(
                        email_id,
                        reference = item.reference(),
                        "Requested product not in catalog"
                    );
                    let reference = item.reference().to_string();
                    (reference.clone(), reference, OrderStatus::OutOfStock)
                }
            };

            let line = OrderLine {
                email_id: email_id.to_string(),
                product_id,
                quantity: item.quantity,
                status,
            };
            (line, name)
        })
        .collect()
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extract_system_prompt() -> String {
    "You are an order extraction assistant.".to_string()
}

fn build_extract_user_prompt(email: &Email) -> String {
    format!(
        "Extract the ordered items and their quantities from the following email.\n\
         Return ONLY a JSON array with the following structure:\n\
         [\n  {{\"product_id\": \"id or null\", \"product_name\": \"name or null\", \"quantity\": number}}\n]\n\n\
         Rules:\n\
         - Use the product ID exactly as written if the customer gives one\n\
         - Give at least one of product_id or product_name for every item\n\
         - quantity is a whole number of units; use 1 if the customer does not say\n\
         - Return [] if no products are requested\n\n\
         Email Subject: {}\n\
         Email Body: {}\n\n\
         JSON response:",
        email.subject, email.body
    )
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ExtractedItem {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    quantity: Option<serde_json::Value>,
}

/// Parse the extraction reply. Any malformed item rejects the whole reply.
fn parse_items(raw: &str) -> Result<Vec<RequestedItem>, String> {
    let extracted = decode_json_array(raw)?;

    extracted
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let product_id = non_empty(item.product_id);
            let product_name = non_empty(item.product_name);
            if product_id.is_none() && product_name.is_none() {
                return Err(format!("item {i} has neither product_id nor product_name"));
            }
            let quantity = item
                .quantity
                .as_ref()
                .ok_or_else(|| format!("item {i} is missing quantity"))
                .and_then(|q| parse_quantity(q).map_err(|e| format!("item {i}: {e}")))?;
            Ok(RequestedItem {
                product_id,
                product_name,
                quantity,
            })
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

/// A positive whole number, given as a JSON number or numeric string.
fn parse_quantity(value: &serde_json::Value) -> Result<u32, String> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("quantity must be a number, got {value}"))?;

    if number.fract() != 0.0 {
        return Err(format!("quantity must be a whole number, got {value}"));
    }
    if number < 1.0 {
        return Err(format!("quantity must be at least 1, got {value}"));
    }
    if number > f64::from(u32::MAX) {
        return Err(format!("quantity too large: {value}"));
    }
    Ok(number as u32)
}

/// Decode the first JSON array in model output.
///
/// Fences and prose around the array are skipped. Each `[` is tried in turn
/// and exactly one value is read from it, so trailing text is ignored.
fn decode_json_array(text: &str) -> Result<Vec<ExtractedItem>, String> {
    let mut first_error = None;
    for (start, _) in text.match_indices('[') {
        let mut values =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<Vec<ExtractedItem>>();
        match values.next() {
            Some(Ok(items)) => return Ok(items),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }
    Err(match first_error {
        Some(e) => format!("JSON parse error: {e}"),
        None => "no JSON array in reply".to_string(),
    })
}
