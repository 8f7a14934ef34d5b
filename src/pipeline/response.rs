//! Reply generation for orders and inquiries.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::OrderStatus;
use crate::error::{PipelineError, Stage};
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::mail::Email;
use crate::pipeline::types::{OrderLine, Response, ResponseContext, RetrievedProduct};

/// Temperature for customer-facing prose.
const RESPONSE_TEMPERATURE: f32 = 0.7;
const RESPONSE_MAX_TOKENS: u32 = 1000;

const ORDER_SUBJECT: &str = "Re: Your Order Confirmation";
const INQUIRY_SUBJECT: &str = "Re: Your Product Inquiry";

/// Writes customer replies.
pub struct ResponseGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Generate the reply for one email.
    pub async fn generate(
        &self,
        email: &Email,
        context: &ResponseContext,
    ) -> Result<Response, PipelineError> {
        let (system, user) = match context {
            ResponseContext::Order { lines } => (
                "You are a professional customer service representative.",
                build_order_prompt(email, lines),
            ),
            ResponseContext::Inquiry { products } if products.is_empty() => (
                "You are a helpful customer service representative.",
                build_no_products_prompt(email),
            ),
            ResponseContext::Inquiry { products } => (
                "You are a knowledgeable product specialist.",
                build_inquiry_prompt(email, products),
            ),
        };
        debug!(email_id = %email.id, prompt = %user, "Response prompt");

        let request =
            CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
                .with_temperature(RESPONSE_TEMPERATURE)
                .with_max_tokens(RESPONSE_MAX_TOKENS);
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PipelineError::service(Stage::Response, e))?;

        let text = response.content.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::parse(Stage::Response, "model returned an empty reply"));
        }

        // Cut off by the token limit. Still sent, but flagged in the run report.
        let truncated = response.finish_reason == FinishReason::Length;
        if truncated {
            warn!(
                email_id = %email.id,
                max_tokens = RESPONSE_MAX_TOKENS,
                "Reply hit the token limit and may be incomplete"
            );
        }

        info!(
            email_id = %email.id,
            category = %context.category(),
            chars = text.len(),
            "Response generated"
        );
        Ok(Response {
            email_id: email.id.clone(),
            category: context.category(),
            text,
            truncated,
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// One summary line per order line.
fn order_summary(lines: &[(OrderLine, String)]) -> String {
    lines
        .iter()
        .map(|(line, name)| {
            let status = match line.status {
                OrderStatus::Created => "confirmed",
                OrderStatus::OutOfStock => "out of stock",
            };
            format!("- {name}: {} units ({status})", line.quantity)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_order_prompt(email: &Email, lines: &[(OrderLine, String)]) -> String {
    let summary = if lines.is_empty() {
        "- No products could be identified in this order".to_string()
    } else {
        order_summary(lines)
    };
    format!(
        "Generate a professional email response for the following order.\n\n\
         Subject: {ORDER_SUBJECT}\n\n\
         Customer Email:\n{}\n\n\
         Order Summary:\n{summary}\n\n\
         Please include:\n\
         1. A thank you message\n\
         2. Confirmation of successful orders\n\
         3. Information about out-of-stock items\n\
         4. Next steps or alternatives for out-of-stock items\n\
         5. A professional closing\n\n\
         Response:",
        email.text()
    )
}

fn product_info(products: &[RetrievedProduct]) -> String {
    products
        .iter()
        .map(|r| {
            let p = &r.product;
            format!(
                "Product: {}\nCategory: {}\nDescription: {}\nSeason: {}\nStock: {} units available",
                p.name, p.category, p.description, p.season, p.stock
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_inquiry_prompt(email: &Email, products: &[RetrievedProduct]) -> String {
    format!(
        "Generate a professional email response for the following product inquiry.\n\n\
         Subject: {INQUIRY_SUBJECT}\n\n\
         Customer Inquiry:\n{}\n\n\
         Relevant Products:\n{}\n\n\
         The response should:\n\
         1. Address the specific inquiry\n\
         2. Provide relevant product information\n\
         3. Include stock availability\n\
         4. Offer additional assistance\n\
         5. Maintain a professional and helpful tone\n\n\
         Response:",
        email.text(),
        product_info(products)
    )
}

fn build_no_products_prompt(email: &Email) -> String {
    format!(
        "Generate a professional email response to a product inquiry for which no \
         relevant products were found.\n\n\
         Subject: {INQUIRY_SUBJECT}\n\n\
         Customer Inquiry:\n{}\n\n\
         The response should:\n\
         1. Acknowledge the customer's inquiry\n\
         2. Explain that we couldn't find exact matches\n\
         3. Offer to help with a more specific search\n\
         4. Provide contact information for further assistance\n\n\
         Response:",
        email.text()
    )
}
