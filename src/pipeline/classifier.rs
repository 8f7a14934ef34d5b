//! Email classifier: one model call per email, strict label parsing.
//!
//! An unrecognized reply is a parse failure. There is no default category.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::error::{PipelineError, Stage};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::mail::Email;
use crate::pipeline::types::EmailCategory;

/// Temperature for classification (near-deterministic).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// A label is a handful of tokens.
const CLASSIFY_MAX_TOKENS: u32 = 16;

/// A label is a single word; decoration around it is tolerated.
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[\s"'`*]*([A-Za-z_]+)[\s"'`*]*\.?[\s"'`*]*$"#).expect("valid label regex")
});

/// Labels incoming customer email.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify one email.
    pub async fn classify(&self, email: &Email) -> Result<EmailCategory, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(email)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| PipelineError::service(Stage::Classification, e))?;
        debug!(email_id = %email.id, raw = %response.content, "Classifier reply");

        let category = parse_label(&response.content)
            .map_err(|reason| PipelineError::parse(Stage::Classification, reason))?;
        info!(email_id = %email.id, category = %category, "Email classified");
        Ok(category)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classify_system_prompt() -> String {
    "You are an email classification assistant.".to_string()
}

fn build_classify_user_prompt(email: &Email) -> String {
    let labels: Vec<String> = EmailCategory::ALL
        .iter()
        .map(|c| format!("\"{}\"", c.as_str()))
        .collect();
    format!(
        "Analyze the following email and classify it as either {labels}.\n\
         An order request is when the customer wants to purchase products.\n\
         A product inquiry is when the customer is asking for information about products.\n\n\
         Email Subject: {subject}\n\
         Email Body: {body}\n\n\
         Classification (respond with exactly one of: {labels}):",
        labels = labels.join(" or "),
        subject = email.subject,
        body = email.body,
    )
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse the model's reply into a category.
fn parse_label(raw: &str) -> Result<EmailCategory, String> {
    let preview: String = raw.chars().take(80).collect();
    let token = LABEL_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| format!("expected a single label, got '{preview}'"))?;
    EmailCategory::from_label(token).ok_or_else(|| format!("unknown category label '{token}'"))
}
