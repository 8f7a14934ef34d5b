//! Run driver: classify, branch, respond, record. One email at a time.
//!
//! Rows are written as soon as each stage finishes, so a failure part-way
//! through an email leaves the earlier rows in place. A failed email is logged
//! and the run moves on to the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::catalog::{Catalog, OrderStatus};
use crate::error::PipelineError;
use crate::llm::{EmbeddingProvider, LlmProvider, TokenUsage};
use crate::mail::Email;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::inquiry::InquiryHandler;
use crate::pipeline::order::OrderProcessor;
use crate::pipeline::response::ResponseGenerator;
use crate::pipeline::retrieval::RetrievalConfig;
use crate::pipeline::types::{Classification, EmailCategory, OrderLine, ResponseContext};
use crate::sheets::OutputSink;

/// An email that could not be fully processed.
#[derive(Debug, Clone, Serialize)]
pub struct EmailFailure {
    pub email_id: String,
    /// Stage that failed, when the failure came from a model step.
    pub stage: Option<String>,
    pub error: String,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub emails: usize,
    pub order_requests: usize,
    pub product_inquiries: usize,
    pub order_lines: usize,
    pub lines_created: usize,
    pub lines_out_of_stock: usize,
    pub responses: usize,
    /// Replies the model cut off at the token limit. They are still written.
    pub truncated_responses: usize,
    /// Input rows dropped while loading.
    pub skipped_rows: usize,
    pub failures: Vec<EmailFailure>,
    pub usage: TokenUsage,
}

impl RunReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            emails: 0,
            order_requests: 0,
            product_inquiries: 0,
            order_lines: 0,
            lines_created: 0,
            lines_out_of_stock: 0,
            responses: 0,
            truncated_responses: 0,
            skipped_rows: 0,
            failures: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.emails - self.failures.len()
    }

    fn count_classification(&mut self, category: EmailCategory) {
        match category {
            EmailCategory::OrderRequest => self.order_requests += 1,
            EmailCategory::ProductInquiry => self.product_inquiries += 1,
        }
    }

    fn count_line(&mut self, line: &OrderLine) {
        self.order_lines += 1;
        match line.status {
            OrderStatus::Created => self.lines_created += 1,
            OrderStatus::OutOfStock => self.lines_out_of_stock += 1,
        }
    }
}

/// The four stages wired together.
pub struct Pipeline {
    classifier: Classifier,
    orders: OrderProcessor,
    inquiries: InquiryHandler,
    responder: ResponseGenerator,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            classifier: Classifier::new(llm.clone()),
            orders: OrderProcessor::new(llm.clone()),
            inquiries: InquiryHandler::new(embedder, retrieval),
            responder: ResponseGenerator::new(llm),
        }
    }

    /// Process every email in table order.
    ///
    /// Never fails as a whole: per-email errors are collected in the report.
    pub async fn run(
        &mut self,
        emails: &[Email],
        catalog: &mut Catalog,
        sink: &mut dyn OutputSink,
    ) -> RunReport {
        let mut report = RunReport::start();
        report.emails = emails.len();
        info!(
            run_id = %report.run_id,
            emails = emails.len(),
            products = catalog.len(),
            "Starting run"
        );

        for email in emails {
            let result = self.process_email(email, catalog, sink, &mut report).await;
            let flushed = sink.flush().map_err(PipelineError::from);

            if let Err(e) = result.and(flushed) {
                error!(email_id = %email.id, error = %e, "Failed to process email");
                report.failures.push(EmailFailure {
                    email_id: email.id.clone(),
                    stage: e.stage().map(|s| s.label().to_string()),
                    error: e.to_string(),
                });
            }
        }

        report.finished_at = Utc::now();
        info!(
            run_id = %report.run_id,
            processed = report.succeeded(),
            failed = report.failures.len(),
            total = report.emails,
            "Run complete"
        );
        report
    }

    /// Process one email, writing each row as soon as it is known.
    async fn process_email(
        &mut self,
        email: &Email,
        catalog: &mut Catalog,
        sink: &mut dyn OutputSink,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let category = self.classifier.classify(email).await?;
        sink.record_classification(&Classification {
            email_id: email.id.clone(),
            category,
        })?;
        report.count_classification(category);

        let context = match category {
            EmailCategory::OrderRequest => {
                let lines = self.orders.process(email, catalog).await?;
                for (line, _) in &lines {
                    sink.record_order_line(line)?;
                    report.count_line(line);
                }
                if lines.is_empty() {
                    warn!(email_id = %email.id, "Order request named no products");
                }
                ResponseContext::Order { lines }
            }
            EmailCategory::ProductInquiry => {
                let products = self.inquiries.retrieve(email, catalog).await?;
                ResponseContext::Inquiry { products }
            }
        };

        let response = self.responder.generate(email, &context).await?;
        sink.record_response(&response)?;
        report.responses += 1;
        if response.truncated {
            report.truncated_responses += 1;
        }
        Ok(())
    }
}
