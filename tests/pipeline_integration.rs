//! End-to-end tests: CSV inputs in, CSV tables out.
//!
//! The model is a scripted stub keyed on prompt text and the embedder is a
//! bag-of-words over a small vocabulary, so every run is deterministic.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use mailroom::catalog::Catalog;
use mailroom::error::LlmError;
use mailroom::llm::provider::{
    CompletionRequest, CompletionResponse, EmbeddingProvider, EmbeddingResponse, FinishReason,
    LlmProvider,
};
use mailroom::llm::Metered;
use mailroom::pipeline::{Pipeline, RetrievalConfig, RunReport};
use mailroom::sheets::{CsvDirSource, CsvSink, MemorySink, OutputSink, load_catalog, load_emails};

const PRODUCTS: &str = "\
product_id,name,category,description,season,stock
P1,Canvas Tote,Bags,A sturdy canvas tote bag,Summer,5
RD100,Red Dress,Dresses,A flowing red dress for evening events,Summer,4
BD200,Blue Denim Dress,Dresses,A casual blue denim dress,Spring,6
LB300,Leather Boots,Footwear,Tall leather boots,Winter,2
";

const EMAILS: &str = "\
email_id,subject,body
E1,Tote order,\"I would like to order 3 Canvas Tote, thanks\"
E2,Another order,I would like to order 3 more P1 please
E3,Dress question,Do you have a red dress for a wedding?
E4,Boots,I would like to order 1 Leather Boots FAIL_REPLY
E5,Vague,I would like to order something nice
";

const REPLY: &str = "Dear customer,\nThank you for contacting us.";

/// Answers each prompt by the first matching rule for its stage.
struct ScriptedLlm {
    extractions: Vec<(&'static str, &'static str)>,
    prompts: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self {
            extractions: vec![
                ("3 Canvas Tote", r#"[{"product_name": "Canvas Tote", "quantity": 3}]"#),
                ("3 more P1", "```json\n[{\"product_id\": \"P1\", \"quantity\": 3}]\n```"),
                (
                    "1 Leather Boots",
                    r#"[{"product_id": null, "product_name": "leather boots", "quantity": 1}]"#,
                ),
                ("something nice", "I'm not sure what the customer wants."),
            ],
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User prompts of reply-generation calls.
    fn reply_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                let system = &r.messages[0].content;
                !system.contains("classification") && !system.contains("extraction")
            })
            .map(|r| r.user_text())
            .collect()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.prompts.lock().unwrap().push(request.clone());
        let system = request.messages[0].content.clone();
        let user = request.user_text();

        let content = if system.contains("classification") {
            if user.contains("I would like to order") {
                "order_request".to_string()
            } else {
                "\"product_inquiry\"".to_string()
            }
        } else if system.contains("extraction") {
            self.extractions
                .iter()
                .find(|(needle, _)| user.contains(needle))
                .map(|(_, reply)| reply.to_string())
                .unwrap_or_else(|| "[]".to_string())
        } else if user.contains("FAIL_REPLY") {
            return Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "connection reset by peer".into(),
            });
        } else {
            REPLY.to_string()
        };

        Ok(CompletionResponse {
            content,
            input_tokens: 50,
            output_tokens: 10,
            finish_reason: FinishReason::Stop,
        })
    }
}

const VOCAB: [&str; 8] = [
    "red", "dress", "blue", "denim", "leather", "boots", "canvas", "tote",
];

struct WordEmbedder;

#[async_trait]
impl EmbeddingProvider for WordEmbedder {
    fn embedding_model(&self) -> &str {
        "words"
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingResponse, LlmError> {
        let vectors = inputs
            .iter()
            .map(|text| {
                let tokens: Vec<String> = text
                    .split(|c: char| !c.is_alphanumeric())
                    .map(|t| t.to_lowercase())
                    .collect();
                VOCAB
                    .iter()
                    .map(|w| tokens.iter().filter(|t| t == w).count() as f32)
                    .collect()
            })
            .collect();
        Ok(EmbeddingResponse {
            vectors,
            input_tokens: 0,
        })
    }
}

fn write_inputs(dir: &Path) {
    std::fs::write(dir.join("products.csv"), PRODUCTS).unwrap();
    std::fs::write(dir.join("emails.csv"), EMAILS).unwrap();
}

fn read(dir: &Path, table: &str) -> String {
    std::fs::read_to_string(dir.join(format!("{table}.csv"))).unwrap()
}

/// Load inputs from `data`, run the pipeline, write tables to `out`.
async fn run_once(data: &Path, out: &Path, llm: Arc<ScriptedLlm>) -> (RunReport, Catalog) {
    let source = CsvDirSource::new(data);
    let mut catalog = load_catalog(&source).await.unwrap().records;
    let emails = load_emails(&source).await.unwrap().records;

    let mut pipeline = Pipeline::new(llm, Arc::new(WordEmbedder), RetrievalConfig::default());
    let mut sink = CsvSink::create(out).unwrap();
    let report = pipeline.run(&emails, &mut catalog, &mut sink).await;
    sink.flush().unwrap();
    (report, catalog)
}

#[tokio::test]
async fn full_run_writes_all_tables() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_inputs(data.path());

    let (report, catalog) = run_once(data.path(), out.path(), Arc::new(ScriptedLlm::new())).await;

    assert_eq!(
        read(out.path(), "email-classification"),
        "email_id,category\n\
         E1,order_request\n\
         E2,order_request\n\
         E3,product_inquiry\n\
         E4,order_request\n\
         E5,order_request\n"
    );

    // E1 takes 3 of 5; E2 asks for 3 of the remaining 2 and is refused.
    assert_eq!(
        read(out.path(), "order-status"),
        "email_id,product_id,quantity,status\n\
         E1,P1,3,created\n\
         E2,P1,3,out_of_stock\n\
         E4,LB300,1,created\n"
    );
    assert_eq!(catalog.get("P1").unwrap().stock, 2);
    assert_eq!(catalog.get("LB300").unwrap().stock, 1);

    let quoted = "\"Dear customer,\nThank you for contacting us.\"";
    assert_eq!(
        read(out.path(), "order-response"),
        format!("email_id,response\nE1,{quoted}\nE2,{quoted}\n")
    );
    assert_eq!(
        read(out.path(), "inquiry-response"),
        format!("email_id,response\nE3,{quoted}\n")
    );

    assert_eq!(report.emails, 5);
    assert_eq!(report.order_requests, 4);
    assert_eq!(report.product_inquiries, 1);
    assert_eq!(report.lines_created, 2);
    assert_eq!(report.lines_out_of_stock, 1);
    assert_eq!(report.responses, 3);
    let failed: Vec<(&str, Option<&str>)> = report
        .failures
        .iter()
        .map(|f| (f.email_id.as_str(), f.stage.as_deref()))
        .collect();
    assert_eq!(
        failed,
        [("E4", Some("response")), ("E5", Some("order extraction"))]
    );
}

#[tokio::test]
async fn reruns_produce_identical_tables() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_inputs(data.path());

    let tables = [
        "email-classification",
        "order-status",
        "order-response",
        "inquiry-response",
    ];

    run_once(data.path(), out.path(), Arc::new(ScriptedLlm::new())).await;
    let first: Vec<String> = tables.iter().map(|t| read(out.path(), t)).collect();

    run_once(data.path(), out.path(), Arc::new(ScriptedLlm::new())).await;
    let second: Vec<String> = tables.iter().map(|t| read(out.path(), t)).collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn inquiry_reply_lists_closest_products_first() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_inputs(data.path());

    let llm = Arc::new(ScriptedLlm::new());
    run_once(data.path(), out.path(), llm.clone()).await;

    let prompts = llm.reply_prompts();
    let inquiry = prompts
        .iter()
        .find(|p| p.contains("red dress for a wedding"))
        .expect("inquiry reply prompt");

    let red = inquiry.find("Product: Red Dress").expect("red dress listed");
    let denim = inquiry
        .find("Product: Blue Denim Dress")
        .expect("denim dress listed");
    assert!(red < denim);
    assert!(inquiry.contains("Stock: 4 units available"));
    assert!(!inquiry.contains("Leather Boots"));
    assert!(!inquiry.contains("Canvas Tote"));
}

#[tokio::test]
async fn order_reply_reports_each_line() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_inputs(data.path());

    let llm = Arc::new(ScriptedLlm::new());
    run_once(data.path(), out.path(), llm.clone()).await;

    let prompts = llm.reply_prompts();
    assert!(prompts.iter().any(|p| p.contains("- Canvas Tote: 3 units (confirmed)")));
    assert!(prompts.iter().any(|p| p.contains("- Canvas Tote: 3 units (out of stock)")));
}

#[tokio::test]
async fn dry_run_keeps_rows_in_memory_and_meters_usage() {
    let data = tempfile::tempdir().unwrap();
    write_inputs(data.path());
    let source = CsvDirSource::new(data.path());
    let mut catalog = load_catalog(&source).await.unwrap().records;
    let emails = load_emails(&source).await.unwrap().records;

    let llm = Arc::new(Metered::new(ScriptedLlm::new()));
    let mut pipeline =
        Pipeline::new(llm.clone(), Arc::new(WordEmbedder), RetrievalConfig::default());
    let mut sink = MemorySink::new();
    pipeline.run(&emails, &mut catalog, &mut sink).await;

    assert_eq!(sink.classifications.len(), 5);
    assert_eq!(sink.order_lines.len(), 3);
    assert_eq!(sink.order_responses.len(), 2);
    assert_eq!(sink.inquiry_responses.len(), 1);

    let json = sink.to_json();
    assert_eq!(json["order-status"][1]["status"], "out_of_stock");

    // Successful calls only: 3 + 3 + 2 for E1..E3, 2 each for E4 (reply fails) and E5
    // (extraction unparseable).
    let usage = llm.usage();
    assert_eq!(usage.completion_calls, 12);
    assert_eq!(usage.input_tokens, 600);
    assert_eq!(usage.estimated_cost, Decimal::ZERO);
}
