use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mailroom::config::{InputConfig, PipelineConfig};
use mailroom::llm::{EmbeddingProvider, LlmProvider, create_client};
use mailroom::pipeline::Pipeline;
use mailroom::sheets::{
    CsvDirSource, CsvSink, MemorySink, OutputSink, SheetsSource, TableSource, load_catalog,
    load_emails,
};

/// Timeout for fetching input sheets.
const SHEETS_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("Failed to read configuration")?;
    let _guard = init_tracing(&config.log_file)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(run(config))
}

/// Log to stderr and to `log_file`. The returned guard flushes the file on drop.
fn init_tracing(log_file: &Path) -> anyhow::Result<WorkerGuard> {
    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", log_file.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();
    Ok(guard)
}

async fn run(config: PipelineConfig) -> anyhow::Result<()> {
    eprintln!("📬 mailroom v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Embeddings: {}", config.llm.embedding_model);

    let source: Box<dyn TableSource> = match &config.input {
        InputConfig::CsvDir(dir) => Box::new(CsvDirSource::new(dir)),
        InputConfig::Sheets { spreadsheet_id } => Box::new(
            SheetsSource::new(spreadsheet_id.clone(), SHEETS_TIMEOUT)
                .context("Failed to set up Google Sheets client")?,
        ),
    };
    eprintln!("   Input: {}", source.describe());

    let catalog = load_catalog(source.as_ref())
        .await
        .context("Failed to load product catalog")?;
    let emails = load_emails(source.as_ref())
        .await
        .context("Failed to load emails")?;
    let skipped_rows = catalog.skipped.len() + emails.skipped.len();
    if skipped_rows > 0 {
        warn!(skipped_rows, "Some input rows were skipped");
    }
    let mut catalog = catalog.records;
    let emails = emails.records;

    let client = Arc::new(create_client(&config.llm).context("Failed to create LLM client")?);
    let llm: Arc<dyn LlmProvider> = client.clone();
    let embedder: Arc<dyn EmbeddingProvider> = client.clone();
    let mut pipeline = Pipeline::new(llm, embedder, config.retrieval.clone());

    let (mut report, dry_run_tables) = if config.dry_run {
        let mut sink = MemorySink::new();
        let report = pipeline.run(&emails, &mut catalog, &mut sink).await;
        (report, Some(sink))
    } else {
        let mut sink = CsvSink::create(&config.output_dir).with_context(|| {
            format!("Failed to create output tables in {}", config.output_dir.display())
        })?;
        let report = pipeline.run(&emails, &mut catalog, &mut sink).await;
        sink.flush().context("Failed to flush output tables")?;
        eprintln!("   Output: {}", sink.dir().display());
        (report, None)
    };
    report.skipped_rows = skipped_rows;
    report.usage = client.usage();

    // Dry runs print the tables and the run report as one JSON document.
    if let Some(sink) = dry_run_tables {
        let output = serde_json::json!({
            "tables": sink.to_json(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    info!(
        run_id = %report.run_id,
        emails = report.emails,
        failed = report.failures.len(),
        order_lines = report.order_lines,
        created = report.lines_created,
        out_of_stock = report.lines_out_of_stock,
        truncated = report.truncated_responses,
        skipped_rows = report.skipped_rows,
        tokens = report.usage.total_tokens(),
        cost_usd = %report.usage.estimated_cost,
        "Run summary"
    );
    eprintln!(
        "   Processed {}/{} emails ({} failed), est. cost ${}",
        report.succeeded(),
        report.emails,
        report.failures.len(),
        report.usage.estimated_cost.round_dp(4)
    );
    for failure in &report.failures {
        eprintln!("   ✗ {}: {}", failure.email_id, failure.error);
    }
    Ok(())
}
