use anyhow::{Context, Result};
use clap::Parser;
use insight_engine::dataset::{validate_upload, Dataset};
use insight_engine::llm::{default_dashboard, LlmClient};
use insight_engine::session::{DashboardSession, UserContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Generate and inspect an analytics dashboard for a tabular dataset")]
struct Args {
    /// CSV file to analyze
    file: PathBuf,

    /// Free-text requirements steering the generated dashboard
    #[arg(short, long)]
    requirements: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var); omit for the
    /// heuristic generator
    #[arg(long)]
    api_key: Option<String>,

    /// User id recorded against the session
    #[arg(long, default_value = "cli")]
    user: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let size = std::fs::metadata(&args.file)
        .with_context(|| format!("Failed to stat {}", args.file.display()))?
        .len();
    validate_upload(&file_name, size)?;

    let csv_text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let dataset = Arc::new(Dataset::from_csv_text(&file_name, &csv_text)?);
    info!(rows = dataset.row_count(), columns = dataset.columns.len(), "Dataset loaded");

    let api_key = args
        .api_key
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    let client = LlmClient::new(api_key);

    let config = match client
        .generate_dashboard(&dataset, args.requirements.as_deref())
        .await
    {
        Ok(config) => config,
        Err(e) => {
            info!("Generation via collaborator failed ({}); using heuristic layout", e);
            default_dashboard(&dataset)
        }
    };

    let mut session = DashboardSession::new(dataset, config, UserContext::new(args.user))?;

    println!("== {} ==", session.config().title);
    if !session.config().rationale.is_empty() {
        println!("{}", session.config().rationale);
    }

    println!("\nKPIs:");
    for kpi in session.kpi_values() {
        let label = kpi.label.unwrap_or_else(|| kpi.id.clone());
        println!("  {}: {}", label, kpi.formatted);
    }

    println!("\nCharts:");
    for (chart_id, buckets) in session.all_chart_data() {
        let title = session
            .config()
            .chart(&chart_id)
            .and_then(|c| c.title.clone())
            .unwrap_or_else(|| chart_id.clone());
        println!("  {}:", title);
        for bucket in buckets {
            println!("    {:<24} {:>12.2} ({:.1}%)", bucket.label, bucket.value, bucket.percent);
        }
    }

    Ok(())
}
