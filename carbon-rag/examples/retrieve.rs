//! # Retrieve Example
//!
//! Builds (or loads) the index for a knowledge-base directory and prints the
//! context retrieved for a question.
//!
//! Uses the local `HashingEmbedder`, so it runs with **zero API keys**. With
//! the `openai` feature and `GROQ_API_KEY` set, the context is also passed to
//! a Groq chat model and the generated answer is printed.
//!
//! Run: `cargo run --example retrieve -- [--kb DIR] [--config FILE] [--rebuild] <question>`
//!
//! Logging is controlled with `RUST_LOG` (for example `RUST_LOG=carbon_rag=debug`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use carbon_rag::{HashingEmbedder, RagConfig, RetrievalPipeline};
use tracing_subscriber::EnvFilter;

const DEFAULT_KNOWLEDGE_BASE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/knowledge_base");

struct Args {
    knowledge_base: PathBuf,
    config: Option<PathBuf>,
    rebuild: bool,
    question: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut knowledge_base = PathBuf::from(DEFAULT_KNOWLEDGE_BASE);
    let mut config = None;
    let mut rebuild = false;
    let mut words = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--kb" => knowledge_base = args.next().context("--kb needs a directory")?.into(),
            "--config" => config = Some(args.next().context("--config needs a file")?.into()),
            "--rebuild" => rebuild = true,
            _ => words.push(arg),
        }
    }

    if words.is_empty() {
        bail!("usage: retrieve [--kb DIR] [--config FILE] [--rebuild] <question>");
    }
    Ok(Args { knowledge_base, config, rebuild, question: words.join(" ") })
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RagConfig> {
    let Some(path) = path else {
        return Ok(RagConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: RagConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;
    let config = load_config(args.config.as_ref())?;
    let max_context_length = config.max_context_length;

    // The pipeline is constructed once here and shared explicitly.
    let pipeline = Arc::new(
        RetrievalPipeline::builder()
            .config(config)
            .embedding_provider(Arc::new(HashingEmbedder::default()))
            .knowledge_base(&args.knowledge_base)
            .build()?,
    );

    let skipped = if args.rebuild {
        let report = pipeline.rebuild_from_source().await?;
        println!(
            "Rebuilt index: {} documents, {} chunks",
            report.document_count, report.chunk_count
        );
        report.skipped
    } else {
        let status = pipeline.load_or_build().await?;
        println!("Index ready ({:?}): {} chunks", status.origin, status.entry_count);
        status.skipped
    };
    for error in skipped {
        eprintln!("skipped: {error}");
    }

    println!("\nQuestion: {}\n", args.question);
    let context = pipeline.retrieve_context_for(&args.question, max_context_length).await;
    println!("{context}");

    #[cfg(feature = "openai")]
    if let Ok(key) = std::env::var("GROQ_API_KEY") {
        use carbon_rag::openai::OpenAIChatGenerator;

        let generator = OpenAIChatGenerator::groq(key)?;
        let composer = carbon_rag::AnswerComposer::new(pipeline.clone(), Arc::new(generator));
        let answer = composer.answer(&args.question).await;
        println!("Answer:\n{}", answer.text);
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  [Source {}] {} (score {:.3})", i + 1, source.chunk.id, source.score);
        }
    }

    Ok(())
}
