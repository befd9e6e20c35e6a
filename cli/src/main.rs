//! Offline driver for the retrieval engine: build indexes from a chunk
//! stream, then run queries against them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use sift_chunk::Chunk;
use sift_embeddings::{DEFAULT_EMBEDDING_DIM, Embedder, HashingEmbedder};
use sift_index::{KeywordIndex, VectorIndex};
use sift_retrieval::{EngineConfig, RetrievalEngine};
use sift_tokenizer::TokenizerMode;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const VECTOR_INDEX_FILE: &str = "vectors.json";
const KEYWORD_INDEX_FILE: &str = "keywords.json";

#[derive(Debug, Parser)]
#[command(name = "sift", about = "Hybrid retrieval over an indexed corpus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build vector and keyword indexes from a JSONL chunk stream
    Index(IndexArgs),

    /// Query previously built indexes
    Query(QueryArgs),
}

#[derive(Debug, Parser)]
struct IndexArgs {
    /// JSONL file with one chunk per line
    #[arg(long, value_name = "FILE")]
    chunks: PathBuf,

    /// Directory to write the index files into
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    /// Tokenize with whitespace words only (no identifier splitting)
    #[arg(long)]
    plain_tokenizer: bool,

    /// Embedding dimension for chunks arriving without embeddings
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    dimension: usize,
}

#[derive(Debug, Parser)]
struct QueryArgs {
    /// Directory holding the index files
    #[arg(long, value_name = "DIR")]
    index: PathBuf,

    /// Query text
    #[arg(value_name = "QUERY", required = true)]
    query: Vec<String>,

    /// Token budget for the packed result
    #[arg(long)]
    budget: Option<usize>,

    /// Maximum number of artifacts
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Index(args) => run_index(args),
        Command::Query(args) => run_query(args).await,
    }
}

fn run_index(args: IndexArgs) -> Result<()> {
    let chunks = read_chunks(&args.chunks, args.dimension)?;
    info!("Read {} chunks from {}", chunks.len(), args.chunks.display());

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let mode = if args.plain_tokenizer {
        TokenizerMode::Plain
    } else {
        TokenizerMode::CodeAware
    };

    let keyword_index = KeywordIndex::build(&chunks, mode);
    keyword_index.save(&args.out.join(KEYWORD_INDEX_FILE))?;

    let vector_index = VectorIndex::build(chunks)?;
    vector_index.save(&args.out.join(VECTOR_INDEX_FILE))?;

    println!(
        "Indexed {} chunks (dimension {}) into {}",
        vector_index.len(),
        vector_index.dimension(),
        args.out.display()
    );
    Ok(())
}

async fn run_query(args: QueryArgs) -> Result<()> {
    let vector_index = Arc::new(VectorIndex::load(&args.index.join(VECTOR_INDEX_FILE))?);
    let keyword_index = Arc::new(KeywordIndex::load(&args.index.join(KEYWORD_INDEX_FILE))?);
    let embedder = Arc::new(HashingEmbedder::new(vector_index.dimension()));

    let config = EngineConfig::default();
    let token_budget = args.budget.unwrap_or(config.token_budget);
    let max_artifacts = args.limit.unwrap_or(config.max_artifacts);

    let engine = RetrievalEngine::new(config, vector_index, keyword_index, embedder)?;

    let query = args.query.join(" ");
    let result = engine
        .retrieve_with_budget(&query, token_budget, max_artifacts)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "strategy: {}  artifacts: {}  tokens: {}  candidates: {}  elapsed: {}ms",
        result.strategy_name(),
        result.len(),
        result.tokens_used,
        result.candidates_considered,
        result.elapsed_ms
    );
    if let Some(quality) = result.quality() {
        println!(
            "verdict: {:?} ({:.3})  correction: {:?}  reranked: {}",
            quality.verdict.category, quality.verdict.score, quality.correction, quality.reranked
        );
    }
    for (i, artifact) in result.artifacts.iter().enumerate() {
        println!(
            "\n{}. {} ({:.2})",
            i + 1,
            artifact.chunk.source_path,
            artifact.relevance
        );
        for line in artifact.chunk.content.lines().take(4) {
            println!("   {line}");
        }
    }
    Ok(())
}

/// Read one chunk per JSONL line, hashing an embedding for any chunk that
/// arrived without one.
fn read_chunks(path: &Path, dimension: usize) -> Result<Vec<Chunk>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let embedder = HashingEmbedder::new(dimension);

    let mut chunks = Vec::new();
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut chunk: Chunk = serde_json::from_str(&line)
            .with_context(|| format!("parsing chunk on line {}", line_no + 1))?;
        if chunk.embedding.is_none() {
            chunk.embedding = Some(embedder.embed_one(&chunk.content)?);
        }
        chunks.push(chunk);
    }
    Ok(chunks)
}
