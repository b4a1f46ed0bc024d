//! # docrag CLI (`rag`)
//!
//! The `rag` binary is the command-line interface to the docrag engine. It
//! provides commands for uploading PDF documents, searching their chunks,
//! and managing the vector cache.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag upload <file>` | Extract, chunk, embed, and cache a PDF |
//! | `rag search "<query>"` | Rank cached chunks against a query |
//! | `rag get <id>` | Show one cached document |
//! | `rag list` | List all cached documents |
//! | `rag remove <id>` | Remove a document from the cache |
//! | `rag clear` | Remove everything, including the snapshot file |
//! | `rag health` | Show embedding backend and cache state |
//!
//! ## Examples
//!
//! ```bash
//! # Cache a document
//! rag upload ./reports/q3-summary.pdf
//!
//! # Search everything
//! rag search "refund policy"
//!
//! # Search within one document, more results, lower threshold
//! rag search "gross margin" --doc 4f1f86f0-... --limit 10 --min-similarity 0.0
//!
//! # Inspect the cache
//! rag list
//! rag health
//! ```
//!
//! Logs go to stderr (filter with `RUST_LOG`); command output goes to
//! stdout.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docrag::config;
use docrag::service::RagService;

/// Command-line interface to the docrag engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; a missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "A RAG engine for PDF document question answering",
    version,
    long_about = "docrag ingests PDF documents (per-page text extraction, boundary-aware \
    overlapping chunking, local embeddings), caches the chunk vectors in a persisted \
    in-memory index, and ranks chunks against free-text queries with cosine similarity."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./rag.toml`. Cache, chunking, embedding, and retrieval
    /// settings are read from this file; a missing file is not an error.
    #[arg(long, global = true, default_value = "./rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload and process a PDF document.
    ///
    /// Extracts per-page text, chunks it, embeds every chunk, and stores
    /// the result in the cache. Fails when the PDF is unreadable or no
    /// page contains extractable text.
    Upload {
        /// Path to the PDF file.
        file: PathBuf,
    },

    /// Search cached documents.
    ///
    /// Embeds the query and ranks every cached chunk by cosine similarity,
    /// printing the top matches with their source page and an excerpt.
    Search {
        /// The search query string.
        query: String,

        /// Restrict the search to one document id.
        #[arg(long)]
        doc: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Drop results scoring below this cosine similarity.
        ///
        /// Hyphen-leading values (`-inf`, negative thresholds) must reach
        /// `parse_min_similarity` instead of being lexed as flags.
        #[arg(long, allow_hyphen_values = true, value_parser = parse_min_similarity)]
        min_similarity: Option<f32>,
    },

    /// Show one cached document.
    Get {
        /// Document id.
        id: String,
    },

    /// List all cached documents.
    List,

    /// Remove a document and its vectors from the cache.
    Remove {
        /// Document id.
        id: String,
    },

    /// Remove every cached document and delete the snapshot file.
    Clear,

    /// Show embedding backend and cache state.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("docrag=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let service = RagService::new(cfg);

    match cli.command {
        Commands::Upload { file } => {
            run_upload(&service, &file).await?;
        }
        Commands::Search {
            query,
            doc,
            limit,
            min_similarity,
        } => {
            run_search(&service, &query, doc.as_deref(), limit, min_similarity).await;
        }
        Commands::Get { id } => {
            run_get(&service, &id);
        }
        Commands::List => {
            run_list(&service);
        }
        Commands::Remove { id } => {
            run_remove(&service, &id);
        }
        Commands::Clear => {
            service.clear_cache();
            println!("Cache cleared.");
        }
        Commands::Health => {
            run_health(&service);
        }
    }

    Ok(())
}

async fn run_upload(service: &RagService, file: &Path) -> anyhow::Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| anyhow::anyhow!("invalid file name: {}", file.display()))?;

    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let document_id = service.upload_document(&filename, bytes).await?;

    println!("Uploaded {}", filename);
    println!("  id:     {}", document_id);
    if let Some(summary) = service.get_document_info(&document_id) {
        println!("  title:  {}", summary.title);
        println!("  pages:  {}", summary.total_pages);
        println!("  chunks: {}", summary.chunk_count);
    }
    Ok(())
}

async fn run_search(
    service: &RagService,
    query: &str,
    document_id: Option<&str>,
    limit: Option<usize>,
    min_similarity: Option<f32>,
) {
    if query.trim().is_empty() {
        println!("No results.");
        return;
    }

    let results = service
        .search_documents(query, document_id, limit, min_similarity)
        .await;

    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} (page {}/{})",
            i + 1,
            result.similarity,
            result.source.title,
            result.source.page_number,
            result.source.total_pages
        );
        println!("    file: {}", result.source.filename);
        println!("    excerpt: \"{}\"", excerpt(&result.chunk.content));
        println!("    id: {}", result.chunk.id);
        println!();
    }
}

fn run_get(service: &RagService, id: &str) {
    let summary = match service.get_document_info(id) {
        Some(summary) => summary,
        None => {
            println!("Document not found: {}", id);
            return;
        }
    };

    println!("--- Document ---");
    println!("id:           {}", summary.id);
    println!("title:        {}", summary.title);
    println!("filename:     {}", summary.filename);
    println!("pages:        {}", summary.total_pages);
    println!("chunks:       {}", summary.chunk_count);
    println!(
        "processed_at: {}",
        summary.processed_at.format("%Y-%m-%dT%H:%M:%SZ")
    );
}

fn run_list(service: &RagService) {
    let documents = service.list_documents();
    if documents.is_empty() {
        println!("No documents cached.");
        return;
    }

    println!("--- Documents ({}) ---", documents.len());
    for doc in &documents {
        println!(
            "{}  {} ({} pages, {} chunks)",
            doc.id, doc.title, doc.total_pages, doc.chunk_count
        );
    }
}

fn run_remove(service: &RagService, id: &str) {
    if service.remove_document(id) {
        println!("Removed {}", id);
    } else {
        println!("Document not found: {}", id);
    }
}

fn run_health(service: &RagService) {
    let health = service.health_check();

    println!("--- Health ---");
    println!("embedding backend: {}", health.embedding_backend);
    println!(
        "trained model:     {}",
        if health.trained_model_available {
            "available"
        } else {
            "fallback in use"
        }
    );
    println!("cached documents:  {}", health.cached_documents);
    println!("total chunks:      {}", health.total_chunks);
    println!("cache dir:         {}", health.cache_dir.display());
}

/// Parse `--min-similarity`, rejecting NaN and infinities the same way
/// configuration validation does. `score < NaN` is false for every score,
/// so a NaN threshold would silently admit everything.
fn parse_min_similarity(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("not a number: {}", e))?;
    if !value.is_finite() {
        return Err("must be a finite number".to_string());
    }
    Ok(value)
}

/// First 160 characters of a chunk with newlines collapsed.
fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();

    if trimmed.chars().count() <= 160 {
        return trimmed.to_string();
    }

    let cut: String = trimmed.chars().take(160).collect();
    format!("{}...", cut.trim_end())
}
