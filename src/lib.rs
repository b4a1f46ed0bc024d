//! # docrag
//!
//! A retrieval-augmented generation engine for PDF document question
//! answering.
//!
//! docrag ingests PDF documents and answers free-text queries by ranking
//! the cached chunks with cosine similarity. Ingestion runs per-page text
//! extraction, then boundary-aware overlapping chunking, then one embedding
//! per chunk. Results carry source metadata (file, title, page) so callers
//! can cite where an answer came from before handing the text to a language
//! model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────┐   ┌─────────────┐
//! │   PDF    │──▶│       Ingest        │──▶│ VectorCache │
//! │  bytes   │   │ Extract+Chunk+Embed │   │  (snapshot) │
//! └──────────┘   └─────────────────────┘   └──────┬──────┘
//!                                                 │
//!                        query ──▶ embed ──▶ rank ┘
//! ```
//!
//! Embeddings come from a local sentence-embedding model when the
//! `local-embeddings` feature is enabled and the model loads; otherwise a
//! deterministic hash-based fallback keeps every operation working with
//! reduced ranking quality.
//!
//! ## Quick Start
//!
//! ```bash
//! rag upload report.pdf             # extract, chunk, embed, cache
//! rag search "refund policy"        # rank chunks against a query
//! rag list                          # cached documents
//! rag health                        # backend + cache state
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`chunk`] | Page-scoped overlapping chunker |
//! | [`embedding`] | Trained model + deterministic fallback |
//! | [`cache`] | Persisted in-memory vector index |
//! | [`ingest`] | Document processing pipeline |
//! | [`service`] | Orchestration of all operations |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod models;
pub mod service;
