//! # Codebase Context - Indexing Lifecycle and Embedding Core
//!
//! The core of a semantic code search service: it tracks the indexing state of
//! every codebase it has seen, runs at most one indexing pass per codebase at a
//! time, and turns text into vectors through interchangeable embedding backends.
//!
//! ## Overview
//!
//! A codebase is keyed by its canonical directory path ([`CodebaseIdentity`]).
//! Its state (`not_indexed`, `indexing`, `indexed` or `index_failed`) lives in
//! a JSON snapshot that survives restarts. Walking, chunking and storing chunks
//! is the job of an [`IndexingPipeline`](lifecycle::IndexingPipeline); vector
//! database queries go through [`VectorStorage`](lifecycle::VectorStorage).
//! Both are supplied by the embedding application.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Command layer  │  (CLI, MCP server, editor plugin)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  ContextClient  │  index / search / status / clear
//! └────────┬────────┘
//!          │
//!    ┌─────┴──────────┬──────────────────┐
//!    │                │                  │
//! ┌──▼───────────┐ ┌──▼──────────────┐ ┌─▼──────────────────┐
//! │ Lifecycle    │ │ SnapshotStore   │ │ EmbeddingProvider  │
//! │ Manager      │ │ (JSON on disk)  │ │ OpenAI / Gemini /  │
//! └──────────────┘ └─────────────────┘ │ Ollama / FastEmbed │
//!                                      └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Facade tying the components together
//! - [`lifecycle`]: Single-run-per-codebase orchestration with progress
//! - [`snapshot`]: Persistent per-codebase indexing state
//! - [`embedding`]: Embedding providers and the model registry
//! - [`config`]: Configuration management with environment variable support
//! - [`types`]: Request/response types with JSON schema
//! - [`error`]: Error types
//! - [`paths`]: Codebase identity and platform directories

/// Client facade for indexing and searching codebases
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding providers (OpenAI, Gemini, Ollama, FastEmbed)
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Indexing run orchestration and collaborator traits
pub mod lifecycle;

/// Codebase identity normalization and platform paths
pub mod paths;

/// Persistent indexing state per codebase
pub mod snapshot;

/// Request/response types with JSON schema definitions
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::ContextClient;
pub use config::{AmbientEnv, Config};
pub use embedding::{EmbeddingProvider, EmbeddingVector, ProviderConfig, ProviderKind};
pub use error::{ContextError, ProviderError};
pub use lifecycle::{IndexLifecycleManager, IndexProgress, IndexingPipeline, VectorStorage};
pub use paths::CodebaseIdentity;
pub use snapshot::{IndexRecord, IndexStats, IndexStatus, SnapshotStore};
pub use types::*;
