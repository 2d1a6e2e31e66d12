use super::*;
use crate::config::SnapshotConfig;
use crate::embedding::ProviderKind;
use crate::error::ConfigError;
use crate::snapshot::IndexStats;
use crate::test_support::{FixedEmbedder, MockPipeline, MockStorage};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    codebase: PathBuf,
    snapshot_path: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let codebase = dir.path().join("repo");
        fs::create_dir_all(&codebase).unwrap();
        let snapshot_path = dir.path().join("snapshot.json");
        Self {
            _dir: dir,
            codebase,
            snapshot_path,
        }
    }

    fn path(&self) -> String {
        self.codebase.to_string_lossy().to_string()
    }

    fn identity(&self) -> CodebaseIdentity {
        CodebaseIdentity::resolve(&self.path()).unwrap()
    }

    fn config(&self) -> Config {
        Config {
            snapshot: SnapshotConfig {
                path: self.snapshot_path.clone(),
            },
            ..Default::default()
        }
    }

    fn client(&self, pipeline: MockPipeline, storage: MockStorage) -> ContextClient {
        self.client_with_embedder(pipeline, storage, FixedEmbedder::new(8))
    }

    fn client_with_embedder(
        &self,
        pipeline: MockPipeline,
        storage: MockStorage,
        embedder: FixedEmbedder,
    ) -> ContextClient {
        ContextClient::with_components(
            self.config(),
            Arc::new(embedder),
            Arc::new(pipeline),
            Arc::new(storage),
        )
        .unwrap()
    }

    fn seed_snapshot(&self, f: impl FnOnce(&mut SnapshotStore)) {
        let mut store = SnapshotStore::new(&self.snapshot_path);
        f(&mut store);
        store.save().unwrap();
    }
}

fn hit(path: &str) -> SearchHit {
    SearchHit {
        relative_path: path.to_string(),
        start_line: 1,
        end_line: 10,
        language: "Rust".to_string(),
        content: "fn main() {}".to_string(),
        score: 0.9,
    }
}

// ===== Construction =====

#[test]
fn test_new_fails_fast_without_api_key() {
    let h = Harness::new();
    let mut config = h.config();
    config.embedding.provider = Some(ProviderKind::OpenAi);

    let result = ContextClient::new(
        config,
        &AmbientEnv::default(),
        Arc::new(MockPipeline::succeeding(1, 1)),
        Arc::new(MockStorage::new()),
    );
    assert!(matches!(
        result,
        Err(ContextError::Config(ConfigError::MissingRequired(_)))
    ));
}

#[test]
fn test_new_resolves_provider_from_env() {
    let h = Harness::new();
    let env = AmbientEnv::from_pairs([
        ("EMBEDDING_PROVIDER", "ollama"),
        ("OLLAMA_MODEL", "mxbai-embed-large"),
    ]);

    let client = ContextClient::new(
        h.config(),
        &env,
        Arc::new(MockPipeline::succeeding(1, 1)),
        Arc::new(MockStorage::new()),
    )
    .unwrap();
    assert_eq!(client.embedding_dimension(), 1024);
    assert_eq!(client.embedding_provider().provider_name(), "Ollama");
}

#[test]
fn test_explicit_provider_config_wins() {
    let h = Harness::new();
    let env = AmbientEnv::from_pairs([("EMBEDDING_PROVIDER", "gemini")]);
    let explicit = ProviderConfig {
        provider: Some(ProviderKind::Ollama),
        output_dimensionality: Some(256),
        ..Default::default()
    };

    let client = ContextClient::with_provider_config(
        h.config(),
        &explicit,
        &env,
        Arc::new(MockPipeline::succeeding(1, 1)),
        Arc::new(MockStorage::new()),
    )
    .unwrap();
    assert_eq!(client.embedding_dimension(), 256);
}

#[test]
fn test_invalid_config_is_rejected() {
    let h = Harness::new();
    let mut config = h.config();
    config.search.limit = 0;

    let result = ContextClient::with_components(
        config,
        Arc::new(FixedEmbedder::new(8)),
        Arc::new(MockPipeline::succeeding(1, 1)),
        Arc::new(MockStorage::new()),
    );
    assert!(matches!(result, Err(ContextError::Config(_))));
}

#[tokio::test]
async fn test_startup_prunes_missing_codebases() {
    let h = Harness::new();
    let gone = CodebaseIdentity::from_lexical("/nonexistent/codebase/for/prune/test");
    h.seed_snapshot(|store| {
        store.set_indexed(&h.identity(), IndexStats::completed(1, 1));
        store.set_indexed(&gone, IndexStats::completed(1, 1));
    });

    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());
    assert_eq!(client.snapshot.read().await.len(), 1);

    let reloaded = SnapshotStore::load(&h.snapshot_path);
    assert_eq!(reloaded.get_status(&gone), IndexStatus::NotIndexed);
    assert_eq!(reloaded.get_status(&h.identity()), IndexStatus::Indexed);
}

// ===== Index =====

#[tokio::test]
async fn test_index_codebase_returns_stats() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(42, 210), MockStorage::new());
    let mut seen = Vec::new();

    let response = client
        .index_codebase(IndexRequest::new(h.path()), |p| seen.push(p.percentage))
        .await
        .unwrap();

    assert_eq!(response.path, h.identity().to_string());
    assert_eq!(response.indexed_files, 42);
    assert_eq!(response.total_chunks, 210);
    assert_eq!(response.status, "completed");
    assert_eq!(seen, vec![0.0, 50.0, 100.0]);
}

#[tokio::test]
async fn test_index_codebase_validates_request() {
    let h = Harness::new();
    let pipeline = MockPipeline::succeeding(1, 1);
    let client = h.client(pipeline, MockStorage::new());

    let mut request = IndexRequest::new(h.path());
    request.ignore_patterns = vec!["[unclosed".to_string()];
    let err = client.index_codebase(request, |_| {}).await.unwrap_err();
    assert!(matches!(
        err,
        ContextError::Validation(ValidationError::InvalidPattern { .. })
    ));

    let err = client
        .index_codebase(IndexRequest::new("  "), |_| {})
        .await
        .unwrap_err();
    assert!(err.is_user_error());
    assert!(client.snapshot.read().await.is_empty());
}

#[tokio::test]
async fn test_index_with_cancel_token() {
    let h = Harness::new();
    let mut pipeline = MockPipeline::succeeding(1, 1);
    pipeline.events = vec![5.0];
    pipeline.hang = true;
    let client = h.client(pipeline, MockStorage::new());

    let token = CancellationToken::new();
    let trigger = token.clone();
    let err = client
        .index_codebase_with_cancel(IndexRequest::new(h.path()), Some(token), move |_| {
            trigger.cancel()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ContextError::IndexFailed { .. }));
    let status = client
        .get_indexing_status(StatusRequest { path: h.path() })
        .await
        .unwrap();
    assert_eq!(status.status, IndexStatus::IndexFailed);
    assert_eq!(status.last_error.as_deref(), Some("Indexing was cancelled"));
}

#[tokio::test]
async fn test_index_succeeds_when_directory_vanishes_mid_run() {
    let h = Harness::new();
    let mut pipeline = MockPipeline::succeeding(3, 9);
    pipeline.remove_codebase = true;
    let client = h.client(pipeline, MockStorage::new());
    let identity = h.identity();

    let response = client
        .index_codebase(IndexRequest::new(h.path()), |_| {})
        .await
        .unwrap();

    assert!(!h.codebase.exists());
    assert_eq!(response.path, identity.to_string());
    assert_eq!(response.indexed_files, 3);
    assert_eq!(response.total_chunks, 9);
    let snapshot = client.snapshot.read().await;
    assert_eq!(snapshot.get_status(&identity), IndexStatus::Indexed);
}

#[tokio::test]
async fn test_configured_batch_size_reaches_pipeline() {
    let h = Harness::new();
    let mut config = h.config();
    config.embedding.batch_size = 32;
    let pipeline = Arc::new(MockPipeline::succeeding(1, 1));
    let client = ContextClient::with_components(
        config,
        Arc::new(FixedEmbedder::new(8)),
        pipeline.clone(),
        Arc::new(MockStorage::new()),
    )
    .unwrap();

    client
        .index_codebase(IndexRequest::new(h.path()), |_| {})
        .await
        .unwrap();

    let seen = pipeline.last_options.lock().unwrap().clone().unwrap();
    assert_eq!(seen.batch_size, 32);
}

// ===== Status =====

#[tokio::test]
async fn test_status_of_unknown_codebase() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());

    let status = client
        .get_indexing_status(StatusRequest { path: h.path() })
        .await
        .unwrap();
    assert_eq!(status.status, IndexStatus::NotIndexed);
    assert!(status.progress_percentage.is_none());
    assert!(status.updated_at.is_none());
    assert!(status.message.contains("not indexed"));
}

#[tokio::test]
async fn test_status_after_failure() {
    let h = Harness::new();
    let client = h.client(
        MockPipeline::failing(vec![10.0, 37.0], "backend timeout"),
        MockStorage::new(),
    );
    let _ = client
        .index_codebase(IndexRequest::new(h.path()), |_| {})
        .await;

    let status = client
        .get_indexing_status(StatusRequest { path: h.path() })
        .await
        .unwrap();
    assert_eq!(status.status, IndexStatus::IndexFailed);
    assert_eq!(status.progress_percentage, Some(37.0));
    assert_eq!(status.last_error.as_deref(), Some("backend timeout"));
    assert!(status.message.contains("37.0%"));
    assert!(status.updated_at.is_some());
}

#[tokio::test]
async fn test_status_of_deleted_directory_uses_lexical_identity() {
    let h = Harness::new();
    let doomed = h.codebase.join("doomed");
    fs::create_dir_all(&doomed).unwrap();
    let doomed_path = CodebaseIdentity::resolve(&doomed.to_string_lossy())
        .unwrap()
        .to_string();

    let client = h.client(MockPipeline::succeeding(2, 3), MockStorage::new());
    client
        .index_codebase(IndexRequest::new(doomed_path.clone()), |_| {})
        .await
        .unwrap();
    fs::remove_dir_all(&doomed).unwrap();

    let status = client
        .get_indexing_status(StatusRequest {
            path: format!("{}/", doomed_path),
        })
        .await
        .unwrap();
    assert_eq!(status.status, IndexStatus::Indexed);
    assert_eq!(status.last_indexed_stats, Some(IndexStats::completed(2, 3)));
}

#[tokio::test]
async fn test_status_json_is_snake_case_throughout() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(5, 20), MockStorage::new());
    client
        .index_codebase(IndexRequest::new(h.path()), |_| {})
        .await
        .unwrap();

    let status = client
        .get_indexing_status(StatusRequest { path: h.path() })
        .await
        .unwrap();
    let json = serde_json::to_value(&status).unwrap();
    let stats = &json["last_indexed_stats"];
    assert_eq!(stats["indexed_files"], 5);
    assert_eq!(stats["total_chunks"], 20);
    assert!(stats.get("indexedFiles").is_none());
}

// ===== Clear =====

#[tokio::test]
async fn test_clear_index_is_idempotent() {
    let h = Harness::new();
    let storage = MockStorage::new().with_collection(h.identity().collection_name());
    let client = h.client(MockPipeline::succeeding(1, 1), storage);
    client
        .index_codebase(
            IndexRequest {
                force: true,
                ..IndexRequest::new(h.path())
            },
            |_| {},
        )
        .await
        .unwrap();

    let first = client
        .clear_index(ClearRequest { path: h.path() })
        .await
        .unwrap();
    assert!(first.existed);
    assert!(first.collection_dropped);

    let second = client
        .clear_index(ClearRequest { path: h.path() })
        .await
        .unwrap();
    assert!(!second.existed);
    assert!(!second.collection_dropped);

    let reloaded = SnapshotStore::load(&h.snapshot_path);
    assert_eq!(reloaded.get_status(&h.identity()), IndexStatus::NotIndexed);
}

#[tokio::test]
async fn test_clear_releases_stuck_indexing_record() {
    let h = Harness::new();
    h.seed_snapshot(|store| store.set_indexing(&h.identity(), 12.0));
    let client = h.client(MockPipeline::succeeding(4, 4), MockStorage::new());

    let err = client
        .index_codebase(IndexRequest::new(h.path()), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::Concurrency { .. }));

    client
        .clear_index(ClearRequest { path: h.path() })
        .await
        .unwrap();
    let response = client
        .index_codebase(IndexRequest::new(h.path()), |_| {})
        .await
        .unwrap();
    assert_eq!(response.indexed_files, 4);
}

// ===== Search =====

#[tokio::test]
async fn test_search_requires_index() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());

    let err = client
        .search_code(client.search_request(h.path(), "parse config"))
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::NotIndexed { .. }));
}

#[tokio::test]
async fn test_search_returns_hits_with_filter() {
    let h = Harness::new();
    h.seed_snapshot(|store| store.set_indexed(&h.identity(), IndexStats::completed(1, 2)));
    let mut storage = MockStorage::new();
    storage.hits = vec![hit("src/main.rs"), hit("src/lib.rs"), hit("src/config.rs")];
    let storage = Arc::new(storage);

    let client = ContextClient::with_components(
        h.config(),
        Arc::new(FixedEmbedder::new(8)),
        Arc::new(MockPipeline::succeeding(1, 1)),
        storage.clone(),
    )
    .unwrap();

    let mut request = client.search_request(h.path(), "parse config");
    request.limit = 2;
    request.extension_filter = vec!["rs".to_string(), ".ts".to_string(), ".rs".to_string()];
    let response = client.search_code(request).await.unwrap();

    assert_eq!(response.results.len(), 2);
    assert!(!response.indexing_in_progress);

    let (collection, dims, limit, filter) = storage.last_search.lock().unwrap().clone().unwrap();
    assert_eq!(collection, h.identity().collection_name());
    assert_eq!(dims, 8);
    assert_eq!(limit, 2);
    assert_eq!(filter.as_deref(), Some(r#"fileExtension in [".rs", ".ts"]"#));
}

#[tokio::test]
async fn test_search_while_indexing_flags_partial_results() {
    let h = Harness::new();
    h.seed_snapshot(|store| store.set_indexing(&h.identity(), 40.0));
    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());

    let response = client
        .search_code(client.search_request(h.path(), "query"))
        .await
        .unwrap();
    assert!(response.indexing_in_progress);
}

#[tokio::test]
async fn test_search_rejects_dimension_mismatch() {
    let h = Harness::new();
    h.seed_snapshot(|store| store.set_indexed(&h.identity(), IndexStats::completed(1, 2)));
    let embedder = FixedEmbedder {
        dimension: 8,
        produced: 4,
    };
    let client =
        h.client_with_embedder(MockPipeline::succeeding(1, 1), MockStorage::new(), embedder);

    let err = client
        .search_code(client.search_request(h.path(), "query"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ContextError::Provider(ProviderError::DimensionMismatch {
            expected: 8,
            actual: 4
        })
    ));

    let err = client.verify_embedding_dimension().await.unwrap_err();
    assert!(matches!(
        err,
        ContextError::Provider(ProviderError::DimensionMismatch { .. })
    ));
}

#[tokio::test]
async fn test_verify_embedding_dimension() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());
    assert_eq!(client.verify_embedding_dimension().await.unwrap(), 8);
}

#[tokio::test]
async fn test_search_validates_limit() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());

    let mut request = client.search_request(h.path(), "query");
    request.limit = 51;
    let err = client.search_code(request).await.unwrap_err();
    assert!(matches!(
        err,
        ContextError::Validation(ValidationError::ConstraintViolation { .. })
    ));
}

// ===== Helpers =====

#[test]
fn test_extension_filter() {
    assert_eq!(extension_filter(&[]), None);
    assert_eq!(extension_filter(&[".".to_string()]), None);
    assert_eq!(
        extension_filter(&["rs".to_string()]).as_deref(),
        Some(r#"fileExtension in [".rs"]"#)
    );
}

#[test]
fn test_config_accessor() {
    let h = Harness::new();
    let client = h.client(MockPipeline::succeeding(1, 1), MockStorage::new());
    assert_eq!(client.config().search.limit, 10);
    assert_eq!(client.search_request("/x", "q").limit, 10);
    assert_eq!(client.embedding_dimension(), 8);
}
