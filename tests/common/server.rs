use pattern_curator::enrichment::DetectedLabel;
use pattern_curator::result_sink::EnrichmentResult;
use pattern_curator::review_server::{make_app, ReviewState};
use pattern_curator::review_store::ReviewStore;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Review API served on a random local port.
pub struct TestServer {
    pub base_url: String,
    pub store: Arc<dyn ReviewStore>,
    _dir: TempDir,
}

impl TestServer {
    pub async fn spawn(results: Vec<EnrichmentResult>) -> Self {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ReviewStore> = Arc::new(
            pattern_curator::review_store::SqliteReviewStore::new(dir.path().join("reviews.db"))
                .unwrap(),
        );
        Self::spawn_with_store(results, store, dir).await
    }

    pub async fn spawn_with_store(
        results: Vec<EnrichmentResult>,
        store: Arc<dyn ReviewStore>,
        dir: TempDir,
    ) -> Self {
        let app = make_app(ReviewState::new(results, store.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            store,
            _dir: dir,
        }
    }

    pub fn result(id: &str, label: &str) -> EnrichmentResult {
        EnrichmentResult {
            identifier: id.to_string(),
            secondary_identifier: format!("P-{}", id),
            existing_label: String::new(),
            detected_label: DetectedLabel::parse(label),
            image_url: format!("https://cdn.example/{}.jpg", id),
            processed_at: None,
        }
    }
}
