use super::reviewer::Reviewer;
use super::state::{QueuePosition, ReviewState};
use crate::config::AppConfig;
use crate::result_sink::{CsvResultSink, EnrichmentResult, ResultSink};
use crate::review_store::{open_review_store, Decision, ReviewCounts, ReviewDecision};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Serialize)]
struct CurrentItemResponse {
    item: Option<EnrichmentResult>,
    total: usize,
    reviewed: usize,
    remaining: usize,
}

impl From<QueuePosition> for CurrentItemResponse {
    fn from(position: QueuePosition) -> Self {
        Self {
            item: position.current,
            total: position.total,
            reviewed: position.reviewed,
            remaining: position.remaining,
        }
    }
}

#[derive(Deserialize)]
struct DecisionBody {
    identifier: String,
}

#[derive(Serialize)]
struct DecisionsResponse {
    reviewer: String,
    decisions: Vec<ReviewDecision>,
    counts: ReviewCounts,
}

fn internal_error(context: &str, e: anyhow::Error) -> Response {
    error!("{}: {:#}", context, e);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn current_response(state: &ReviewState, reviewer: &str) -> Response {
    match state.position(reviewer) {
        Ok(position) => Json(CurrentItemResponse::from(position)).into_response(),
        Err(e) => internal_error("Failed to compute review position", e),
    }
}

async fn get_current(Reviewer(reviewer): Reviewer, State(state): State<ReviewState>) -> Response {
    current_response(&state, &reviewer)
}

fn decide(state: &ReviewState, reviewer: &str, identifier: &str, decision: Decision) -> Response {
    let Some(item) = state.find(identifier) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let record = ReviewDecision {
        identifier: item.identifier.clone(),
        secondary_identifier: item.secondary_identifier.clone(),
        detected_label: item.detected_label.to_string(),
        image_url: item.image_url.clone(),
        decision,
        reviewer: reviewer.to_string(),
        decided_at: Utc::now(),
    };
    match state.store.record_decision(&record) {
        Ok(true) => {
            info!(
                "{} {} {} ({})",
                reviewer,
                decision.as_str().to_lowercase(),
                identifier,
                record.detected_label
            );
            current_response(state, reviewer)
        }
        Ok(false) => StatusCode::CONFLICT.into_response(),
        Err(e) => internal_error("Failed to record review decision", e),
    }
}

async fn post_approve(
    Reviewer(reviewer): Reviewer,
    State(state): State<ReviewState>,
    Json(body): Json<DecisionBody>,
) -> Response {
    decide(&state, &reviewer, &body.identifier, Decision::Approved)
}

async fn post_reject(
    Reviewer(reviewer): Reviewer,
    State(state): State<ReviewState>,
    Json(body): Json<DecisionBody>,
) -> Response {
    decide(&state, &reviewer, &body.identifier, Decision::Rejected)
}

async fn post_next(Reviewer(reviewer): Reviewer, State(state): State<ReviewState>) -> Response {
    state.skip(&reviewer);
    current_response(&state, &reviewer)
}

async fn get_decisions(Reviewer(reviewer): Reviewer, State(state): State<ReviewState>) -> Response {
    let decisions = match state.store.list_decisions(&reviewer) {
        Ok(d) => d,
        Err(e) => return internal_error("Failed to list review decisions", e),
    };
    let mut counts = ReviewCounts::default();
    for d in &decisions {
        counts.add(d.decision);
    }
    Json(DecisionsResponse {
        reviewer,
        decisions,
        counts,
    })
    .into_response()
}

pub fn make_app(state: ReviewState) -> Router {
    let api_routes: Router = Router::new()
        .route("/current", get(get_current))
        .route("/approve", post(post_approve))
        .route("/reject", post(post_reject))
        .route("/next", post(post_next))
        .route("/decisions", get(get_decisions))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}

pub async fn run_server(state: ReviewState, port: u16) -> Result<()> {
    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind review server to port {}", port))?;
    info!("Review API listening on 127.0.0.1:{}", port);
    Ok(axum::serve(listener, app).await?)
}

/// Loads the result file and serves the review API until interrupted.
pub fn serve(config: &AppConfig) -> Result<()> {
    let sink = CsvResultSink::new(&config.results_path, config.columns.clone());
    let results = sink.load()?;
    let store = open_review_store(&config.review)?;
    let state = ReviewState::new(results, store);
    let counts = state.store.counts()?;
    info!(
        "Review store has {} decisions ({} approved, {} rejected)",
        counts.total(),
        counts.approved,
        counts.rejected
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run_server(state, config.review.port))
}
