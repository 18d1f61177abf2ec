//! Oracle-backed pattern enrichment.

pub mod anthropic;
mod error;
pub mod gemini;
mod image_budget;
mod image_fetch;
mod label;
mod oracle;
mod prompt;
mod retry_policy;
mod sleeper;
mod worker;

pub use anthropic::AnthropicOracle;
pub use error::{FetchError, OracleError};
pub use gemini::GeminiOracle;
pub use image_budget::{base64_len, ImageBudget};
pub use image_fetch::{resolve_media_type, HttpImageFetcher, ImageFetcher};
pub use label::{
    DetectedLabel, LabelNormalizer, PatternLabel, DEFAULT_LONG_RESPONSE_THRESHOLD, EXCLUDED_STYLES,
};
pub use oracle::{ApiKeySource, ImagePayload, OracleRequest, PatternOracle};
pub use prompt::build_instruction;
pub use retry_policy::{RetryDecision, RetryPolicy};
pub use sleeper::{Sleeper, ThreadSleeper};
pub use worker::{EnrichmentWorker, RunSummary, StopReason};

use crate::config::{OracleProvider, OracleSettings};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds the configured oracle. Fails when no credential is available.
pub fn build_oracle(settings: &OracleSettings) -> Result<Arc<dyn PatternOracle>> {
    let key_source =
        ApiKeySource::resolve(&settings.api_key_env, settings.api_key_command.as_deref())?;
    let timeout = Duration::from_secs(settings.timeout_secs);
    let oracle: Arc<dyn PatternOracle> = match settings.provider {
        OracleProvider::Gemini => Arc::new(GeminiOracle::new(
            settings.base_url.clone(),
            settings.model.clone(),
            key_source,
            timeout,
        )?),
        OracleProvider::Anthropic => Arc::new(AnthropicOracle::new(
            settings.base_url.clone(),
            settings.model.clone(),
            settings.max_tokens,
            key_source,
            timeout,
        )?),
    };
    info!("Using {} oracle, model {}", oracle.name(), settings.model);
    Ok(oracle)
}

/// Payload budget for the configured oracle, if it enforces one.
pub fn image_budget_for(settings: &OracleSettings) -> Option<ImageBudget> {
    settings
        .max_encoded_image_bytes
        .map(|max| ImageBudget::new(max, settings.max_image_dimension))
}
