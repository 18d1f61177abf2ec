use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Paths (can override CLI)
    pub data_dir: Option<String>,
    pub catalog_path: Option<String>,
    pub work_queue_path: Option<String>,
    pub results_path: Option<String>,

    // Sections
    pub columns: Option<ColumnsConfig>,
    pub filter: Option<FilterConfig>,
    pub enrichment: Option<EnrichmentConfig>,
    pub oracle: Option<OracleConfig>,
    pub review: Option<ReviewConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ColumnsConfig {
    pub category: Option<String>,
    pub label: Option<String>,
    pub identifier: Option<String>,
    pub secondary_identifier: Option<String>,
    pub image_references: Option<String>,
    pub image_url: Option<String>,
    pub original_label: Option<String>,
    pub detected_label: Option<String>,
    pub processed_at: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub category_substring: Option<String>,
    pub chunk_size: Option<usize>,
    pub image_role: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub sample_size: Option<usize>,
    pub max_attempts: Option<u32>,
    pub requests_per_minute: Option<u32>,
    pub daily_request_cap: Option<usize>,
    pub rate_limit_buffer_secs: Option<u64>,
    pub rate_limit_base_secs: Option<u64>,
    pub transient_backoff_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
    pub long_response_threshold: Option<usize>,
    pub stop_on_quota_exhausted: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct OracleConfig {
    /// "gemini" or "anthropic"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the key (never the key).
    pub api_key_env: Option<String>,
    pub api_key_command: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub max_encoded_image_bytes: Option<usize>,
    pub max_image_dimension: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ReviewConfig {
    pub port: Option<u16>,
    /// "sqlite" or "csv"
    pub backend: Option<String>,
    pub db_path: Option<String>,
    pub approved_path: Option<String>,
    pub rejected_path: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
