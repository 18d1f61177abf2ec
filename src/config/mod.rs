mod file_config;

pub use file_config::{
    ColumnsConfig, EnrichmentConfig, FileConfig, FilterConfig, OracleConfig, ReviewConfig,
};

use crate::catalog::ColumnLayout;
use crate::enrichment::{anthropic, gemini, DEFAULT_LONG_RESPONSE_THRESHOLD};
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_WORK_QUEUE_FILE: &str = "rugs_empty_pattern_with_design_images.csv";
const DEFAULT_RESULTS_FILE: &str = "ai_pattern_results.csv";
const DEFAULT_REVIEW_DB_FILE: &str = "reviews.db";
const DEFAULT_APPROVED_FILE: &str = "approved_patterns.csv";
const DEFAULT_REJECTED_FILE: &str = "rejected_patterns.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OracleProvider {
    Gemini,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReviewBackend {
    Sqlite,
    Csv,
}

/// CLI arguments that can be used for config resolution.
/// Values here are overridden by the TOML config where it sets them.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub work_queue_path: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
    pub sample_size: usize,
    pub provider: OracleProvider,
    pub port: u16,
    pub review_backend: ReviewBackend,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            catalog_path: None,
            work_queue_path: None,
            results_path: None,
            sample_size: 20,
            provider: OracleProvider::Gemini,
            port: 5000,
            review_backend: ReviewBackend::Sqlite,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub work_queue_path: PathBuf,
    pub results_path: PathBuf,

    pub columns: ColumnLayout,
    pub filter: FilterSettings,
    pub enrichment: EnrichmentSettings,
    pub oracle: OracleSettings,
    pub review: ReviewSettings,
}

#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub category_substring: String,
    pub chunk_size: usize,
    pub image_role: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            category_substring: "rug".to_string(),
            chunk_size: 10_000,
            image_role: "design".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub sample_size: usize,
    pub max_attempts: u32,
    pub requests_per_minute: u32,
    pub daily_request_cap: Option<usize>,
    pub rate_limit_buffer_secs: u64,
    pub rate_limit_base_secs: u64,
    pub transient_backoff_secs: u64,
    pub fetch_timeout_secs: u64,
    pub long_response_threshold: usize,
    pub stop_on_quota_exhausted: bool,
}

impl EnrichmentSettings {
    /// Pause between items that keeps the run under `requests_per_minute`.
    pub fn inter_item_delay(&self) -> Duration {
        if self.requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / self.requests_per_minute as f64)
        }
    }
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            sample_size: 20,
            max_attempts: 3,
            requests_per_minute: 15,
            daily_request_cap: None,
            rate_limit_buffer_secs: 5,
            rate_limit_base_secs: 30,
            transient_backoff_secs: 3,
            fetch_timeout_secs: 30,
            long_response_threshold: DEFAULT_LONG_RESPONSE_THRESHOLD,
            stop_on_quota_exhausted: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub provider: OracleProvider,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub api_key_command: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    /// Ceiling on the base64 image size; `None` sends images as fetched.
    pub max_encoded_image_bytes: Option<usize>,
    pub max_image_dimension: u32,
}

impl OracleSettings {
    pub fn defaults_for(provider: OracleProvider) -> Self {
        match provider {
            OracleProvider::Gemini => Self {
                provider,
                model: gemini::DEFAULT_MODEL.to_string(),
                base_url: gemini::DEFAULT_BASE_URL.to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
                api_key_command: None,
                timeout_secs: 60,
                max_tokens: 10,
                max_encoded_image_bytes: None,
                max_image_dimension: 1024,
            },
            OracleProvider::Anthropic => Self {
                provider,
                model: anthropic::DEFAULT_MODEL.to_string(),
                base_url: anthropic::DEFAULT_BASE_URL.to_string(),
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                api_key_command: None,
                timeout_secs: 60,
                max_tokens: 10,
                max_encoded_image_bytes: Some(anthropic::MAX_ENCODED_IMAGE_BYTES),
                max_image_dimension: 1024,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub port: u16,
    pub backend: ReviewBackend,
    pub db_path: PathBuf,
    pub approved_path: PathBuf,
    pub rejected_path: PathBuf,
}

fn parse_provider(s: &str) -> Result<OracleProvider> {
    OracleProvider::from_str(s, true).map_err(|_| anyhow!("Unknown oracle provider: {}", s))
}

fn parse_backend(s: &str) -> Result<ReviewBackend> {
    ReviewBackend::from_str(s, true).map_err(|_| anyhow!("Unknown review backend: {}", s))
}

fn resolve_columns(file: ColumnsConfig) -> ColumnLayout {
    let defaults = ColumnLayout::default();
    ColumnLayout {
        category: file.category.unwrap_or(defaults.category),
        label: file.label.unwrap_or(defaults.label),
        identifier: file.identifier.unwrap_or(defaults.identifier),
        secondary_identifier: file
            .secondary_identifier
            .unwrap_or(defaults.secondary_identifier),
        image_references: file.image_references.unwrap_or(defaults.image_references),
        image_url: file.image_url.unwrap_or(defaults.image_url),
        original_label: file.original_label.unwrap_or(defaults.original_label),
        detected_label: file.detected_label.unwrap_or(defaults.detected_label),
        processed_at: file.processed_at.unwrap_or(defaults.processed_at),
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let catalog_path = file
            .catalog_path
            .map(PathBuf::from)
            .or_else(|| cli.catalog_path.clone());
        let work_queue_path = file
            .work_queue_path
            .map(PathBuf::from)
            .or_else(|| cli.work_queue_path.clone())
            .unwrap_or_else(|| data_dir.join(DEFAULT_WORK_QUEUE_FILE));
        let results_path = file
            .results_path
            .map(PathBuf::from)
            .or_else(|| cli.results_path.clone())
            .unwrap_or_else(|| data_dir.join(DEFAULT_RESULTS_FILE));

        let columns = resolve_columns(file.columns.unwrap_or_default());

        let filter_file = file.filter.unwrap_or_default();
        let filter_defaults = FilterSettings::default();
        let filter = FilterSettings {
            category_substring: filter_file
                .category_substring
                .unwrap_or(filter_defaults.category_substring),
            chunk_size: filter_file
                .chunk_size
                .unwrap_or(filter_defaults.chunk_size)
                .max(1),
            image_role: filter_file.image_role.unwrap_or(filter_defaults.image_role),
        };

        let en_file = file.enrichment.unwrap_or_default();
        let en_defaults = EnrichmentSettings::default();
        let enrichment = EnrichmentSettings {
            sample_size: en_file.sample_size.unwrap_or(cli.sample_size),
            max_attempts: en_file.max_attempts.unwrap_or(en_defaults.max_attempts),
            requests_per_minute: en_file
                .requests_per_minute
                .unwrap_or(en_defaults.requests_per_minute),
            daily_request_cap: en_file.daily_request_cap,
            rate_limit_buffer_secs: en_file
                .rate_limit_buffer_secs
                .unwrap_or(en_defaults.rate_limit_buffer_secs),
            rate_limit_base_secs: en_file
                .rate_limit_base_secs
                .unwrap_or(en_defaults.rate_limit_base_secs),
            transient_backoff_secs: en_file
                .transient_backoff_secs
                .unwrap_or(en_defaults.transient_backoff_secs),
            fetch_timeout_secs: en_file
                .fetch_timeout_secs
                .unwrap_or(en_defaults.fetch_timeout_secs),
            long_response_threshold: en_file
                .long_response_threshold
                .unwrap_or(en_defaults.long_response_threshold),
            stop_on_quota_exhausted: en_file
                .stop_on_quota_exhausted
                .unwrap_or(en_defaults.stop_on_quota_exhausted),
        };

        let oracle_file = file.oracle.unwrap_or_default();
        let provider = match oracle_file.provider.as_deref() {
            Some(p) => parse_provider(p)?,
            None => cli.provider,
        };
        let oracle_defaults = OracleSettings::defaults_for(provider);
        let oracle = OracleSettings {
            provider,
            model: oracle_file.model.unwrap_or(oracle_defaults.model),
            base_url: oracle_file.base_url.unwrap_or(oracle_defaults.base_url),
            api_key_env: oracle_file.api_key_env.unwrap_or(oracle_defaults.api_key_env),
            api_key_command: oracle_file.api_key_command,
            timeout_secs: oracle_file
                .timeout_secs
                .unwrap_or(oracle_defaults.timeout_secs),
            max_tokens: oracle_file.max_tokens.unwrap_or(oracle_defaults.max_tokens),
            max_encoded_image_bytes: oracle_file
                .max_encoded_image_bytes
                .or(oracle_defaults.max_encoded_image_bytes),
            max_image_dimension: oracle_file
                .max_image_dimension
                .unwrap_or(oracle_defaults.max_image_dimension),
        };

        let review_file = file.review.unwrap_or_default();
        let backend = match review_file.backend.as_deref() {
            Some(b) => parse_backend(b)?,
            None => cli.review_backend,
        };
        let review = ReviewSettings {
            port: review_file.port.unwrap_or(cli.port),
            backend,
            db_path: review_file
                .db_path
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(DEFAULT_REVIEW_DB_FILE)),
            approved_path: review_file
                .approved_path
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(DEFAULT_APPROVED_FILE)),
            rejected_path: review_file
                .rejected_path
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(DEFAULT_REJECTED_FILE)),
        };

        Ok(Self {
            data_dir,
            catalog_path,
            work_queue_path,
            results_path,
            columns,
            filter,
            enrichment,
            oracle,
            review,
        })
    }
}
