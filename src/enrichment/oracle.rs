//! The classification oracle seam.

use super::error::OracleError;
use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const API_KEY_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_COMMAND_POLL: Duration = Duration::from_millis(50);

/// An image ready to be sent to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    /// Declared media type, e.g. `image/jpeg`.
    pub media_type: String,
}

pub struct OracleRequest<'a> {
    pub instruction: &'a str,
    pub image: &'a ImagePayload,
}

/// An external image classifier returning free text.
pub trait PatternOracle: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, request: &OracleRequest<'_>) -> Result<String, OracleError>;
}

/// Where the oracle credential comes from.
#[derive(Debug, Clone)]
pub enum ApiKeySource {
    Static(String),
    /// Shell command that prints the key (for rotating tokens).
    Command(String),
}

impl ApiKeySource {
    /// Resolves the configured source, failing when no credential is
    /// available. A key command is run once here so a broken command is
    /// reported before any work starts.
    pub fn resolve(env_var: &str, command: Option<&str>) -> Result<Self> {
        if let Some(cmd) = command.map(str::trim).filter(|c| !c.is_empty()) {
            let source = ApiKeySource::Command(cmd.to_string());
            source
                .get_key()
                .context("api_key_command did not produce a key")?;
            return Ok(source);
        }
        match std::env::var(env_var) {
            Ok(key) if !key.trim().is_empty() => Ok(ApiKeySource::Static(key.trim().to_string())),
            _ => bail!(
                "Missing oracle credential: set the {} environment variable or configure api_key_command",
                env_var
            ),
        }
    }

    pub fn get_key(&self) -> Result<String, OracleError> {
        match self {
            ApiKeySource::Static(key) => Ok(key.clone()),
            ApiKeySource::Command(cmd) => run_key_command(cmd, API_KEY_COMMAND_TIMEOUT),
        }
    }
}

/// Runs `cmd` through `sh -c` and returns its trimmed stdout. The child is
/// killed when it outlives `timeout`.
fn run_key_command(cmd: &str, timeout: Duration) -> Result<String, OracleError> {
    debug!(command = %cmd, "Fetching API key via command");
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            warn!(command = %cmd, error = %e, "api_key_command failed to execute");
            OracleError::Other(format!("Failed to execute api_key_command: {}", e))
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() >= deadline => {
                warn!(command = %cmd, "api_key_command timed out");
                if let Err(e) = child.kill() {
                    debug!("Failed to kill api_key_command: {}", e);
                }
                let _ = child.wait();
                return Err(OracleError::Transient(format!(
                    "api_key_command timed out after {:?}",
                    timeout
                )));
            }
            Ok(None) => thread::sleep(API_KEY_COMMAND_POLL),
            Err(e) => {
                return Err(OracleError::Other(format!(
                    "Failed to wait for api_key_command: {}",
                    e
                )))
            }
        }
    }

    let output = child.wait_with_output().map_err(|e| {
        OracleError::Other(format!("Failed to read api_key_command output: {}", e))
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(command = %cmd, stderr = %stderr, "api_key_command failed");
        return Err(OracleError::Other(format!(
            "api_key_command failed with status {}",
            output.status
        )));
    }

    let key = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if key.is_empty() {
        warn!(command = %cmd, "api_key_command returned empty key");
        return Err(OracleError::Other(
            "api_key_command returned empty key".to_string(),
        ));
    }
    Ok(key)
}

/// Maps a non-success HTTP response to an [`OracleError`].
///
/// `retry_after` is the raw `Retry-After` header, used when the body itself
/// names no delay.
pub fn classify_http_failure(status: u16, retry_after: Option<&str>, body: &str) -> OracleError {
    let message = format!("HTTP {}: {}", status, body.trim());
    match OracleError::from_message(message) {
        OracleError::RateLimited {
            retry_after: None,
            message,
        } => OracleError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(std::time::Duration::from_secs),
            message,
        },
        OracleError::Other(message) if status >= 500 || status == 408 => {
            OracleError::Transient(message)
        }
        other => other,
    }
}

/// Maps a transport-level failure (no HTTP response) to an [`OracleError`].
pub fn classify_transport_failure(error: &reqwest::Error) -> OracleError {
    if error.is_timeout() || error.is_connect() {
        OracleError::Transient(error.to_string())
    } else {
        OracleError::from_message(error.to_string())
    }
}
