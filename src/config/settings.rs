//! Sweep settings and configuration types.
//!
//! Settings are read from `settings.json` in the user's config directory
//! (or an explicit path) once per run and are immutable afterwards. Secrets
//! are never stored here; see [`crate::storage::KeychainAccess`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Label names and the hidden scanned marker.
    pub labels: LabelSettings,
    /// Mailbox listing and time budget.
    pub scan: ScanSettings,
    /// Local keyword and bulk-mail heuristics.
    pub filter: FilterSettings,
    /// Classification policy.
    pub classifier: ClassifierSettings,
    /// Inference endpoint.
    pub inference: InferenceSettings,
    /// Re-invocation timing.
    pub driver: DriverSettings,
}

impl Settings {
    /// File name looked up inside the config directory.
    pub const FILE_NAME: &'static str = "settings.json";

    /// Default settings path, e.g. `~/.config/rejection-sorter/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "rejection-sorter", "rejection-sorter")
            .map(|dirs| dirs.config_dir().join(Self::FILE_NAME))
    }

    /// Loads settings from `path`, or from [`Settings::default_path`].
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let settings: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.labels.rejection.trim().is_empty() {
            return Err(invalid("labels.rejection", "must not be empty"));
        }
        if self.labels.use_scanned_label && self.labels.scanned.trim().is_empty() {
            return Err(invalid("labels.scanned", "must not be empty when enabled"));
        }
        if !(1..=ScanSettings::MAX_PAGE_SIZE).contains(&self.scan.list_page_size) {
            return Err(invalid(
                "scan.list_page_size",
                format!("must be between 1 and {}", ScanSettings::MAX_PAGE_SIZE),
            ));
        }
        if self.scan.max_runtime_ms < ScanSettings::MIN_RUNTIME_MS {
            return Err(invalid(
                "scan.max_runtime_ms",
                format!("must be at least {} ms", ScanSettings::MIN_RUNTIME_MS),
            ));
        }
        if self.scan.query_terms.is_empty() {
            return Err(invalid("scan.query_terms", "must list at least one term"));
        }
        if self.filter.job_signal_terms.is_empty() {
            return Err(invalid("filter.job_signal_terms", "must list at least one term"));
        }
        if self.classifier.batch_size == 0 {
            return Err(invalid("classifier.batch_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            return Err(invalid("classifier.min_confidence", "must be within [0, 1]"));
        }
        if self.classifier.mode == ClassifierMode::Keyword
            && self.classifier.rejection_phrases.is_empty()
        {
            return Err(invalid(
                "classifier.rejection_phrases",
                "keyword mode needs at least one phrase",
            ));
        }
        if self.driver.effective_window().is_zero() {
            return Err(invalid(
                "driver.invocation_window_ms",
                "must exceed driver.safety_buffer_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Label names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Visible label applied to rejections.
    pub rejection: String,
    /// Hidden marker applied to every evaluated message.
    pub scanned: String,
    /// Whether to maintain the hidden marker. When off, an explicit page
    /// cursor is persisted instead.
    pub use_scanned_label: bool,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            rejection: "Job Rejection".to_string(),
            scanned: "Magikmail/Scanned".to_string(),
            use_scanned_label: true,
        }
    }
}

/// Mailbox listing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// IDs listed per pass.
    pub list_page_size: u32,
    /// Soft wall-clock budget for a single pass, in milliseconds.
    pub max_runtime_ms: u64,
    /// Search terms OR-ed into the mailbox query. Quoted phrases are kept verbatim.
    pub query_terms: Vec<String>,
}

impl ScanSettings {
    /// Largest page the Gmail list endpoint will return.
    pub const MAX_PAGE_SIZE: u32 = 500;

    /// Smallest per-pass budget that leaves room for a metadata fetch.
    pub const MIN_RUNTIME_MS: u64 = 1000;

    pub fn max_runtime(&self) -> Duration {
        Duration::from_millis(self.max_runtime_ms)
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            list_page_size: 500,
            max_runtime_ms: 5 * 60 * 1000,
            query_terms: [
                "apply",
                "application",
                "\"thank you for applying\"",
                "candidate",
                "candidacy",
                "recruit",
                "recruiter",
                "hiring",
                "interview",
                "intern",
                "internship",
                "position",
                "role",
                "career",
                "opportunity",
                "assessment",
                "\"next steps\"",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Local heuristic settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Whole-word, case-insensitive terms that mark a message as job-related.
    pub job_signal_terms: Vec<String>,
    /// Header names that mark a message as bulk mail.
    pub bulk_header_names: Vec<String>,
    /// Skip inference for bulk mail without job signals.
    pub skip_bulk_if_no_job_signals: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            job_signal_terms: [
                "apply",
                "application",
                "candidate",
                "candidacy",
                "recruit",
                "recruiter",
                "hiring",
                "interview",
                "internship",
                "intern",
                "position",
                "role",
                "career",
                "opportunity",
                "assessment",
                "offer",
                "greenhouse",
                "workday",
                "lever",
                "ashby",
                "smartrecruiters",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            bulk_header_names: ["List-Unsubscribe", "List-Id", "Precedence", "Auto-Submitted"]
                .into_iter()
                .map(String::from)
                .collect(),
            skip_bulk_if_no_job_signals: true,
        }
    }
}

/// How candidates are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// Send candidates to the inference endpoint.
    Llm,
    /// Match rejection phrases locally; no inference calls.
    Keyword,
}

/// Classification policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub mode: ClassifierMode,
    /// Candidates per inference request.
    pub batch_size: usize,
    /// Minimum confidence for a REJECT verdict to be acted on.
    pub min_confidence: f64,
    /// Pause between inference requests, in milliseconds.
    pub inter_batch_delay_ms: u64,
    /// Delay used when a rate-limit response carries no retry hint.
    pub fallback_retry_delay_ms: u64,
    /// Rate-limit retries per request before giving up.
    pub max_rate_limit_retries: u32,
    /// Log the raw response body when it cannot be parsed.
    pub log_raw_response_on_parse_failure: bool,
    /// Phrases treated as rejections in keyword mode.
    pub rejection_phrases: Vec<String>,
}

impl ClassifierSettings {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn fallback_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_retry_delay_ms)
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::Llm,
            batch_size: 5,
            min_confidence: 0.80,
            inter_batch_delay_ms: 200,
            fallback_retry_delay_ms: 2000,
            max_rate_limit_retries: 8,
            log_raw_response_on_parse_failure: true,
            rejection_phrases: [
                "unfortunately",
                "regret to inform",
                "not moving forward",
                "not be moving forward",
                "decided to move forward with other candidates",
                "decided to pursue other candidates",
                "will not be proceeding",
                "not selected",
                "position has been filled",
                "other applicants",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Inference endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// OpenAI-compatible base URL (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    pub max_completion_tokens: usize,
    /// Passed through as `reasoning_effort` when set.
    pub reasoning_effort: Option<String>,
    /// Request `json_schema` structured output.
    pub structured_output: bool,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Keychain entry consulted when the environment variable is unset.
    pub api_key_keychain_id: String,
    /// Per-request HTTP timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "openai/gpt-oss-20b".to_string(),
            max_completion_tokens: 250,
            reasoning_effort: Some("low".to_string()),
            structured_output: true,
            api_key_env: "GROQ_API_KEY".to_string(),
            api_key_keychain_id: "inference_api_key".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Re-invocation timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    /// Wall-clock window for one invocation, in milliseconds.
    pub invocation_window_ms: u64,
    /// Safety margin subtracted from the window.
    pub safety_buffer_ms: u64,
    /// Pause between passes inside one invocation.
    pub pass_pacing_ms: u64,
    /// Delay before the next invocation while work remains.
    pub reinvoke_delay_ms: u64,
    /// Delay before retrying after a failed pass.
    pub error_retry_delay_ms: u64,
}

impl DriverSettings {
    /// Time an invocation may spend running passes.
    pub fn effective_window(&self) -> Duration {
        Duration::from_millis(self.invocation_window_ms.saturating_sub(self.safety_buffer_ms))
    }

    pub fn pass_pacing(&self) -> Duration {
        Duration::from_millis(self.pass_pacing_ms)
    }

    pub fn reinvoke_delay(&self) -> Duration {
        Duration::from_millis(self.reinvoke_delay_ms)
    }

    pub fn error_retry_delay(&self) -> Duration {
        Duration::from_millis(self.error_retry_delay_ms)
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            invocation_window_ms: 6 * 60 * 1000,
            safety_buffer_ms: 60 * 1000,
            pass_pacing_ms: 4500,
            reinvoke_delay_ms: 60 * 1000,
            error_retry_delay_ms: 15 * 60 * 1000,
        }
    }
}
