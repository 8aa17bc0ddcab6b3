//! Runtime configuration with TOML file and environment support.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PageRequest;

/// Application-level constants
pub const APP_NAME: &str = "certverify";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for environment overrides (`CERTVERIFY_OCR_ENDPOINT`, ...).
pub const ENV_PREFIX: &str = "CERTVERIFY_";

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "certverify=info"
}

/// Application data directory: `<platform data dir>/certverify`.
/// Falls back to the working directory when the platform has none.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relative weight of each field in a match's accuracy. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeights {
    pub name: f64,
    pub institution: f64,
    pub program: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            name: 0.6,
            institution: 0.25,
            program: 0.15,
        }
    }
}

impl MatchWeights {
    pub fn sum(&self) -> f64 {
        self.name + self.institution + self.program
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// OCR / field-extraction analyzer.
    pub ocr_endpoint: String,
    /// Forensic tamper analyzer.
    pub tamper_endpoint: String,
    pub ocr_timeout_secs: u64,
    pub tamper_timeout_secs: u64,
    /// Bound on the record lookup once OCR has settled.
    pub record_timeout_secs: u64,
    /// Minimum accuracy (0..=100) for a VERIFIED decision.
    pub match_acceptance_threshold: u8,
    /// Candidates whose name similarity is below this are dropped.
    pub name_similarity_floor: f64,
    pub weights: MatchWeights,
    pub max_document_bytes: usize,
    pub database_path: PathBuf,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            ocr_endpoint: "http://127.0.0.1:8000/ocr/extract".into(),
            tamper_endpoint: "http://127.0.0.1:8000/tamper/analyze".into(),
            ocr_timeout_secs: 30,
            tamper_timeout_secs: 45,
            record_timeout_secs: 10,
            match_acceptance_threshold: 85,
            name_similarity_floor: 0.5,
            weights: MatchWeights::default(),
            max_document_bytes: 16 * 1024 * 1024,
            database_path: app_data_dir().join("certverify.db"),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl VerifierConfig {
    /// Load and validate a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Defaults overridden by `CERTVERIFY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by the unprefixed upper-case
    /// field name (`OCR_ENDPOINT`, `DATABASE_PATH`, ...).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("OCR_ENDPOINT") {
            self.ocr_endpoint = v;
        }
        if let Some(v) = lookup("TAMPER_ENDPOINT") {
            self.tamper_endpoint = v;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("OCR_TIMEOUT_SECS") {
            self.ocr_timeout_secs = parse_override("OCR_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TAMPER_TIMEOUT_SECS") {
            self.tamper_timeout_secs = parse_override("TAMPER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("RECORD_TIMEOUT_SECS") {
            self.record_timeout_secs = parse_override("RECORD_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("MATCH_ACCEPTANCE_THRESHOLD") {
            self.match_acceptance_threshold = parse_override("MATCH_ACCEPTANCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MAX_DOCUMENT_BYTES") {
            self.max_document_bytes = parse_override("MAX_DOCUMENT_BYTES", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "match weights must sum to 1.0, got {}",
                self.weights.sum()
            )));
        }
        let weights = [self.weights.name, self.weights.institution, self.weights.program];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(ConfigError::Invalid("match weights must lie in [0, 1]".into()));
        }
        if self.match_acceptance_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "match_acceptance_threshold must be <= 100, got {}",
                self.match_acceptance_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.name_similarity_floor) {
            return Err(ConfigError::Invalid(format!(
                "name_similarity_floor must lie in [0, 1], got {}",
                self.name_similarity_floor
            )));
        }
        if self.ocr_timeout_secs == 0 || self.tamper_timeout_secs == 0 || self.record_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.max_document_bytes == 0 {
            return Err(ConfigError::Invalid("max_document_bytes must be non-zero".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "default_page_size must lie in [1, {}]",
                self.max_page_size
            )));
        }
        Ok(())
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }

    pub fn tamper_timeout(&self) -> Duration {
        Duration::from_secs(self.tamper_timeout_secs)
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }

    /// Page request for the given page, using the default size when none is given.
    pub fn page_request(&self, page: u32, per_page: Option<u32>) -> PageRequest {
        PageRequest::new(page, per_page.unwrap_or(self.default_page_size)).clamped(self.max_page_size)
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{ENV_PREFIX}{key} has invalid value '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = VerifierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.match_acceptance_threshold, 85);
        assert_eq!(config.ocr_timeout(), Duration::from_secs(30));
        assert_eq!(config.tamper_timeout(), Duration::from_secs(45));
        assert_eq!(config.max_document_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn database_lives_under_app_data() {
        let config = VerifierConfig::default();
        assert!(config.database_path.starts_with(app_data_dir()));
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = VerifierConfig::from_toml_str("").unwrap();
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.weights, MatchWeights::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config = VerifierConfig::from_toml_str(
            r#"
            match_acceptance_threshold = 90
            ocr_endpoint = "http://ocr.internal/extract"

            [weights]
            name = 0.5
            institution = 0.3
            program = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.match_acceptance_threshold, 90);
        assert_eq!(config.ocr_endpoint, "http://ocr.internal/extract");
        assert_eq!(config.weights.institution, 0.3);
        assert_eq!(config.tamper_timeout_secs, 45);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = VerifierConfig::default();
        config.weights.name = 0.9;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn threshold_and_timeouts_are_checked() {
        let mut config = VerifierConfig::default();
        config.match_acceptance_threshold = 101;
        assert!(config.validate().is_err());

        let mut config = VerifierConfig::default();
        config.tamper_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = VerifierConfig::default();
        config.name_similarity_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_apply_by_key() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OCR_ENDPOINT", "http://10.0.0.5/ocr"),
            ("TAMPER_TIMEOUT_SECS", "60"),
            ("DATABASE_PATH", "/tmp/cv.db"),
        ]);
        let mut config = VerifierConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.ocr_endpoint, "http://10.0.0.5/ocr");
        assert_eq!(config.tamper_timeout_secs, 60);
        assert_eq!(config.database_path, PathBuf::from("/tmp/cv.db"));
    }

    #[test]
    fn malformed_override_is_rejected() {
        let mut config = VerifierConfig::default();
        let err = config
            .apply_overrides(|k| (k == "OCR_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("CERTVERIFY_OCR_TIMEOUT_SECS"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certverify.toml");
        std::fs::write(&path, "record_timeout_secs = 5\n").unwrap();
        let config = VerifierConfig::load(&path).unwrap();
        assert_eq!(config.record_timeout_secs, 5);

        let missing = VerifierConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn page_request_uses_default_and_clamps() {
        let config = VerifierConfig::default();
        assert_eq!(config.page_request(1, None).per_page, 20);
        assert_eq!(config.page_request(2, Some(1000)).per_page, 100);
    }
}
