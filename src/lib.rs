pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

pub use config::{ConfigError, VerifierConfig};
pub use models::{
    AuditFilter, AuditRecord, Decision, EvidenceExposure, Page, PageRequest, Submission,
    VerdictPayload, VerificationVerdict,
};
pub use pipeline::{SetupError, VerificationOrchestrator, VerificationOutcome, VerifyError};

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
/// Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
