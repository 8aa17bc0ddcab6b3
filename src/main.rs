//! certverify command line: verify certificates, browse the audit trail,
//! seed authoritative records.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use certverify::config::ENV_PREFIX;
use certverify::db::{insert_records, SharedConnection};
use certverify::models::AuthoritativeRecord;
use certverify::{
    init_tracing, AuditFilter, Decision, Submission, VerdictPayload, VerificationOrchestrator,
    VerifierConfig, VerifyError,
};

#[derive(Parser)]
#[command(name = "certverify", version, about = "Academic certificate verification")]
struct Cli {
    /// TOML configuration file. `CERTVERIFY_*` variables override it.
    #[arg(long, env = "CERTVERIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides the configured path).
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify one or more certificate files concurrently.
    Verify {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Declared media type; sniffed from content when omitted.
        #[arg(long)]
        media_type: Option<String>,
    },
    /// List recorded verifications, newest first.
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long)]
        per_page: Option<u32>,

        /// VERIFIED, REJECTED, INCONCLUSIVE or INCONCLUSIVE_DEGRADED.
        #[arg(long)]
        decision: Option<Decision>,

        /// Case-insensitive filename substring.
        #[arg(long)]
        filename: Option<String>,
    },
    /// Show one audit record by id or fingerprint.
    Show {
        #[arg(conflicts_with = "fingerprint", required_unless_present = "fingerprint")]
        id: Option<Uuid>,

        #[arg(long)]
        fingerprint: Option<String>,
    },
    /// Load authoritative records from a JSON array.
    Seed { file: PathBuf },
}

#[derive(Serialize)]
struct VerifyReport {
    file: String,
    audit_id: Uuid,
    reused: bool,
    #[serde(flatten)]
    payload: VerdictPayload,
}

#[derive(Serialize)]
struct VerifyFailure {
    file: String,
    error: String,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] certverify::ConfigError),

    #[error(transparent)]
    Setup(#[from] certverify::SetupError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Database(#[from] certverify::db::DatabaseError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Audit record not found")]
    NotFound,

    /// Reported per file already; only sets the exit code.
    #[error("{0} submission(s) failed")]
    Submissions(usize, bool),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            Self::Verify(VerifyError::PayloadInvalid(_)) | Self::Submissions(_, true) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !matches!(e, CliError::Submissions(..)) {
                eprintln!("error: {e}");
            }
            e.exit_code()
        }
    }
}

fn load_config(cli: &Cli) -> Result<VerifierConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            VerifierConfig::load(path)?
        }
        None => VerifierConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())?;
    if let Some(db) = &cli.database {
        config.database_path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Verify { files, media_type } => {
            let orchestrator = VerificationOrchestrator::from_config(&config)?;
            verify_files(&orchestrator, &files, media_type.as_deref().unwrap_or("")).await
        }
        Command::History {
            page,
            per_page,
            decision,
            filename,
        } => {
            let orchestrator = VerificationOrchestrator::from_config(&config)?;
            let filter = AuditFilter {
                decision,
                filename_contains: filename,
                ..Default::default()
            };
            let page = orchestrator
                .history(&filter, config.page_request(page, per_page))
                .await?;
            print_json(&page)
        }
        Command::Show { id, fingerprint } => {
            let orchestrator = VerificationOrchestrator::from_config(&config)?;
            let record = match (id, fingerprint) {
                (Some(id), _) => orchestrator.audit_record(&id).await?,
                (None, Some(fp)) => orchestrator.audit_record_by_fingerprint(&fp).await?,
                (None, None) => None,
            };
            print_json(&record.ok_or(CliError::NotFound)?)
        }
        Command::Seed { file } => {
            let records: Vec<AuthoritativeRecord> = serde_json::from_slice(&read_file(&file)?)?;
            if let Some(parent) = config.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|source| CliError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
            }
            let conn = SharedConnection::open(&config.database_path)?;
            let inserted = conn.with(|c| insert_records(c, &records))?;
            tracing::info!(inserted, path = %config.database_path.display(), "Authoritative records seeded");
            print_json(&serde_json::json!({ "inserted": inserted }))
        }
    }
}

async fn verify_files(
    orchestrator: &VerificationOrchestrator,
    files: &[PathBuf],
    media_type: &str,
) -> Result<(), CliError> {
    let mut submissions = Vec::with_capacity(files.len());
    for path in files {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        submissions.push((path, Submission::new(read_file(path)?, &filename, media_type)));
    }

    let outcomes = join_all(
        submissions
            .into_iter()
            .map(|(path, s)| async move { (path, orchestrator.verify_detailed(s).await) }),
    )
    .await;

    let mut failed = 0;
    let mut all_invalid = true;
    for (path, outcome) in outcomes {
        let file = path.display().to_string();
        match outcome {
            Ok(outcome) => print_json(&VerifyReport {
                file,
                audit_id: outcome.audit_id,
                reused: outcome.reused,
                payload: outcome.payload(),
            })?,
            Err(e) => {
                failed += 1;
                all_invalid &= matches!(e, VerifyError::PayloadInvalid(_));
                print_json(&VerifyFailure {
                    file,
                    error: e.to_string(),
                })?;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::Submissions(failed, all_invalid));
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
