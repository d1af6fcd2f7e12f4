//! Rhythm CLI - Command-line interface for Rhythm Auth
//!
//! Commands:
//! - decode: Parse a Morse password and show its expected pattern
//! - extract: Compute feature vectors of captured samples
//! - analyze: Score the rhythm quality of captured samples
//! - enroll: Register a user from a batch of samples
//! - authenticate: Match one sample against a stored user
//! - users: List, show, delete or summarize stored users
//! - doctor: Check configuration and profile store health
//!
//! Samples are `{"presses": [...], "gaps": [...]}` objects in seconds.
//! Results go to stdout as JSON; logs and errors go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rhythm_auth::schema::PROFILE_SCHEMA_VERSION;
use rhythm_auth::store::{store_statistics, JsonFileProfileStore, ProfileStore, UserSummary};
use rhythm_auth::types::{ExpectedPattern, FeatureVector, QualityScore, TimingSample};
use rhythm_auth::{
    authenticate_user, parse_password, AuthConfig, ComputeError, FeatureExtractor, PatternCodec,
    Registration, RhythmQualityAnalyzer, SubmissionOutcome, UserRecord, RHYTHM_AUTH_VERSION,
};

/// Exit code for a completed but denied authentication
const EXIT_DENIED: u8 = 2;

/// Rhythm - tap-rhythm biometric authentication
#[derive(Parser)]
#[command(name = "rhythm")]
#[command(version = RHYTHM_AUTH_VERSION)]
#[command(about = "Enroll and authenticate users by the rhythm of a tapped Morse password", long_about = None)]
struct Cli {
    /// Profile store file
    #[arg(long, env = "RHYTHM_STORE", default_value = "rhythm_users.json", global = true)]
    store: PathBuf,

    /// Configuration file (.toml or .json)
    #[arg(long, env = "RHYTHM_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a Morse password and show its expected pattern
    Decode {
        /// Morse text, groups separated by spaces (e.g. "... --- ...")
        morse: String,
    },

    /// Compute feature vectors of captured samples
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Score the rhythm quality of captured samples
    Analyze {
        /// Morse password the samples were tapped against
        #[arg(short, long)]
        password: String,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Register a user from a batch of samples
    Enroll {
        /// Username to register
        #[arg(short, long)]
        username: String,

        /// Morse password
        #[arg(short, long)]
        password: String,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Match one sample against a stored user
    Authenticate {
        /// Username to authenticate
        #[arg(short, long)]
        username: String,

        /// Input file path (use - for stdin); the first sample is used
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Manage stored users
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },

    /// Check configuration and profile store health
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    /// List users with their enrollment accuracy and consistency
    List,
    /// Print one stored user record
    Show { username: String },
    /// Delete a stored user
    Delete { username: String },
    /// Aggregate consistency and password length over all users
    Stats,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rhythm_auth=info")),
        )
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, RhythmCliError> {
    // doctor reports a bad config instead of failing on it
    let config = match &cli.command {
        Commands::Doctor { .. } => AuthConfig::default(),
        _ => load_config(cli.config.as_deref())?,
    };

    match cli.command {
        Commands::Decode { morse } => {
            let pattern = parse_password(&morse)?;
            let report = DecodeReport {
                canonical_units: PatternCodec::expected_text_duration(&pattern.decoded, 1.0),
                pattern,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Extract {
            input,
            input_format,
            output_format,
        } => {
            let samples = read_samples(&input, &input_format)?;
            let extractor = FeatureExtractor::new(config.extractor);
            let vectors: Vec<FeatureVector> = samples
                .iter()
                .map(|s| extractor.extract(&s.presses, &s.gaps))
                .collect();
            print!("{}", format_output(&vectors, &output_format)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Analyze {
            password,
            input,
            input_format,
            output_format,
        } => {
            let pattern = parse_password(&password)?;
            let samples = read_samples(&input, &input_format)?;
            let analyzer = RhythmQualityAnalyzer::new();
            let reports: Vec<QualityReport> = samples
                .iter()
                .map(|s| {
                    let score = analyzer.analyze(&s.presses, &s.gaps, &pattern);
                    QualityReport {
                        feedback: score.feedback(),
                        canonical_timing: PatternCodec::validate_pattern(
                            &s.presses,
                            &pattern,
                            config.validation_tolerance,
                        ),
                        score,
                    }
                })
                .collect();
            print!("{}", format_output(&reports, &output_format)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Enroll {
            username,
            password,
            input,
            input_format,
        } => cmd_enroll(&cli.store, config, &username, &password, &input, &input_format),

        Commands::Authenticate {
            username,
            input,
            input_format,
        } => {
            let store = JsonFileProfileStore::open(&cli.store)?;
            let sample = read_samples(&input, &input_format)?
                .into_iter()
                .next()
                .ok_or(RhythmCliError::NoSamples)?;

            let result = authenticate_user(&store, &username, &sample, &config)?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            Ok(if result.final_decision {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_DENIED)
            })
        }

        Commands::Users { command } => cmd_users(&cli.store, command),

        Commands::Doctor { json } => cmd_doctor(&cli.store, cli.config.as_deref(), json),
    }
}

fn cmd_enroll(
    store_path: &Path,
    config: AuthConfig,
    username: &str,
    password: &str,
    input: &Path,
    input_format: &InputFormat,
) -> Result<ExitCode, RhythmCliError> {
    let mut store = JsonFileProfileStore::open(store_path)?;
    let samples = read_samples(input, input_format)?;
    let mut registration = Registration::new(username, password, config, &store)?;

    let mut outcomes: Vec<SubmissionOutcome> = Vec::new();
    for sample in &samples {
        if !registration.session().can_accept_more() {
            break;
        }
        match registration.submit(sample) {
            Ok(outcome) => outcomes.push(outcome),
            // Empty captures are skipped
            Err(ComputeError::NoInput) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let record = registration.finish(&mut store)?;
    let report = EnrollReport {
        attempts: outcomes,
        user: record,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_users(store_path: &Path, command: UsersCommand) -> Result<ExitCode, RhythmCliError> {
    match command {
        UsersCommand::List => {
            let store = JsonFileProfileStore::open(store_path)?;
            let mut summaries: Vec<UserSummary> = Vec::new();
            for username in store.list()? {
                if let Some(record) = store.get(&username)? {
                    summaries.push(record.summary());
                }
            }
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        UsersCommand::Show { username } => {
            let store = JsonFileProfileStore::open(store_path)?;
            let record = store
                .get(&username)?
                .ok_or(ComputeError::UserNotFound(username))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        UsersCommand::Delete { username } => {
            let mut store = JsonFileProfileStore::open(store_path)?;
            if !store.delete(&username)? {
                return Err(ComputeError::UserNotFound(username).into());
            }
            println!("{}", serde_json::json!({ "deleted": username }));
        }
        UsersCommand::Stats => {
            let store = JsonFileProfileStore::open(store_path)?;
            println!("{}", serde_json::to_string_pretty(&store_statistics(&store)?)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_doctor(
    store_path: &Path,
    config_path: Option<&Path>,
    json: bool,
) -> Result<ExitCode, RhythmCliError> {
    let mut checks: Vec<DoctorCheck> = vec![
        DoctorCheck {
            name: "version".to_string(),
            status: CheckStatus::Ok,
            message: format!("Rhythm Auth version {}", RHYTHM_AUTH_VERSION),
        },
        DoctorCheck {
            name: "profile_schema".to_string(),
            status: CheckStatus::Ok,
            message: format!("Profile schema: {}", PROFILE_SCHEMA_VERSION),
        },
    ];

    checks.push(match config_path {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        },
        Some(path) => match load_config(Some(path)) {
            Ok(_) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!("Configuration valid: {}", path.display()),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        },
    });

    if !store_path.exists() {
        checks.push(DoctorCheck {
            name: "store".to_string(),
            status: CheckStatus::Warning,
            message: format!("Store not found, will be created: {}", store_path.display()),
        });
    } else {
        match JsonFileProfileStore::open(store_path) {
            Ok(store) => {
                let users = store.list()?;
                let undecodable = users
                    .iter()
                    .filter_map(|u| store.get(u).ok().flatten())
                    .filter(|r| r.profile().map(|p| p.mean.is_none()).unwrap_or(true))
                    .count();

                checks.push(DoctorCheck {
                    name: "store".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Store valid ({} users)", users.len()),
                });
                if undecodable > 0 {
                    checks.push(DoctorCheck {
                        name: "profiles".to_string(),
                        status: CheckStatus::Warning,
                        message: format!(
                            "{} users have no usable profile and cannot authenticate",
                            undecodable
                        ),
                    });
                }
            }
            Err(e) => checks.push(DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Error,
                message: format!("Store unreadable: {}", e),
            }),
        }
    }

    let failed = checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    let report = DoctorReport {
        version: RHYTHM_AUTH_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rhythm Auth Doctor");
        println!("==================");
        for check in &report.checks {
            let symbol = match check.status {
                CheckStatus::Ok => "✓",
                CheckStatus::Warning => "!",
                CheckStatus::Error => "✗",
            };
            println!("{} {}: {}", symbol, check.name, check.message);
        }
    }

    if failed {
        return Err(RhythmCliError::DoctorFailed);
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&Path>) -> Result<AuthConfig, RhythmCliError> {
    match path {
        Some(path) => Ok(AuthConfig::load(path)?),
        None => Ok(AuthConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, RhythmCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_samples(input: &Path, format: &InputFormat) -> Result<Vec<TimingSample>, RhythmCliError> {
    let data = read_input(input)?;
    let samples: Vec<TimingSample> = match format {
        InputFormat::Ndjson => data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?,
        InputFormat::Json => serde_json::from_str(&data)?,
    };

    if samples.is_empty() {
        return Err(RhythmCliError::NoSamples);
    }
    Ok(samples)
}

fn format_output<T: Serialize>(
    records: &[T],
    format: &OutputFormat,
) -> Result<String, RhythmCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)? + "\n"),
    }
}

// Error handling

#[derive(Debug)]
enum RhythmCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoSamples,
    DoctorFailed,
}

impl From<io::Error> for RhythmCliError {
    fn from(e: io::Error) -> Self {
        RhythmCliError::Io(e)
    }
}

impl From<ComputeError> for RhythmCliError {
    fn from(e: ComputeError) -> Self {
        RhythmCliError::Compute(e)
    }
}

impl From<serde_json::Error> for RhythmCliError {
    fn from(e: serde_json::Error) -> Self {
        RhythmCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RhythmCliError> for CliError {
    fn from(e: RhythmCliError) -> Self {
        match e {
            RhythmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RhythmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Samples look like {\"presses\": [...], \"gaps\": [...]}".to_string()),
            },
            RhythmCliError::Compute(e) => compute_error(e),
            RhythmCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No samples found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RhythmCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

fn compute_error(e: ComputeError) -> CliError {
    let (code, hint) = match &e {
        ComputeError::UserExists(_) => ("USER_EXISTS", Some("Choose another username")),
        ComputeError::UserNotFound(_) => ("USER_NOT_FOUND", Some("Run 'rhythm users list'")),
        ComputeError::InvalidPattern(_) => (
            "INVALID_PASSWORD",
            Some("Use dot/dash groups separated by spaces, e.g. '... --- ...'"),
        ),
        ComputeError::EnrollmentIncomplete { .. } => (
            "ENROLLMENT_INCOMPLETE",
            Some("Provide more consistent samples"),
        ),
        ComputeError::EmptyEnrollment => ("ENROLLMENT_INCOMPLETE", None),
        ComputeError::NoInput => ("NO_INPUT", Some("Samples need at least one press")),
        ComputeError::UnsupportedSchema(_) | ComputeError::InvalidProfile(_) => (
            "PROFILE_ERROR",
            Some("Re-enroll this user to write a current profile"),
        ),
        ComputeError::InvalidConfig(_) | ComputeError::TomlError(_) => {
            ("CONFIG_ERROR", Some("Run 'rhythm doctor --config <file>'"))
        }
        ComputeError::MissingField(_) => ("MISSING_FIELD", None),
        ComputeError::JsonError(_) => ("JSON_ERROR", Some("Check JSON syntax")),
        ComputeError::IoError(_) => ("IO_ERROR", Some("Check file paths and permissions")),
    };

    CliError {
        code: code.to_string(),
        message: e.to_string(),
        hint: hint.map(str::to_string),
    }
}

// Report types

#[derive(Serialize)]
struct DecodeReport {
    #[serde(flatten)]
    pattern: ExpectedPattern,
    /// Length of the password in dot units at canonical Morse timing
    canonical_units: Option<f64>,
}

#[derive(Serialize)]
struct QualityReport {
    #[serde(flatten)]
    score: QualityScore,
    feedback: &'static str,
    /// Presses follow 1:3 dot/dash proportions within the configured tolerance
    canonical_timing: bool,
}

#[derive(Serialize)]
struct EnrollReport {
    attempts: Vec<SubmissionOutcome>,
    user: UserRecord,
}

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
