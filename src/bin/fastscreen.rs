//! FAST Screen CLI - Command-line interface for the FAST screening core
//!
//! Commands:
//! - face / arm: Score a recorded window of face or pose frames
//! - speech: Score a finished recording against the expected sentence
//! - assess: Combine test verdicts into a risk tier
//! - history: List or clear saved sessions
//! - config: Print or validate configuration
//! - doctor: Diagnose configuration and session store health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fast_screen::pipeline::{
    assess_json, score_face_frames_json, score_pose_frames_json, score_speech_json,
};
use fast_screen::session::{JsonFileSessionRepository, Session, SessionRepository};
use fast_screen::{ScreeningConfig, ScreeningError, TestVerdict, FAST_SCREEN_VERSION, PRODUCER_NAME};

const DEFAULT_STORE: &str = "fast_sessions.json";

/// FAST Screen - Stroke screening scores from landmarks and speech
#[derive(Parser)]
#[command(name = "fastscreen")]
#[command(version = FAST_SCREEN_VERSION)]
#[command(about = "Score FAST stroke screening tests", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a window of face frames (JSON array)
    Face {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Pretty-print the result
        #[arg(long)]
        pretty: bool,
    },

    /// Score a window of pose frames (JSON array)
    Arm {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        #[arg(long)]
        pretty: bool,
    },

    /// Score a finished recording ({"segments", "transcript", "expected"})
    Speech {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        #[arg(long)]
        pretty: bool,
    },

    /// Combine test verdicts into a risk tier
    Assess {
        #[arg(long)]
        face: Option<VerdictArg>,

        #[arg(long)]
        arm: Option<VerdictArg>,

        #[arg(long)]
        speech: Option<VerdictArg>,

        /// Save the assessed session to this store
        #[arg(long)]
        save: Option<PathBuf>,

        #[arg(long)]
        pretty: bool,
    },

    /// Saved session history
    History {
        /// Session store path
        #[arg(long, default_value = DEFAULT_STORE)]
        store: PathBuf,

        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Print the effective configuration
    Config {
        /// Only validate, print nothing on success
        #[arg(long)]
        check: bool,
    },

    /// Diagnose configuration and session store
    Doctor {
        /// Session store to check
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List saved sessions, newest first
    List {
        /// Maximum sessions to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all saved sessions
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum VerdictArg {
    Normal,
    Abnormal,
    Inconclusive,
}

impl From<VerdictArg> for TestVerdict {
    fn from(v: VerdictArg) -> Self {
        match v {
            VerdictArg::Normal => TestVerdict::Normal,
            VerdictArg::Abnormal => TestVerdict::Abnormal,
            VerdictArg::Inconclusive => TestVerdict::Inconclusive,
        }
    }
}

fn main() -> ExitCode {
    // Reads RUST_LOG; quiet by default so stdout stays machine-readable
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = serde_json::to_string(&CliError::from(e))
                .unwrap_or_else(|_| "Unknown error".to_string());
            eprintln!("{}", report);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FastCliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Face { input, pretty } => {
            let config = load_config(config_path)?;
            let result = score_face_frames_json(&read_input(&input)?, &config)?;
            print_json(&result, pretty)
        }

        Commands::Arm { input, pretty } => {
            let config = load_config(config_path)?;
            let result = score_pose_frames_json(&read_input(&input)?, &config)?;
            print_json(&result, pretty)
        }

        Commands::Speech { input, pretty } => {
            let config = load_config(config_path)?;
            let result = score_speech_json(&read_input(&input)?, &config)?;
            print_json(&result, pretty)
        }

        Commands::Assess {
            face,
            arm,
            speech,
            save,
            pretty,
        } => cmd_assess(config_path, face, arm, speech, save.as_deref(), pretty),

        Commands::History { store, action } => cmd_history(config_path, &store, action),

        Commands::Config { check } => {
            let config = load_config(config_path)?;
            if !check {
                println!("{}", config.to_json()?);
            }
            Ok(())
        }

        Commands::Doctor { store, json } => cmd_doctor(config_path, store.as_deref(), json),
    }
}

fn cmd_assess(
    config_path: Option<&Path>,
    face: Option<VerdictArg>,
    arm: Option<VerdictArg>,
    speech: Option<VerdictArg>,
    save: Option<&Path>,
    pretty: bool,
) -> Result<(), FastCliError> {
    let config = load_config(config_path)?;

    let verdicts = serde_json::json!({
        "face": face.map(TestVerdict::from),
        "arm": arm.map(TestVerdict::from),
        "speech": speech.map(TestVerdict::from),
    });
    let result = assess_json(&verdicts.to_string(), &config)?;

    if let Some(path) = save {
        let mut session = Session::new();
        session.face_verdict = face.map(TestVerdict::from);
        session.arm_verdict = arm.map(TestVerdict::from);
        session.speech_verdict = speech.map(TestVerdict::from);
        session.assess(config.verdict.aggregation);

        let mut store = JsonFileSessionRepository::new(path, config.history_limit);
        store.save(session)?;
    }

    print_json(&result, pretty)
}

fn cmd_history(
    config_path: Option<&Path>,
    store_path: &Path,
    action: HistoryAction,
) -> Result<(), FastCliError> {
    let config = load_config(config_path)?;
    let mut store = JsonFileSessionRepository::new(store_path, config.history_limit);

    match action {
        HistoryAction::List { limit, json } => {
            let mut sessions = store.load_all()?;
            if let Some(limit) = limit {
                sessions.truncate(limit);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
                return Ok(());
            }

            if sessions.is_empty() {
                println!("No saved sessions");
                return Ok(());
            }

            for session in &sessions {
                let tier = session
                    .risk_tier
                    .map(|t| t.label())
                    .unwrap_or("Not assessed");
                println!(
                    "{}  face: {:<12} arm: {:<12} speech: {:<12} {}",
                    session.timestamp.format("%Y-%m-%d %H:%M"),
                    verdict_label(session.face_verdict),
                    verdict_label(session.arm_verdict),
                    verdict_label(session.speech_verdict),
                    tier
                );
            }
            Ok(())
        }

        HistoryAction::Clear => {
            store.clear()?;
            println!("Session history cleared");
            Ok(())
        }
    }
}

fn verdict_label(verdict: Option<TestVerdict>) -> &'static str {
    verdict.map(|v| v.label()).unwrap_or("-")
}

fn cmd_doctor(
    config_path: Option<&Path>,
    store: Option<&Path>,
    json: bool,
) -> Result<(), FastCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("FAST Screen version {}", FAST_SCREEN_VERSION),
    });

    // Check configuration
    match load_config(config_path) {
        Ok(config) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Configuration valid ({:.1}s window, {:.0}s recording timeout)",
                config.analysis.window_secs, config.recognition.timeout_secs
            ),
        }),
        Err(e) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: CliError::from(e).message,
        }),
    }

    // Check session store if provided
    if let Some(store_path) = store {
        if store_path.exists() {
            match fs::read_to_string(store_path) {
                Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
                    Ok(value) => {
                        let count = value
                            .get("stroke_sessions")
                            .and_then(|v| v.as_array())
                            .map(|a| a.len())
                            .unwrap_or(0);
                        checks.push(DoctorCheck {
                            name: "session_store".to_string(),
                            status: CheckStatus::Ok,
                            message: format!("Session store valid ({} sessions)", count),
                        });
                    }
                    Err(e) => checks.push(DoctorCheck {
                        name: "session_store".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Session store is corrupted: {}", e),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "session_store".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read session store: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "session_store".to_string(),
                status: CheckStatus::Warning,
                message: "Session store does not exist yet".to_string(),
            });
        }
    }

    // Check stdin mode (frames are usually piped in)
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input for frame files)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready to read frames)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FAST_SCREEN_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("FAST Screen Doctor Report");
        println!("=========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(FastCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<ScreeningConfig, FastCliError> {
    match path {
        Some(path) => Ok(ScreeningConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(ScreeningConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, FastCliError> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn print_json(json: &str, pretty: bool) -> Result<(), FastCliError> {
    if pretty {
        let value: serde_json::Value = serde_json::from_str(json)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", json);
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug)]
enum FastCliError {
    Io(io::Error),
    Screening(ScreeningError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for FastCliError {
    fn from(e: io::Error) -> Self {
        FastCliError::Io(e)
    }
}

impl From<ScreeningError> for FastCliError {
    fn from(e: ScreeningError) -> Self {
        FastCliError::Screening(e)
    }
}

impl From<serde_json::Error> for FastCliError {
    fn from(e: serde_json::Error) -> Self {
        FastCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FastCliError> for CliError {
    fn from(e: FastCliError) -> Self {
        match e {
            FastCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FastCliError::Screening(ScreeningError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run `fastscreen config` to see valid defaults".to_string()),
            },
            FastCliError::Screening(e @ ScreeningError::ParseError(_)) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Face and arm input is a JSON array of frames".to_string()),
            },
            FastCliError::Screening(e) => CliError {
                code: "SCREENING_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FastCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FastCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the check output above".to_string()),
            },
        }
    }
}
