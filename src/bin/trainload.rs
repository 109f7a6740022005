//! Trainload CLI - Command-line interface for the trainload engine
//!
//! Commands:
//! - analyze: Analyze activity payloads and fold them into an athlete timeline
//! - load: Fold daily load values into fitness/fatigue/form states
//! - validate: Check activity payloads without computing metrics
//! - config: Print or check an athlete configuration
//! - doctor: Diagnose configuration and state files

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use trainload::adapters::parse_stream_value;
use trainload::pipeline::{ActivityInput, AthleteTimeline};
use trainload::prepare::StreamPreparer;
use trainload::training_load::{AcwrStatus, FormStatus, TrainingLoadTracker};
use trainload::types::TrainingLoadState;
use trainload::zone_history::ZoneTarget;
use trainload::{AthleteConfig, ComputeError, SummaryEncoder, PRODUCER_NAME, VERSION};

/// Trainload - metrics and training-load engine for endurance activities
#[derive(Parser)]
#[command(name = "trainload")]
#[command(version = VERSION)]
#[command(about = "Derive training metrics and longitudinal load from activity streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze activities and fold them into the athlete timeline
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path for activity records (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Athlete configuration file (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Load timeline state from file
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Save timeline state to file after processing
        #[arg(long)]
        save_state: Option<PathBuf>,

        /// Write the longitudinal summary payload to this file
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Summary date (defaults to the latest activity date)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Athlete identifier recorded in the summary
        #[arg(long)]
        athlete_id: Option<String>,
    },

    /// Fold daily load values into training-load states
    Load {
        /// Input file path (use - for stdin): [{"date": "YYYY-MM-DD", "load": 80.0}, ...]
        #[arg(short, long)]
        input: PathBuf,

        /// Acute time constant in days
        #[arg(long, default_value = "7")]
        acute_days: f64,

        /// Chronic time constant in days
        #[arg(long, default_value = "42")]
        chronic_days: f64,

        /// Project the final state forward to this date
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate activity payloads
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Gap threshold in seconds
        #[arg(long, default_value = "2.0")]
        gap_threshold: f64,
    },

    /// Print the athlete configuration (defaults, or a checked file)
    Config {
        /// Configuration file to check and print
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Diagnose configuration and state files
    Doctor {
        /// Check an athlete configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a saved timeline state file
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one activity per line)
    Ndjson,
    /// JSON array of activities
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
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), TrainloadCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            input_format,
            output_format,
            config,
            load_state,
            save_state,
            summary,
            as_of,
            athlete_id,
        } => cmd_analyze(AnalyzeArgs {
            input,
            output,
            input_format,
            output_format,
            config,
            load_state,
            save_state,
            summary,
            as_of,
            athlete_id,
        }),

        Commands::Load {
            input,
            acute_days,
            chronic_days,
            as_of,
            output_format,
        } => cmd_load(&input, acute_days, chronic_days, as_of, &output_format),

        Commands::Validate {
            input,
            input_format,
            gap_threshold,
        } => cmd_validate(&input, input_format, gap_threshold),

        Commands::Config { input } => cmd_config(input.as_deref()),

        Commands::Doctor { config, state } => cmd_doctor(config.as_deref(), state.as_deref()),
    }
}

struct AnalyzeArgs {
    input: PathBuf,
    output: PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    config: Option<PathBuf>,
    load_state: Option<PathBuf>,
    save_state: Option<PathBuf>,
    summary: Option<PathBuf>,
    as_of: Option<NaiveDate>,
    athlete_id: Option<String>,
}

fn cmd_analyze(args: AnalyzeArgs) -> Result<(), TrainloadCliError> {
    let activities = parse_activities(&read_input(&args.input)?, &args.input_format)?;
    if activities.is_empty() {
        return Err(TrainloadCliError::NoActivities);
    }

    let mut timeline = match &args.load_state {
        Some(path) => AthleteTimeline::load_state(&fs::read_to_string(path)?)?,
        None => {
            let config = match &args.config {
                Some(path) => AthleteConfig::from_json(&fs::read_to_string(path)?)?,
                None => AthleteConfig::default(),
            };
            AthleteTimeline::new(config)?
        }
    };

    let count = timeline.add_activities(&activities);
    info!(count, "analyzed activities");

    // Zone configurations carry their own activation time
    let zones = timeline.config().power_zones.clone();
    if let Some(zones) = zones {
        timeline.apply_zone_configuration(zones, ZoneTarget::Power);
    }
    let hr_zones = timeline.config().hr_zones.clone();
    if let Some(zones) = hr_zones {
        timeline.apply_zone_configuration(zones, ZoneTarget::HeartRate);
    }

    let ids: Vec<u64> = activities.iter().map(|a| a.meta.id).collect();
    let records: Vec<_> = timeline
        .records()
        .iter()
        .filter(|r| ids.contains(&r.id))
        .collect();
    write_output(&args.output, &format_output(&records, &args.output_format)?)?;

    if let Some(path) = &args.summary {
        let as_of = args
            .as_of
            .or_else(|| timeline.records().last().map(|r| r.date()))
            .ok_or(TrainloadCliError::NoActivities)?;
        let summary = timeline.summary(as_of);
        let payload = SummaryEncoder::new().encode_to_json(&summary, args.athlete_id.as_deref())?;
        write_output(path, &payload)?;
    }

    if let Some(path) = &args.save_state {
        fs::write(path, timeline.save_state()?)?;
        debug!(path = %path.display(), "saved timeline state");
    }

    Ok(())
}

#[derive(Deserialize)]
struct DailyLoad {
    date: NaiveDate,
    load: f64,
}

#[derive(Serialize)]
struct LoadRow {
    #[serde(flatten)]
    state: TrainingLoadState,
    acwr_status: AcwrStatus,
    form_status: FormStatus,
}

fn cmd_load(
    input: &Path,
    acute_days: f64,
    chronic_days: f64,
    as_of: Option<NaiveDate>,
    output_format: &OutputFormat,
) -> Result<(), TrainloadCliError> {
    if !(acute_days > 0.0 && chronic_days > 0.0) {
        return Err(ComputeError::InvalidConfig("time constants must be > 0 days".to_string()).into());
    }

    let days: Vec<DailyLoad> = serde_json::from_str(&read_input(input)?)?;
    let pairs: Vec<(NaiveDate, f64)> = days.iter().map(|d| (d.date, d.load)).collect();

    let tracker = TrainingLoadTracker::with_constants(acute_days, chronic_days);
    let mut states = tracker.calculate_history(&pairs);
    if let (Some(as_of), Some(last)) = (as_of, states.last().copied()) {
        if as_of > last.date {
            states.push(tracker.project(&last, as_of));
        }
    }

    let rows: Vec<LoadRow> = states
        .into_iter()
        .map(|state| LoadRow {
            acwr_status: AcwrStatus::from_ratio(state.acute_chronic_ratio),
            form_status: FormStatus::from_balance(state.balance),
            state,
        })
        .collect();
    print!("{}", format_output(&rows, output_format)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, gap_threshold: f64) -> Result<(), TrainloadCliError> {
    let activities = parse_activities(&read_input(input)?, &input_format)?;

    let checks: Vec<ActivityCheck> = activities
        .iter()
        .map(|activity| {
            let checked = parse_stream_value(activity.streams.clone())
                .and_then(|columns| StreamPreparer::prepare(&columns, gap_threshold));
            match checked {
                Ok(stream) => ActivityCheck {
                    activity_id: activity.meta.id,
                    samples: stream.len(),
                    gaps: stream.gap_count(),
                    error: None,
                },
                Err(e) => ActivityCheck {
                    activity_id: activity.meta.id,
                    samples: 0,
                    gaps: 0,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    print!("{}", format_output(&checks, &OutputFormat::Ndjson)?);

    let invalid = checks.iter().filter(|c| c.error.is_some()).count();
    if invalid > 0 {
        Err(TrainloadCliError::ValidationFailed(invalid))
    } else {
        Ok(())
    }
}

fn cmd_config(input: Option<&Path>) -> Result<(), TrainloadCliError> {
    let config = match input {
        Some(path) => AthleteConfig::from_json(&fs::read_to_string(path)?)?,
        None => AthleteConfig::default(),
    };
    println!("{}", config.to_json()?);
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, state: Option<&Path>) -> Result<(), TrainloadCliError> {
    let mut report = DoctorReport {
        producer: PRODUCER_NAME,
        version: VERSION,
        parallel: cfg!(feature = "parallel"),
        stdin_piped: !atty::is(atty::Stream::Stdin),
        config: None,
        state: None,
    };

    if let Some(path) = config {
        report.config = Some(check_file(path, |content| {
            let config = AthleteConfig::from_json(content)?;
            Ok(format!("FTP {} W, FTHR {} bpm", config.ftp, config.fthr))
        }));
    }
    if let Some(path) = state {
        report.state = Some(check_file(path, |content| {
            let timeline = AthleteTimeline::load_state(content)?;
            Ok(format!(
                "{} activities, {} load days",
                timeline.records().len(),
                timeline.load_states().len()
            ))
        }));
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = [&report.config, &report.state]
        .into_iter()
        .flatten()
        .any(|check| !check.ok);
    if failed {
        Err(TrainloadCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_file<F>(path: &Path, check: F) -> FileCheck
where
    F: Fn(&str) -> Result<String, ComputeError>,
{
    let result = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| check(&content).map_err(|e| e.to_string()));
    match result {
        Ok(message) => FileCheck { ok: true, message },
        Err(message) => FileCheck { ok: false, message },
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, TrainloadCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(TrainloadCliError::NoInput);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), TrainloadCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn parse_activities(data: &str, format: &InputFormat) -> Result<Vec<ActivityInput>, TrainloadCliError> {
    match format {
        InputFormat::Json => Ok(serde_json::from_str(data)?),
        InputFormat::Ndjson => data
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .map_err(|e| TrainloadCliError::ParseError(format!("line {}: {}", i + 1, e)))
            })
            .collect(),
    }
}

fn format_output<T: Serialize>(rows: &[T], format: &OutputFormat) -> Result<String, TrainloadCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for row in rows {
                lines.push(serde_json::to_string(row)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(rows)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(rows)?),
    }
}

// Error types

#[derive(Debug)]
enum TrainloadCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoActivities,
    NoInput,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for TrainloadCliError {
    fn from(e: io::Error) -> Self {
        TrainloadCliError::Io(e)
    }
}

impl From<ComputeError> for TrainloadCliError {
    fn from(e: ComputeError) -> Self {
        TrainloadCliError::Compute(e)
    }
}

impl From<serde_json::Error> for TrainloadCliError {
    fn from(e: serde_json::Error) -> Self {
        TrainloadCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: &'static str,
    message: String,
}

impl From<TrainloadCliError> for CliError {
    fn from(e: TrainloadCliError) -> Self {
        let (code, message) = match e {
            TrainloadCliError::Io(e) => ("IO_ERROR", e.to_string()),
            TrainloadCliError::Compute(ComputeError::InvalidConfig(msg)) => ("CONFIG_ERROR", msg),
            TrainloadCliError::Compute(e) => ("COMPUTE_ERROR", e.to_string()),
            TrainloadCliError::Json(e) => ("JSON_ERROR", e.to_string()),
            TrainloadCliError::NoActivities => ("NO_ACTIVITIES", "no activities in input".to_string()),
            TrainloadCliError::NoInput => (
                "NO_INPUT",
                "stdin is a terminal; pipe a payload or pass a file".to_string(),
            ),
            TrainloadCliError::ValidationFailed(count) => {
                ("VALIDATION_FAILED", format!("{count} activities failed validation"))
            }
            TrainloadCliError::DoctorFailed => ("DOCTOR_FAILED", "a file check failed".to_string()),
            TrainloadCliError::ParseError(msg) => ("PARSE_ERROR", msg),
        };
        CliError { code, message }
    }
}

// Report types

#[derive(Serialize)]
struct ActivityCheck {
    activity_id: u64,
    samples: usize,
    gaps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: &'static str,
    version: &'static str,
    parallel: bool,
    stdin_piped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<FileCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<FileCheck>,
}

#[derive(Serialize)]
struct FileCheck {
    ok: bool,
    message: String,
}
