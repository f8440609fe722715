// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use clap::{Args, Parser, Subcommand};
use peakseg_core::{CountSeries, ExecutionContext, OfflineDetector, PeakSegError, SegmentationResult};
use peakseg_fpop::{FpopConfig, PoissonFpop, SelfCheckConfig};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

/// Penalized Poisson segmentation of count data.
#[derive(Parser, Debug)]
#[command(name = "peakseg", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Segment a count series and print the optimal segmentation as JSON
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// CSV file with one count per row, optionally followed by a weight column
    #[arg(long)]
    input: PathBuf,

    /// Cost added per change point (finite, >= 0)
    #[arg(long)]
    penalty: f64,

    /// Write JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Random sample points per internal consistency check
    #[arg(long, default_value_t = 100)]
    self_check_samples: usize,

    /// Seed for the consistency-check sample stream
    #[arg(long, default_value_t = 0)]
    self_check_seed: u64,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    PeakSeg(#[from] PeakSegError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Json {
        context: String,
        source: serde_json::Error,
    },
    #[error("{0}")]
    InvalidInput(String),
}

impl CliError {
    fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::PeakSeg(err) => err.code(),
            Self::InvalidInput(_) => "invalid_input",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
        }
    }
}

/// Parsed input: counts plus weights when a second column is present.
#[derive(Clone, Debug, PartialEq)]
struct LoadedCounts {
    counts: Vec<u64>,
    weights: Option<Vec<f64>>,
}

#[derive(Serialize)]
struct InputSummary<'a> {
    path: &'a Path,
    n: usize,
    weighted: bool,
}

#[derive(Serialize)]
struct DetectOutput<'a> {
    input: InputSummary<'a>,
    result: &'a SegmentationResult,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(err) = run(Cli::parse()) {
        emit_structured_error(&err);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Detect(args) => handle_detect(args),
    }
}

fn handle_detect(args: DetectArgs) -> Result<(), CliError> {
    let raw = fs::read_to_string(&args.input).map_err(|source| {
        CliError::io(format!("failed to read '{}'", args.input.display()), source)
    })?;
    let loaded = parse_csv_counts(raw.as_str())?;
    let series = CountSeries::new(&loaded.counts, loaded.weights.as_deref())?;

    let detector = PoissonFpop::new(FpopConfig {
        penalty: args.penalty,
        self_check: SelfCheckConfig {
            samples: args.self_check_samples,
            seed: args.self_check_seed,
            ..SelfCheckConfig::default()
        },
        ..FpopConfig::default()
    })?;

    tracing::info!(
        input = %args.input.display(),
        n = series.len(),
        weighted = series.is_weighted(),
        penalty = args.penalty,
        "running detect"
    );
    let result = detector.detect(&series, &ExecutionContext::new())?;

    let payload = DetectOutput {
        input: InputSummary {
            path: args.input.as_path(),
            n: series.len(),
            weighted: series.is_weighted(),
        },
        result: &result,
    };
    write_json_output(&payload, args.output.as_deref())
}

fn parse_csv_counts(raw: &str) -> Result<LoadedCounts, CliError> {
    let rows = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();

    if rows.is_empty() {
        return Err(CliError::invalid_input("CSV input is empty"));
    }

    match parse_csv_rows(rows.as_slice()) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            if rows.len() > 1
                && first_row_looks_like_header(rows[0], rows[1])
                && let Ok(without_header) = parse_csv_rows(&rows[1..])
            {
                return Ok(without_header);
            }
            Err(err)
        }
    }
}

fn parse_csv_rows(rows: &[&str]) -> Result<LoadedCounts, CliError> {
    let mut counts = Vec::with_capacity(rows.len());
    let mut weights = Vec::new();
    let mut expected_cols: Option<usize> = None;

    for (row_idx, row) in rows.iter().enumerate() {
        let cells = row.split(',').map(str::trim).collect::<Vec<_>>();
        let cols = *expected_cols.get_or_insert(cells.len());
        if cells.len() != cols {
            return Err(CliError::invalid_input(format!(
                "CSV row {} has {} columns but expected {cols}",
                row_idx + 1,
                cells.len()
            )));
        }
        if !(1..=2).contains(&cols) {
            return Err(CliError::invalid_input(format!(
                "CSV must have one column (count) or two (count,weight); row {} has {cols}",
                row_idx + 1
            )));
        }

        let count = cells[0].parse::<u64>().map_err(|_| {
            CliError::invalid_input(format!(
                "CSV row {} column 1 is not a non-negative integer count: '{}'",
                row_idx + 1,
                cells[0]
            ))
        })?;
        counts.push(count);

        if let Some(cell) = cells.get(1) {
            let weight = cell.parse::<f64>().map_err(|_| {
                CliError::invalid_input(format!(
                    "CSV row {} column 2 is not a valid float weight: '{cell}'",
                    row_idx + 1
                ))
            })?;
            weights.push(weight);
        }
    }

    Ok(LoadedCounts {
        counts,
        weights: (expected_cols == Some(2)).then_some(weights),
    })
}

fn first_row_looks_like_header(first_row: &str, second_row: &str) -> bool {
    let first_cells = first_row.split(',').map(str::trim).collect::<Vec<_>>();
    let second_cells = second_row.split(',').map(str::trim).collect::<Vec<_>>();

    if first_cells.len() != second_cells.len()
        || first_cells.iter().any(|cell| cell.is_empty())
        || second_cells.iter().any(|cell| cell.is_empty())
    {
        return false;
    }

    let first_all_non_numeric = first_cells.iter().all(|cell| cell.parse::<f64>().is_err());
    let second_all_numeric = second_cells.iter().all(|cell| cell.parse::<f64>().is_ok());

    first_all_non_numeric && second_all_numeric
}

fn write_json_output<T: Serialize>(
    payload: &T,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    let encoded = serde_json::to_string_pretty(payload)
        .map_err(|source| CliError::json("failed to serialize JSON output", source))?;

    if let Some(path) = output_path {
        fs::write(path, format!("{encoded}\n"))
            .map_err(|source| CliError::io(format!("failed to write '{}'", path.display()), source))
    } else {
        println!("{encoded}");
        Ok(())
    }
}

fn emit_structured_error(err: &CliError) {
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!(
            "{{\"error\":{{\"code\":\"{}\",\"message\":\"{}\"}}}}",
            err.code(),
            err
        ),
    }
}
