use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use qestimate::estimator::Estimator;
use qestimate::input::{for_each_timed_value, for_each_value};
use qestimate::invariant::Invariant;
use qestimate::report::{EstimationMode, QuantileReport, StreamStats};
use qestimate::window::{ManualClock, TimeWindowEstimator};

use crate::config::{Config, OutputFormat};
use crate::output::{export_report, print_summary, ReadProgress};

#[derive(Parser)]
#[command(name = "qestimate")]
#[command(author, version, about = "Streaming quantile estimation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./qestimate.toml when present)
    #[arg(short, long, global = true, env = "QESTIMATE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate quantiles over a whole stream of values
    Estimate {
        /// File with one or more numbers per line (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Quantile target as QUANTILE:ERROR, e.g. 0.99:0.001
        #[arg(short = 'q', long = "invariant", value_parser = parse_invariant)]
        invariants: Vec<(f64, f64)>,

        /// Rank to report, e.g. 0.5
        #[arg(short, long = "rank", value_parser = parse_rank)]
        ranks: Vec<f64>,
    },
    /// Replay `<timestamp_ms> <value>` lines through a sliding time window
    Window {
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short = 'q', long = "invariant", value_parser = parse_invariant)]
        invariants: Vec<(f64, f64)>,

        #[arg(short, long = "rank", value_parser = parse_rank)]
        ranks: Vec<f64>,

        #[arg(long)]
        max_age_seconds: Option<u64>,

        #[arg(long)]
        age_buckets: Option<usize>,

        /// Query time in milliseconds (defaults to the last timestamp read)
        #[arg(long)]
        at: Option<u64>,
    },
    /// Write the default configuration to a file
    InitConfig {
        #[arg(default_value = "qestimate.toml")]
        path: PathBuf,
    },
}

fn parse_invariant(arg: &str) -> std::result::Result<(f64, f64), String> {
    let (quantile, error) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected QUANTILE:ERROR, got '{arg}'"))?;
    let quantile: f64 = quantile
        .trim()
        .parse()
        .map_err(|e| format!("invalid quantile '{quantile}': {e}"))?;
    let error: f64 = error
        .trim()
        .parse()
        .map_err(|e| format!("invalid error '{error}': {e}"))?;

    Invariant::new(quantile, error).map_err(|e| e.to_string())?;
    Ok((quantile, error))
}

fn parse_rank(arg: &str) -> std::result::Result<f64, String> {
    let rank: f64 = arg
        .trim()
        .parse()
        .map_err(|e| format!("invalid rank '{arg}': {e}"))?;
    check_rank(rank)
}

fn check_rank(rank: f64) -> std::result::Result<f64, String> {
    if (0.0..=1.0).contains(&rank) {
        Ok(rank)
    } else {
        Err(format!("rank {rank} must lie in [0, 1]"))
    }
}

fn open_input(input: Option<&Path>) -> Result<(String, Box<dyn BufRead>)> {
    match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            Ok((path.display().to_string(), Box::new(BufReader::new(file))))
        }
        None => Ok(("stdin".to_string(), Box::new(io::stdin().lock()))),
    }
}

fn resolve_invariants(config: &Config, invariants: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if invariants.is_empty() {
        config.estimator.invariant_pairs()
    } else {
        invariants.to_vec()
    }
}

fn resolve_ranks(config: &Config, ranks: &[f64]) -> Result<Vec<f64>> {
    if !ranks.is_empty() {
        return Ok(ranks.to_vec());
    }

    config
        .output
        .ranks
        .iter()
        .map(|&rank| check_rank(rank).map_err(anyhow::Error::msg))
        .collect::<Result<Vec<_>>>()
        .context("Invalid rank in configuration")
}

fn estimate_report(
    config: &Config,
    input: Option<&Path>,
    invariants: &[(f64, f64)],
    ranks: &[f64],
) -> Result<QuantileReport> {
    let invariants = resolve_invariants(config, invariants);
    let ranks = resolve_ranks(config, ranks)?;
    let mut estimator = Estimator::new(&invariants)?;

    let (source, reader) = open_input(input)?;
    let progress = ReadProgress::start(&source);
    let mut stats = StreamStats::default();

    let read = for_each_value(reader, |value| {
        estimator.observe(value);
        stats.record(value);
        progress.observed(stats.count);
    });
    let read = match read {
        Ok(read) => read,
        Err(e) => {
            progress.abandon();
            return Err(e).with_context(|| format!("Failed to read observations from {source}"));
        }
    };
    progress.finish(read);

    info!("Read {} observations from {}", stats.count, source);

    Ok(QuantileReport::collect(
        source,
        EstimationMode::Stream,
        stats,
        &mut estimator,
        &ranks,
    ))
}

struct WindowArgs<'a> {
    input: Option<&'a Path>,
    invariants: &'a [(f64, f64)],
    ranks: &'a [f64],
    max_age_seconds: Option<u64>,
    age_buckets: Option<usize>,
    at: Option<u64>,
}

fn window_report(config: &Config, args: &WindowArgs<'_>) -> Result<QuantileReport> {
    let invariants = resolve_invariants(config, args.invariants);
    let ranks = resolve_ranks(config, args.ranks)?;
    let max_age = Duration::from_secs(
        args.max_age_seconds
            .unwrap_or(config.window.max_age_seconds),
    );
    let age_buckets = args.age_buckets.unwrap_or(config.window.age_buckets);

    let clock = ManualClock::new(0);
    let mut window =
        TimeWindowEstimator::with_clock(&invariants, max_age, age_buckets, clock.clone())?;

    let (source, reader) = open_input(args.input)?;
    let progress = ReadProgress::start(&source);
    let mut stats = StreamStats::default();
    let mut last_timestamp = None;

    let read = for_each_timed_value(reader, |timestamp, value| {
        clock.set(timestamp);
        window.observe(value);
        stats.record(value);
        last_timestamp = Some(timestamp);
        progress.observed(stats.count);
    });
    let read = match read {
        Ok(read) => read,
        Err(e) => {
            progress.abandon();
            return Err(e).with_context(|| format!("Failed to read observations from {source}"));
        }
    };
    progress.finish(read);

    if let Some(at) = args.at.or(last_timestamp) {
        info!("Querying window at {}ms", at);
        clock.set(at);
    }

    Ok(QuantileReport::collect(
        source,
        EstimationMode::Window {
            max_age_seconds: max_age.as_secs_f64(),
            age_buckets,
        },
        stats,
        &mut window,
        &ranks,
    ))
}

impl Cli {
    fn emit(&self, report: &QuantileReport, format: OutputFormat, pretty: bool) -> Result<()> {
        match (&self.output, format) {
            (None, OutputFormat::Summary) => print_summary(report),
            (None, _) => {
                let mut stdout = io::stdout().lock();
                export_report(report, format, pretty, &mut stdout)?;
            }
            (Some(output_path), _) => {
                let mut file = File::create(output_path).with_context(|| {
                    format!("Failed to create output file: {}", output_path.display())
                })?;
                export_report(report, format, pretty, &mut file)?;
                info!("Report written to: {}", output_path.display());
            }
        }

        Ok(())
    }

    pub fn execute(&self) -> Result<()> {
        if let Commands::InitConfig { path } = &self.command {
            Config::default().save(path)?;
            info!("Default configuration written to: {}", path.display());
            return Ok(());
        }

        let config = Config::load(self.config.as_deref())?;
        let format = self.format.unwrap_or(config.output.format);
        let pretty = self.pretty || config.output.pretty;

        let report = match &self.command {
            Commands::Estimate {
                input,
                invariants,
                ranks,
            } => {
                info!("Estimating quantiles over the whole stream");
                estimate_report(&config, input.as_deref(), invariants, ranks)?
            }
            Commands::Window {
                input,
                invariants,
                ranks,
                max_age_seconds,
                age_buckets,
                at,
            } => {
                info!("Estimating quantiles over a sliding time window");
                let args = WindowArgs {
                    input: input.as_deref(),
                    invariants,
                    ranks,
                    max_age_seconds: *max_age_seconds,
                    age_buckets: *age_buckets,
                    at: *at,
                };
                window_report(&config, &args)?
            }
            Commands::InitConfig { .. } => return Ok(()),
        };

        self.emit(&report, format, pretty)
    }
}
