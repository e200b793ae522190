use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use marceval_core::config_file::{self, ConfigFile};
use marceval_core::{
    DEFAULT_WORKERS, FieldComparator, PoolConfig, ProgressEvent, RunMetadata, SelectorSet,
};
use marceval_record::RecordFormat;
use marceval_reporting::{EvaluationReport, ExportFormat};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// MARC record evaluator - score generated catalog records against references
#[derive(Parser, Debug)]
#[command(name = "marceval", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare one generated record against its reference
    Compare {
        /// Reference record (mnemonic or MARCXML)
        reference: PathBuf,

        /// Generated record to score
        candidate: PathBuf,

        /// Reference format (detected when omitted)
        #[arg(long)]
        reference_format: Option<RecordFormat>,

        /// Candidate format (detected when omitted)
        #[arg(long)]
        candidate_format: Option<RecordFormat>,

        /// Selector preset: marc or five_field
        #[arg(long)]
        preset: Option<String>,

        /// Extra config file layered over the platform and local configs
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the comparison as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a record and show what the evaluator sees
    Inspect {
        /// Record file (mnemonic or MARCXML)
        file: PathBuf,

        /// Record format (detected when omitted)
        #[arg(long)]
        format: Option<RecordFormat>,
    },

    /// Evaluate every item of a dataset and summarize
    Evaluate {
        /// Dataset file (.jsonl / .json) or a directory containing one
        dataset: PathBuf,

        /// Evaluate at most this many items (malformed lines are skipped)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Selector preset: marc or five_field
        #[arg(long)]
        preset: Option<String>,

        /// Extra config file layered over the platform and local configs
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory to write results.json into
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Generator provider recorded in the report
        #[arg(long)]
        provider: Option<String>,

        /// Generator model recorded in the report
        #[arg(long)]
        model: Option<String>,

        /// Evaluate withdrawn references instead of skipping them
        #[arg(long)]
        include_withdrawn: bool,

        /// Print the full report in this format instead of the summary
        #[arg(long)]
        format: Option<ExportFormat>,
    },

    /// Render a saved results directory
    Report {
        /// Directory containing results.json (or the file itself)
        results: PathBuf,

        /// Output format: text, json or csv
        #[arg(short, long, default_value = "text")]
        format: ExportFormat,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = ColorMode(!cli.no_color);

    match cli.command {
        Command::Compare {
            reference,
            candidate,
            reference_format,
            candidate_format,
            preset,
            config,
            json,
        } => {
            let selectors = resolve_selectors(preset.as_deref(), config.as_deref())?;
            compare(
                &reference,
                reference_format,
                &candidate,
                candidate_format,
                selectors,
                json,
                color,
            )
        }
        Command::Inspect { file, format } => inspect(&file, format, color),
        Command::Evaluate {
            dataset,
            limit,
            workers,
            preset,
            config,
            output,
            provider,
            model,
            include_withdrawn,
            format,
        } => {
            let file_config = load_config(config.as_deref())?;
            let selectors = match preset.as_deref() {
                Some(name) => SelectorSet::preset(name)?,
                None => file_config.selector_set()?,
            };
            let pool_config = PoolConfig {
                num_workers: resolve_workers(workers, &file_config)?,
                skip_withdrawn: !include_withdrawn && file_config.skip_withdrawn().unwrap_or(true),
            };
            evaluate(EvaluateArgs {
                dataset,
                limit,
                selectors,
                pool_config,
                output,
                provider,
                model,
                format,
                color,
            })
            .await
        }
        Command::Report {
            results,
            format,
            output,
        } => report(&results, format, output.as_deref()),
    }
}

/// Logs go to stderr so rendered reports on stdout stay clean.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    config_file::load_config(explicit).map_err(anyhow::Error::msg)
}

fn resolve_selectors(preset: Option<&str>, config: Option<&Path>) -> anyhow::Result<SelectorSet> {
    Ok(match preset {
        Some(name) => SelectorSet::preset(name)?,
        None => load_config(config)?.selector_set()?,
    })
}

/// CLI flag > `MARCEVAL_WORKERS` > config file > default.
fn resolve_workers(flag: Option<usize>, config: &ConfigFile) -> anyhow::Result<usize> {
    let from_env = match std::env::var("MARCEVAL_WORKERS") {
        Ok(v) => Some(
            v.trim()
                .parse::<usize>()
                .with_context(|| format!("MARCEVAL_WORKERS is not a number: {v}"))?,
        ),
        Err(_) => None,
    };
    let workers = flag
        .or(from_env)
        .or(config.workers())
        .unwrap_or(DEFAULT_WORKERS);
    if workers == 0 {
        anyhow::bail!("worker count must be at least 1");
    }
    Ok(workers)
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn compare(
    reference: &Path,
    reference_format: Option<RecordFormat>,
    candidate: &Path,
    candidate_format: Option<RecordFormat>,
    selectors: SelectorSet,
    json: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    let reference_bytes = read_file(reference)?;
    let candidate_bytes = read_file(candidate)?;

    let comparator = FieldComparator::new(selectors);
    let comparison = comparator.compare_raw(
        &reference_bytes,
        reference_format,
        &candidate_bytes,
        candidate_format,
    )?;

    let mut stdout = std::io::stdout();
    if json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&comparison)?)?;
    } else {
        output::print_comparison(&mut stdout, &comparison, color)?;
    }
    Ok(())
}

fn inspect(file: &Path, format: Option<RecordFormat>, color: ColorMode) -> anyhow::Result<()> {
    let raw = read_file(file)?;
    let format =
        format.unwrap_or_else(|| marceval_record::detect_format(&String::from_utf8_lossy(&raw)));
    let record = marceval_record::parse(&raw, Some(format))
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string());
    output::print_record(&mut std::io::stdout(), &name, format, &record, color)?;
    Ok(())
}

struct EvaluateArgs {
    dataset: PathBuf,
    limit: Option<usize>,
    selectors: SelectorSet,
    pool_config: PoolConfig,
    output: Option<PathBuf>,
    provider: Option<String>,
    model: Option<String>,
    format: Option<ExportFormat>,
    color: ColorMode,
}

async fn evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let dataset = match args.limit {
        Some(limit) => marceval_dataset::load_sample(&args.dataset, Some(limit))?,
        None => marceval_dataset::load(&args.dataset)?,
    };
    if dataset.is_empty() {
        anyhow::bail!("Dataset {} has no items", args.dataset.display());
    }

    tracing::info!(
        dataset = %args.dataset.display(),
        items = dataset.len(),
        workers = args.pool_config.num_workers,
        selectors = args.selectors.len(),
        "evaluating dataset"
    );

    let bar = ProgressBar::new(dataset.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg} (eta {eta})",
        )?
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_cb = {
        let bar = bar.clone();
        move |event: ProgressEvent| match event {
            ProgressEvent::Evaluating { id, .. } => bar.set_message(id),
            ProgressEvent::Evaluated { .. }
            | ProgressEvent::Failed { .. }
            | ProgressEvent::Skipped { .. } => bar.inc(1),
        }
    };

    let cancel = CancellationToken::new();

    // Ctrl+C stops submitting; in-flight records finish.
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let comparator = Arc::new(FieldComparator::new(args.selectors.clone()));
    let outcomes = marceval_core::evaluate_pairs(
        dataset.pairs(),
        comparator,
        args.pool_config,
        progress_cb,
        cancel.clone(),
    )
    .await;
    bar.finish_and_clear();

    if cancel.is_cancelled() {
        tracing::warn!(
            evaluated = outcomes.len(),
            total = dataset.len(),
            "evaluation interrupted; reporting partial results"
        );
    }

    let mut metadata = RunMetadata::now(outcomes.len());
    metadata.provider = args.provider;
    metadata.model = args.model;
    metadata.dataset = Some(args.dataset.display().to_string());

    let aggregate = marceval_core::aggregate(&outcomes, metadata);
    let report = EvaluationReport::new(aggregate, &args.selectors, outcomes);

    let mut stdout = std::io::stdout();
    match args.format {
        Some(format) => write!(stdout, "{}", marceval_reporting::render_report(&report, format)?)?,
        None => output::print_summary(&mut stdout, &report.aggregate, args.color)?,
    }

    if let Some(dir) = &args.output {
        let path = marceval_reporting::save_results(dir, &report)?;
        eprintln!("Results saved to {}", path.display());
    }
    Ok(())
}

fn report(results: &Path, format: ExportFormat, output: Option<&Path>) -> anyhow::Result<()> {
    let report = marceval_reporting::load_results(results)
        .with_context(|| format!("Failed to load results from {}", results.display()))?;

    match output {
        Some(path) => {
            marceval_reporting::export_report(&report, format, path)?;
            eprintln!("Report written to {}", path.display());
        }
        None => {
            let content = marceval_reporting::render_report(&report, format)?;
            write!(std::io::stdout(), "{}", content)?;
        }
    }
    Ok(())
}
