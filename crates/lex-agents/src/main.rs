//! CLI entry point for the agent pipeline.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use lex_agents::{Orchestrator, PipelineConfig, PipelineRequest, PipelineSummary};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    author = "Lex Machina Team",
    version,
    about = "Staged agent pipeline: collect, featurize, predict, visualize",
    long_about = "Runs a CSV file through four agents: data collection, feature \
                  processing, random-forest prediction and visualization.\n\n\
                  EXAMPLES:\n  \
                  # Train on a labeled file and render a plot\n  \
                  lex-agents -i data.csv --target Survived\n\n  \
                  # Train, then keep the model for later\n  \
                  lex-agents -i data.csv --target Survived --save-model model.json\n\n  \
                  # Apply a saved model to new rows\n  \
                  lex-agents -i new.csv --no-train --load-model model.json\n\n  \
                  # Machine-readable summary\n  \
                  lex-agents -i data.csv --target Survived --no-visualize --json"
)]
struct Args {
    /// Path to the CSV file to process
    #[arg(short, long)]
    input: PathBuf,

    /// Label column for training
    ///
    /// Without it the pipeline only collects and featurizes (and predicts
    /// with a loaded model when --no-train is set)
    #[arg(short, long)]
    target: Option<String>,

    /// Apply the held model instead of training a new one
    #[arg(long)]
    no_train: bool,

    /// Skip the visualization stage
    #[arg(long)]
    no_visualize: bool,

    /// Output path of the rendered image
    #[arg(long)]
    viz_output: Option<PathBuf>,

    /// Load a saved model before running
    #[arg(long)]
    load_model: Option<PathBuf>,

    /// Save the model held after the run
    #[arg(long)]
    save_model: Option<PathBuf>,

    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Labels with fewer distinct values than this are classified
    #[arg(long)]
    classification_threshold: Option<usize>,

    /// Number of trees in the forest
    #[arg(long)]
    n_estimators: Option<usize>,

    /// Random seed for training
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON summary.
    #[arg(long)]
    json: bool,

    /// Include every agent's state in the output
    #[arg(long)]
    show_states: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    let config = build_config(&args)?;
    let quiet = args.quiet || args.json;

    let mut orchestrator = Orchestrator::builder()
        .config(config)
        .on_progress(move |update| {
            if !quiet {
                info!(
                    "[{:>3.0}%] {}: {}",
                    update.progress * 100.0,
                    update.stage.display_name(),
                    update.message
                );
            }
        })
        .build()?;

    if let Some(path) = &args.load_model {
        orchestrator
            .load_model(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;
    }

    let request = build_request(&args);

    info!("{}", "=".repeat(80));
    info!("Starting agent pipeline...");
    info!("{}", "=".repeat(80));

    let summary = match orchestrator.run_pipeline(&request) {
        Ok(summary) => summary,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            return Err(anyhow!("Pipeline failed: {}", e));
        }
    };

    if let Some(path) = &args.save_model {
        if !orchestrator.save_model(path)? {
            warn!("No trained model to save; {} not written", path.display());
        }
    }

    if args.json {
        let mut output = json!({ "summary": summary });
        if args.show_states {
            output["states"] = serde_json::to_value(orchestrator.agent_states())?;
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_human_readable_summary(&summary, &args);
    if args.show_states {
        for (agent, state) in orchestrator.agent_states() {
            println!("\n{}", agent);
            println!("{}", "-".repeat(40));
            println!("{}", serde_json::to_string_pretty(state)?);
        }
    }

    Ok(())
}

/// Merge the config file (if any) with the command-line overrides.
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Invalid config file {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(threshold) = args.classification_threshold {
        config.classification_threshold = threshold;
    }
    if let Some(n) = args.n_estimators {
        config.n_estimators = n;
    }
    if let Some(seed) = args.seed {
        config.random_seed = seed;
    }

    config.validate()?;
    Ok(config)
}

fn build_request(args: &Args) -> PipelineRequest {
    let mut request = PipelineRequest::new(&args.input)
        .train(!args.no_train)
        .visualize(!args.no_visualize);

    if let Some(target) = &args.target {
        request = request.label_column(target);
    }
    if let Some(path) = &args.viz_output {
        request = request.viz_output(path);
    }
    request
}

/// Print a human-readable summary of the run.
///
/// Uses `println!` intentionally: this is the primary CLI output and must
/// be visible regardless of log level.
fn print_human_readable_summary(summary: &PipelineSummary, args: &Args) {
    println!("\n{}", "=".repeat(80));
    println!("PIPELINE SUMMARY");
    println!("{}", "=".repeat(80));
    println!("  Input:          {}", args.input.display());
    println!(
        "  Data shape:     {} rows x {} columns",
        summary.data_shape.0, summary.data_shape.1
    );
    println!(
        "  Feature shape:  {} rows x {} columns",
        summary.feature_shape.0, summary.feature_shape.1
    );

    match (summary.prediction_count, summary.task_kind) {
        (Some(count), Some(kind)) => println!("  Predictions:    {} ({})", count, kind),
        (Some(count), None) => println!("  Predictions:    {}", count),
        (None, _) => println!("  Predictions:    skipped"),
    }

    match &summary.visualization_path {
        Some(path) => println!("  Visualization:  {}", path.display()),
        None if args.no_visualize => println!("  Visualization:  skipped"),
        None => println!("  Visualization:  not written"),
    }

    if let Some(path) = &args.save_model {
        if summary.task_kind.is_some() {
            println!("  Model saved:    {}", path.display());
        }
    }

    println!("  Duration:       {}ms", summary.duration_ms);
    println!("{}", "=".repeat(80));
}
