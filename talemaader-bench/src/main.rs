//! Talemåder benchmark CLI

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use talemaader_bench::{
    analysis::{aggregate, reconcile, verify_store, ModelResultSet},
    config::Config,
    dataset::{load_dataset, Dataset},
    normalize::Mode,
    providers::create_adapter,
    reporting::{
        discrepancy_rows, print_console_report, print_verification_report, write_discrepancies,
        write_gold_joined, write_summary, JsonSummary,
    },
    runner::{BatchRunner, RunnerConfig},
    store::{PredictionLog, PredictionStore},
};

/// Evaluation mode selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ModeArg {
    /// One prompt per idiom listing all four definitions
    MultipleChoice,
    /// Four yes/no prompts per idiom
    YesNo,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::MultipleChoice => Mode::MultipleChoice,
            ModeArg::YesNo => Mode::YesNo,
        }
    }
}

#[derive(Parser)]
#[command(name = "talemaader-bench")]
#[command(about = "Danish idiom (talemåder) benchmark across LLM providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Dataset location overrides
#[derive(Args)]
struct DataArgs {
    /// Options file (idiom and definitions A-D)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Gold labels file
    #[arg(long)]
    labels: Option<PathBuf>,

    /// The options file carries the gold labels itself
    #[arg(long, conflicts_with = "labels")]
    combined: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Query models for the next batch of unanswered idioms
    Run {
        /// Comma-separated model aliases
        #[arg(short, long)]
        models: String,

        #[arg(long, value_enum, default_value = "multiple-choice")]
        mode: ModeArg,

        /// New items per model (default from config)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Number of parallel requests (default from config)
        #[arg(long)]
        parallel: Option<usize>,

        /// Keep running batches until no item is left or a batch settles nothing
        #[arg(long)]
        until_done: bool,

        #[command(flatten)]
        data: DataArgs,
    },

    /// Reconcile stored predictions with gold labels and report accuracy
    Evaluate {
        /// Comma-separated model aliases (default: every alias with a store)
        #[arg(short, long)]
        models: Option<String>,

        #[arg(long, value_enum, default_value = "multiple-choice")]
        mode: ModeArg,

        /// Output directory for reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        data: DataArgs,
    },

    /// Check a prediction store for missing, duplicate and unknown items
    Verify {
        #[arg(short, long)]
        model: String,

        #[arg(long, value_enum, default_value = "multiple-choice")]
        mode: ModeArg,

        #[command(flatten)]
        data: DataArgs,
    },

    /// List configured model aliases
    ListModels,

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/models.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("talemaader_bench=debug,info")
    } else {
        EnvFilter::new("talemaader_bench=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run {
            models,
            mode,
            batch_size,
            parallel,
            until_done,
            data,
        } => {
            run_models(&config, &models, mode.into(), batch_size, parallel, until_done, &data).await?;
        }

        Commands::Evaluate {
            models,
            mode,
            output,
            data,
        } => {
            evaluate(&config, models, mode.into(), output, &data)?;
        }

        Commands::Verify { model, mode, data } => {
            verify(&config, &model, mode.into(), &data)?;
        }

        Commands::ListModels => {
            list_models(&config);
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn load_gold(config: &Config, data: &DataArgs) -> Result<Dataset, Box<dyn std::error::Error>> {
    let options = data
        .options
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data.options_path));
    let labels = if data.combined {
        None
    } else {
        data.labels
            .clone()
            .or_else(|| config.data.labels_file().map(Path::to_path_buf))
    };

    let dataset = load_dataset(&options, labels.as_deref())?;
    if dataset.is_empty() {
        return Err(format!("No valid items in {}", options.display()).into());
    }
    Ok(dataset)
}

async fn run_models(
    config: &Config,
    models: &str,
    mode: Mode,
    batch_size: Option<usize>,
    parallel: Option<usize>,
    until_done: bool,
    data: &DataArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let run_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let dataset = load_gold(config, data)?;

    println!("=== Talemåder Benchmark ===");
    println!("Run ID: {}", run_id);
    println!("Mode:   {}", mode);
    println!("Items:  {} ({} rejected rows)", dataset.len(), dataset.rejected().len());
    println!();

    for alias in split_list(models) {
        let adapter = create_adapter(&alias, config)?;

        let mut runner_config = RunnerConfig::for_model(config, &alias)?;
        if let Some(batch_size) = batch_size {
            runner_config = runner_config.with_batch_size(batch_size);
        }
        if let Some(parallel) = parallel {
            runner_config.parallel_requests = parallel;
        }
        let runner = BatchRunner::new(runner_config);

        let store_path = config.data.store_path(&alias, mode);
        let mut predictions = PredictionLog::load(&store_path)?;

        loop {
            let settled_before = predictions.settled_ids().len();
            let store = PredictionStore::open(&store_path)?;
            let outcome = runner
                .run(&dataset, adapter.clone(), mode, predictions, Some(store))
                .await?;

            println!(
                "{}: {} attempted, {} undetermined, {} failed, {} remaining",
                alias,
                outcome.attempted.len(),
                outcome.undetermined,
                outcome.failures,
                outcome.remaining
            );

            predictions = outcome.predictions;
            let progressed = predictions.settled_ids().len() > settled_before;
            if !until_done || outcome.remaining == 0 || !progressed {
                break;
            }
        }

        println!("Predictions written to: {}", store_path.display());
    }

    Ok(())
}

fn evaluate(
    config: &Config,
    models: Option<String>,
    mode: Mode,
    output: Option<PathBuf>,
    data: &DataArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let run_id = Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let dataset = load_gold(config, data)?;
    let output_dir = output
        .unwrap_or_else(|| PathBuf::from(&config.data.output_dir))
        .join(mode.as_str());
    std::fs::create_dir_all(&output_dir)?;

    let aliases = match models {
        Some(list) => split_list(&list),
        None => config
            .model_aliases()
            .into_iter()
            .filter(|alias| config.data.store_path(alias, mode).exists())
            .map(str::to_string)
            .collect(),
    };

    if aliases.is_empty() {
        eprintln!("Error: No prediction stores found for {} mode", mode);
        std::process::exit(1);
    }

    let mut results = ModelResultSet::new();
    for alias in aliases {
        let predictions = PredictionLog::load(config.data.store_path(&alias, mode))?;
        let reconciliation = reconcile(&predictions, &dataset, config.benchmark.single_yes_policy);
        if !reconciliation.unmatched.is_empty() {
            println!(
                "{}: {} predictions without a gold label were excluded",
                alias,
                reconciliation.unmatched.len()
            );
        }

        write_gold_joined(
            output_dir.join(format!("predicted_and_gold_labels_{}.csv", alias)),
            &reconciliation.records,
        )?;
        write_discrepancies(
            output_dir.join(format!("only_discrepancies_{}.csv", alias)),
            &discrepancy_rows(&reconciliation.records, &dataset),
        )?;

        results.insert(alias, reconciliation.records);
    }

    let summaries = aggregate(&results);
    print_console_report(mode, &summaries);

    let summary_path = output_dir.join("accuracy_summary.csv");
    write_summary(&summary_path, &summaries)?;
    println!("\nAccuracy summary written to: {}", summary_path.display());

    let json_path = output_dir.join(format!("summary_{}.json", run_id));
    JsonSummary::new(&run_id, mode, dataset.len(), summaries).write_to_file(&json_path)?;
    println!("JSON summary written to: {}", json_path.display());

    Ok(())
}

fn verify(config: &Config, model: &str, mode: Mode, data: &DataArgs) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = load_gold(config, data)?;
    let store_path = config.data.store_path(model, mode);
    if !store_path.exists() {
        eprintln!("Error: No prediction store at {}", store_path.display());
        std::process::exit(1);
    }

    let predictions = PredictionLog::load(&store_path)?;
    let report = verify_store(model, &predictions, &dataset);
    print_verification_report(&report, mode);
    Ok(())
}

fn list_models(config: &Config) {
    println!("Configured Models ({}):", config.models.len());
    println!("{:-<60}", "");

    for (alias, model) in &config.models {
        let key = config
            .providers
            .get(&model.provider)
            .map(|p| p.api_key_env.as_str())
            .unwrap_or("?");
        let available = if std::env::var(key).is_ok() { "ready" } else { "no key" };
        println!(
            "  {:<20} | {:<10} | {:<28} | {} ({})",
            alias, model.provider, model.model_id, key, available
        );
    }
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
