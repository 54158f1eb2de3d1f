use lawrag::cli::{Cli, Commands, ConfigAction};
use lawrag::config::{Config, ConfigValidator};
use lawrag::error::{LawragError, Result};
use lawrag::eval::{load_dataset, save_report, Evaluator};
use lawrag::retrieval::{BlockingRetriever, RetrievalEvent};
use std::path::{Path, PathBuf};

const NO_RESULTS_MESSAGE: &str = "Không tìm thấy thông tin liên quan trong văn bản luật.";

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Query {
            question,
            k,
            no_rerank,
            json,
        } => {
            cmd_query(cli.config, cli.profile, &question, k, no_rerank, json)?;
        }
        Commands::Eval {
            dataset,
            k,
            no_rerank,
            output,
        } => {
            cmd_eval(cli.config, cli.profile, &dataset, k, no_rerank, output)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "lawrag=debug" } else { "lawrag=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_query(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    question: &str,
    k: Option<usize>,
    no_rerank: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let k = k.unwrap_or(config.retrieval.default_k);
    let use_rerank = config.retrieval.use_rerank && !no_rerank;

    let retriever = BlockingRetriever::from_config(&config)?;

    if json {
        println!("{}", retriever.retrieve_as_json(question, k, use_rerank)?);
        return Ok(());
    }

    let outcome = retriever.assemble(question, k, use_rerank);
    for event in &outcome.events {
        if !matches!(event, RetrievalEvent::EmptyCandidateSet) {
            eprintln!("⚠ {}", event);
        }
    }

    if outcome.passages.is_empty() {
        println!("{}", NO_RESULTS_MESSAGE);
        return Ok(());
    }

    for (rank, passage) in outcome.passages.iter().enumerate() {
        let marker = if passage.is_reranked() { "rerank" } else { "fusion" };
        println!("[{}] {:.4} ({})", rank + 1, passage.score(), marker);

        if let Some(article) = passage.metadata().get("article").and_then(|v| v.as_str()) {
            println!("    {}", article);
        }
        println!("    {}", passage.content());
        println!();
    }

    tracing::debug!(
        "Query {} finished in {:?}",
        outcome.query_id,
        outcome.elapsed
    );

    Ok(())
}

fn cmd_eval(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    dataset: &Path,
    k: Option<usize>,
    no_rerank: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let k = k.unwrap_or(config.retrieval.default_k);
    let use_rerank = config.retrieval.use_rerank && !no_rerank;

    let items = load_dataset(dataset)?;
    tracing::info!("Loaded {} test questions", items.len());

    let retriever = BlockingRetriever::from_config(&config)?;
    let evaluator = Evaluator::new()?;
    let report = evaluator.evaluate(&items, k, use_rerank, |question| {
        retriever.assemble(question, k, use_rerank)
    });

    let metrics = &report.metrics;
    println!("Retrieval metrics ({} questions, k = {})", metrics.questions, k);
    println!(
        "  Hit rate@{}:      {:.2}% ({}/{})",
        k,
        metrics.hit_rate * 100.0,
        metrics.hits,
        metrics.questions
    );
    println!("  MRR:             {:.3}", metrics.mrr);
    println!("  Context recall:  {:.2}%", metrics.context_recall * 100.0);

    let path = save_report(&report, output.as_deref())?;
    println!("✓ Report saved to: {}", path.display());

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| LawragError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let value = match section {
                Some(section) => value
                    .get(&section)
                    .cloned()
                    .ok_or_else(|| LawragError::Config(format!("Unknown section: {}", section)))?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&value).map_err(|e| LawragError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lawrag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
