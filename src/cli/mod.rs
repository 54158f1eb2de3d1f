//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lawrag",
    version,
    author = "neur0map",
    about = "Hybrid retrieval over Vietnamese traffic law",
    long_about = "lawrag answers legal questions with supporting passages: it queries a semantic and a \
                  keyword backend concurrently, merges both rankings with Reciprocal Rank Fusion and \
                  refines the best candidates with a cross-encoder reranker."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lawrag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g., "offline", "fast")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve passages for a question
    Query {
        /// Question text
        question: String,

        /// Number of passages to return (defaults to retrieval.default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Measure retrieval quality on a labelled question set
    Eval {
        /// JSON array of {question, contexts, ground_truth}
        #[arg(short, long, value_name = "FILE")]
        dataset: PathBuf,

        /// Passages retrieved per question (defaults to retrieval.default_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,

        /// Report path (defaults to retrieval_eval_<timestamp>.json)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
