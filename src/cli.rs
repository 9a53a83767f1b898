use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "facetlearn",
    about = "Learn ad-hoc visual facets over a newspaper photo corpus"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Metadata JSON file (defaults to <data-dir>/metadata.json)
    #[arg(long, global = true)]
    pub metadata: Option<PathBuf>,

    /// Embedding matrix .npy file (defaults to <data-dir>/embeddings.npy)
    #[arg(long, global = true)]
    pub embeddings: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train a facet classifier from a keyword and rank the corpus
    Learn(LearnArgs),
    /// Show the keyword matches that would seed a facet
    Search(SearchArgs),
    /// Show corpus and configuration details
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Learn --

#[derive(Debug, Parser)]
pub struct LearnArgs {
    /// Keyword to bootstrap positives from (matched as a raw substring)
    pub query: String,

    /// Number of results to request (overrides config n_results)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Negative sampling seed (overrides config seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,

    /// Output only uuids (one per line)
    #[arg(long, conflicts_with = "json")]
    pub uuids: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Keyword to match against OCR text
    pub query: String,

    /// Number of matches to print
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output matches as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "facetlearn",
            &mut std::io::stdout(),
        );
    }
}
