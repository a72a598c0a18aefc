use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragcache",
    version,
    about = "Build, cache and query retrieval-augmented generation corpora"
)]
pub struct Args {
    /// Path to config file (defaults to ./ragcache.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding corpus bundles (overrides config)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk, embed and index source files into a named corpus
    Build {
        /// Corpus name
        corpus: String,

        /// Files or directories to ingest; with none, a cached corpus is reused
        sources: Vec<PathBuf>,

        /// Rebuild even when a cached corpus exists
        #[arg(short, long)]
        force: bool,
    },
    /// Answer a question from a cached corpus
    Ask {
        corpus: String,

        question: String,

        /// Number of passages to retrieve (overrides config)
        #[arg(short, long)]
        k: Option<usize>,

        /// Print the answer and passages as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a cached corpus was built
    Info {
        corpus: String,

        #[arg(long)]
        json: bool,
    },
    /// List cached corpora
    List,
    /// Delete a cached corpus
    Clear { corpus: String },
}
