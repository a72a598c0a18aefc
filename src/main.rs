use anyhow::Result;
use clap::Parser;

use ragcache::cli::{run_ask, run_build, run_clear, run_info, run_list, Args, Command};
use ragcache::config::RagConfig;
use ragcache::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = RagConfig::load_or_default(args.config.as_deref())?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }

    match args.command {
        Command::Build {
            corpus,
            sources,
            force,
        } => run_build(&config, &corpus, &sources, force).await,
        Command::Ask {
            corpus,
            question,
            k,
            json,
        } => run_ask(&config, &corpus, &question, k, json).await,
        Command::Info { corpus, json } => run_info(&config, &corpus, json),
        Command::List => run_list(&config),
        Command::Clear { corpus } => run_clear(&config, &corpus),
    }
}
