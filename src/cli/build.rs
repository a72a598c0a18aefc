use anyhow::Result;
use console::{style, Emoji};
use std::path::PathBuf;

use crate::config::RagConfig;
use crate::rag::{BuildOptions, BuildOutcome};

use super::{open_pipeline, spinner};

static BUILDING: Emoji<'_, '_> = Emoji("📊 ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");
static CACHED: Emoji<'_, '_> = Emoji("💾 ", "");

pub async fn run_build(
    config: &RagConfig,
    corpus: &str,
    sources: &[PathBuf],
    force: bool,
) -> Result<()> {
    let mut pipeline = open_pipeline(config).await?;

    let pb = spinner(format!("{}Building corpus {}...", BUILDING, corpus))?;
    let result = pipeline
        .build_from_paths(sources, corpus, BuildOptions { force_rebuild: force })
        .await;
    pb.finish_and_clear();

    let outcome = result?;
    let info = pipeline.info()?;

    match outcome {
        BuildOutcome::Built => println!("\n{}Corpus built!\n", SUCCESS),
        BuildOutcome::Loaded => println!(
            "\n{}Reused cached corpus (pass sources or --force to rebuild)\n",
            CACHED
        ),
    }
    println!("  Corpus:          {}", style(&info.corpus_name).green());
    println!("  Sources:         {}", style(info.sources.len()).cyan());
    println!("  Chunks:          {}", style(info.chunk_count).cyan());
    println!(
        "  Model:           {} ({} dims)",
        info.embedding_model, info.embedding_dim
    );
    println!(
        "  Location:        {}",
        style(pipeline.store().cache_dir().display()).dim()
    );

    Ok(())
}
