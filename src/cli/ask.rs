use anyhow::Result;
use console::{style, Emoji};

use crate::config::RagConfig;
use crate::rag::{BuildOptions, PersistenceManager};

use super::{open_pipeline, spinner};

static THINKING: Emoji<'_, '_> = Emoji("🤔 ", "");
static ANSWER: Emoji<'_, '_> = Emoji("💬 ", "");
static FILE: Emoji<'_, '_> = Emoji("📄 ", "");

pub async fn run_ask(
    config: &RagConfig,
    corpus: &str,
    question: &str,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    if !PersistenceManager::new(&config.cache_dir).exists(corpus) {
        anyhow::bail!(
            "No cached corpus named '{}'. Run `ragcache build {} <sources>` first.",
            corpus,
            corpus
        );
    }

    let mut pipeline = open_pipeline(config).await?;
    pipeline
        .build_pipeline(&[], corpus, BuildOptions::default())
        .await?;

    let pb = if json {
        None
    } else {
        Some(spinner(format!("{}Thinking...", THINKING))?)
    };
    let result = pipeline
        .ask_with_k(question, k.unwrap_or(config.retrieval.top_k))
        .await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let answer = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("\n{}{}\n", ANSWER, style(question).yellow().bold());
    println!("{}\n", answer.answer);

    if answer.context.is_empty() {
        println!("{}", style("No passages retrieved.").dim());
        return Ok(());
    }

    println!("{}", style("Sources:").bold());
    for (i, passage) in answer.context.iter().enumerate() {
        let chunk = &passage.chunk;
        println!(
            "{} {}. {} {}",
            FILE,
            style(i + 1).dim(),
            style(&passage.source_id).green(),
            style(format!("(chars {}-{})", chunk.start_offset, chunk.end_offset)).dim()
        );
        println!("   Score: {}", style(format!("{:.3}", passage.score)).cyan());

        let preview: String = chunk.text.chars().take(200).collect();
        let preview = preview.replace('\n', " ");
        if chunk.text.chars().count() > 200 {
            println!("   {}...", style(preview).dim());
        } else {
            println!("   {}", style(preview).dim());
        }
    }

    Ok(())
}
