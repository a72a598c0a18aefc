use anyhow::Result;
use console::{style, Emoji};

use crate::config::RagConfig;
use crate::rag::{CorpusInfo, PersistenceManager};

static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "");

pub fn run_info(config: &RagConfig, corpus: &str, json: bool) -> Result<()> {
    let store = PersistenceManager::new(&config.cache_dir);

    let Some(bundle) = store.load(corpus)? else {
        if json {
            println!("null");
            return Ok(());
        }
        println!("{}No cached corpus named '{}'.", INFO, corpus);
        println!("Run `ragcache build {} <sources>` to create it.", corpus);
        return Ok(());
    };
    let info = CorpusInfo::from(&bundle.metadata);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("\n{}Corpus: {}\n", INFO, style(&info.corpus_name).green().bold());
    println!("  Chunks:          {}", style(info.chunk_count).cyan());
    println!(
        "  Chunking:        {} chars, {} overlap",
        info.chunk_size, info.chunk_overlap
    );
    println!(
        "  Model:           {} ({} dims)",
        info.embedding_model, info.embedding_dim
    );
    println!("  Metric:          {}", info.metric);
    println!(
        "  Size on disk:    {} KB",
        style(store.disk_usage(corpus)? / 1024).yellow()
    );
    println!(
        "  Built:           {}",
        style(info.built_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    println!("  Sources ({}):", info.sources.len());
    for source in &info.sources {
        println!("    - {}", source);
    }

    Ok(())
}

pub fn run_list(config: &RagConfig) -> Result<()> {
    let store = PersistenceManager::new(&config.cache_dir);
    let corpora = store.list()?;

    if corpora.is_empty() {
        println!(
            "{}No cached corpora in {}",
            INFO,
            config.cache_dir.display()
        );
        return Ok(());
    }

    println!(
        "\n{}Cached corpora in {}:\n",
        INFO,
        style(config.cache_dir.display()).dim()
    );
    for corpus in corpora {
        println!(
            "  {} {}",
            style(&corpus).green(),
            style(format!("({} KB)", store.disk_usage(&corpus)? / 1024)).dim()
        );
    }

    Ok(())
}

pub fn run_clear(config: &RagConfig, corpus: &str) -> Result<()> {
    let store = PersistenceManager::new(&config.cache_dir);

    if store.remove(corpus)? {
        println!("{}Corpus '{}' cleared.", SUCCESS, corpus);
    } else {
        println!("{}No cached corpus named '{}'.", INFO, corpus);
    }

    Ok(())
}
