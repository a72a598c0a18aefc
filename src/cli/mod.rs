mod args;
mod ask;
mod build;
mod corpus;

pub use args::{Args, Command};
pub use ask::run_ask;
pub use build::run_build;
pub use corpus::{run_clear, run_info, run_list};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::rag::{create_embedder, create_generator, Embedder, Generator, PipelineManager};

/// Wire the configured providers into a fresh pipeline.
async fn open_pipeline(config: &RagConfig) -> Result<PipelineManager> {
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
    embedder
        .health_check()
        .await
        .with_context(|| format!("embedding provider '{}' is unavailable", config.embedding.provider))?;

    let generator: Arc<dyn Generator> = Arc::from(create_generator(&config.generation)?);

    Ok(PipelineManager::from_config(config, embedder, generator)?)
}

fn spinner(message: String) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
