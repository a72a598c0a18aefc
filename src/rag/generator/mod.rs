mod ollama;

pub use ollama::OllamaGenerator;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Answer-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, question: &str, context: &[String]) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            endpoint: None,
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

pub fn create_generator(config: &GeneratorConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => {
            let endpoint = config
                .endpoint
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Box::new(OllamaGenerator::new(
                &endpoint,
                &config.model,
                config.temperature,
                config.max_tokens,
            )?))
        }
        other => Err(anyhow!("Unknown generation provider '{}'", other)),
    }
}

/// Numbered passages followed by the question.
pub fn build_prompt(question: &str, context: &[String]) -> String {
    let mut prompt = String::from(
        "Answer the question using only the context passages below. \
         If the passages do not contain the answer, say so.\n\nContext:\n",
    );

    if context.is_empty() {
        prompt.push_str("(no passages retrieved)\n");
    }
    for (i, passage) in context.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, passage.trim()));
    }

    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", question.trim()));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_numbers_passages_in_order() {
        let context = vec!["first passage ".to_string(), "second passage".to_string()];
        let prompt = build_prompt("What is first?", &context);

        let first = prompt.find("[1] first passage\n").unwrap();
        let second = prompt.find("[2] second passage\n").unwrap();
        assert!(first < second);
        assert!(prompt.ends_with("Question: What is first?\nAnswer:"));
    }

    #[test]
    fn test_prompt_without_context() {
        let prompt = build_prompt("anything?", &[]);
        assert!(prompt.contains("(no passages retrieved)"));
    }

    #[test]
    fn test_unknown_provider() {
        let config = GeneratorConfig {
            provider: "carrier-pigeon".to_string(),
            ..GeneratorConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
