use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::scorer::ScoredChunk;

/// Answer generator. Behind a trait so the pipeline can run with a stub
/// generator in tests.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Deserialize, Debug)]
struct OllamaGenerateResponse {
    response: String,
}

/// Ollama-backed tutoring answer generator.
pub struct OllamaGenerator {
    client: reqwest::Client,
    ollama_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Configured via `OLLAMA_URL` and `OLLAMA_GENERATION_MODEL`
    /// (default `llama3.1`). Validates the connection and model on startup.
    pub async fn new() -> Result<Self> {
        let ollama_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
        let model =
            std::env::var("OLLAMA_GENERATION_MODEL").unwrap_or_else(|_| "llama3.1".to_string());

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(300)))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        let generator = Self {
            client,
            ollama_url,
            model,
        };

        generator.verify_model().await?;

        Ok(generator)
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn verify_model(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.ollama_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Failed to list models from Ollama: {} - {}",
                status,
                body
            ));
        }

        let tags: serde_json::Value = response.json().await?;
        let models = tags["models"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Cannot list models"))?;

        let exists = models
            .iter()
            .any(|m| m["name"].as_str().unwrap_or("").starts_with(&self.model));

        if !exists {
            let available: Vec<_> = models.iter().filter_map(|m| m["name"].as_str()).collect();
            return Err(anyhow::anyhow!(
                "Generation model '{}' not found. Available: {:?}. Run: ollama pull {}",
                self.model,
                available,
                self.model
            ));
        }

        tracing::info!("Generation model '{}' verified", self.model);
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(0.3),
                top_p: Some(0.9),
                num_predict: Some(2048),
            }),
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.ollama_url))
            .json(&request)
            .send()
            .await
            .context("Failed to contact Ollama generator")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Generator API error: {} - {}", status, body));
        }

        let payload: OllamaGenerateResponse = response
            .json()
            .await
            .context("Failed to parse generator response")?;

        Ok(payload.response.trim().to_string())
    }
}

/// Builds the tutoring prompt from the question and its supporting chunks.
///
/// Context is limited to the top chunks by similarity; the caller passes
/// them pre-sorted. The instructions push the model toward guided
/// explanation over handing out exercise solutions.
pub fn build_tutor_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let mut context = String::new();
    for chunk in chunks {
        context.push_str(&format!("[Source: {}]\n{}\n\n", chunk.document_name, chunk.text));
    }

    format!(
        "You are a teaching assistant for a university course. Answer the student's \
         question using only the course material below.\n\n\
         Course material:\n{context}\
         Guidelines:\n\
         - Base your answer on the course material; if it does not cover the question, say so.\n\
         - For exercise questions, explain the approach and the relevant concepts rather than \
         writing out the full solution.\n\
         - Use the same notation as the course material.\n\n\
         Student question: {question}\n\n\
         Answer:"
    )
}
