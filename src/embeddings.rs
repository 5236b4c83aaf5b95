use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tokio::sync::RwLock;

/// Source of text embeddings. The engine only depends on this trait, so
/// tests can swap in a deterministic in-memory implementation.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Serialize)]
#[serde(untagged)]
enum OllamaEmbeddingRequest<'a> {
    Single { model: &'a str, input: &'a str },
    Batch { model: &'a str, input: &'a [String] },
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
}

/// Ollama-backed embedder with an LRU cache for repeated question texts.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    ollama_url: String,
    model: String,
    question_cache: RwLock<LruCache<String, Vec<f32>>>,
}

impl OllamaEmbedder {
    pub async fn new() -> Result<Self> {
        let ollama_url =
            std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
        let model = std::env::var("OLLAMA_EMBEDDING_MODEL")
            .unwrap_or_else(|_| "nomic-embed-text".to_string());

        tracing::info!("Ollama URL: {}", ollama_url);
        tracing::info!("Embedding model: {}", model);

        let embedder = Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(600))
                .build()?,
            ollama_url,
            model,
            question_cache: RwLock::new(LruCache::new(NonZeroUsize::new(1000).unwrap())),
        };

        embedder.test_connection().await?;
        embedder.verify_model().await?;

        Ok(embedder)
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    async fn request_single(&self, text: &str) -> Result<Vec<f32>> {
        let request = OllamaEmbeddingRequest::Single {
            model: &self.model,
            input: text,
        };
        let response = self
            .client
            .post(format!("{}/api/embed", self.ollama_url))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Ollama API error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }
        let embedding_response: OllamaEmbeddingResponse = response.json().await?;
        if let Some(embedding) = embedding_response.embedding {
            Ok(embedding)
        } else if let Some(embeddings) = embedding_response.embeddings {
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Empty embeddings array from Ollama"))
        } else {
            Err(anyhow::anyhow!("No embedding returned from Ollama"))
        }
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.ollama_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Cannot connect to Ollama at {}. Make sure Ollama is running.",
                self.ollama_url
            ));
        }

        tracing::info!("Connected to Ollama at {}", self.ollama_url);
        Ok(())
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
                "Model '{}' not found. Available: {:?}. Run: ollama pull {}",
                self.model,
                available,
                self.model
            ));
        }

        tracing::info!("Model '{}' verified", self.model);
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    /// Single-text embedding with an LRU cache in front. Repeat questions
    /// are common in a course setting.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.question_cache.write().await.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self.request_single(text).await?;
        self.question_cache
            .write()
            .await
            .put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        if texts.len() == 1 {
            let embedding = self.request_single(&texts[0]).await?;
            return Ok(vec![embedding]);
        }

        let request = OllamaEmbeddingRequest::Batch {
            model: &self.model,
            input: texts,
        };

        // Hard timeout on top of the client timeout so a stalled Ollama
        // instance cannot hang corpus indexing indefinitely.
        const BATCH_TIMEOUT_SECS: u64 = 600;
        let request_future = self
            .client
            .post(format!("{}/api/embed", self.ollama_url))
            .json(&request)
            .send();

        let response = match tokio::time::timeout(
            tokio::time::Duration::from_secs(BATCH_TIMEOUT_SECS),
            request_future,
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Batch embedding request timed out after {} seconds for {} texts",
                    BATCH_TIMEOUT_SECS,
                    texts.len()
                ))
            }
        };

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Ollama API error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let embedding_response: OllamaEmbeddingResponse = response.json().await?;

        if let Some(embeddings) = embedding_response.embeddings {
            if embeddings.len() == texts.len() {
                return Ok(embeddings);
            }
            tracing::warn!(
                "Batch embedding returned {} embeddings for {} texts, falling back to sequential",
                embeddings.len(),
                texts.len()
            );
        } else if embedding_response.embedding.is_some() {
            tracing::warn!(
                "Model '{}' doesn't support batch embeddings, falling back to sequential",
                self.model
            );
        }

        let mut result = Vec::with_capacity(texts.len());
        for text in texts {
            result.push(self.request_single(text).await?);
        }
        Ok(result)
    }
}
