use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::classifier::{classify_prefiltered, Classification, PreFilter};
use crate::config::TutorConfig;
use crate::documents::load_document_texts;
use crate::embeddings::EmbeddingProvider;
use crate::keywords::build_master_keywords;
use crate::llm::{build_tutor_prompt, GenerationProvider};
use crate::segmenter::{chunk_exercises_by_question, chunk_lectures_by_section, Chunk};

/// How many supporting chunks feed the prompt and the response preview.
const MAX_ANSWER_SOURCES: usize = 5;
const SOURCE_PREVIEW_CHARS: usize = 100;

/// Immutable course corpus: embedded chunks, the keyword vocabulary, and
/// the compiled pre-filter. Built once at startup, shared read-only.
pub struct CourseIndex {
    pub chunks: Vec<Chunk>,
    /// Sorted, deduplicated. Binary-searched per question word.
    pub master_keywords: Vec<String>,
    pub pre_filter: PreFilter,
    pub config: TutorConfig,
}

impl CourseIndex {
    pub fn from_parts(
        chunks: Vec<Chunk>,
        master_keywords: Vec<String>,
        config: TutorConfig,
    ) -> Result<Self> {
        let pre_filter = PreFilter::new(&config)?;
        Ok(Self {
            chunks,
            master_keywords,
            pre_filter,
            config,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A source excerpt attached to a tutor response.
#[derive(Debug, Clone, Serialize)]
pub struct SourcePreview {
    pub chunk_id: String,
    pub document_name: String,
    pub similarity_score: f32,
    pub preview: String,
}

/// Full response for one student question.
#[derive(Debug, Clone, Serialize)]
pub struct TutorResponse {
    pub question: String,
    pub label: String,
    pub confidence: f32,
    pub answer: String,
    pub sources: Vec<SourcePreview>,
}

/// The question-answering pipeline: staged classification plus grounded
/// answer generation over the course corpus.
pub struct TutorEngine {
    index: Arc<CourseIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
}

impl TutorEngine {
    /// Indexes the course corpus: loads documents, segments them, builds
    /// the keyword vocabulary, and embeds every chunk in batches.
    pub async fn build(
        config: TutorConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        let lecture_texts = load_document_texts(&config.lectures_dir)
            .context("Failed to load lecture documents")?;
        let exercise_texts = load_document_texts(&config.exercises_dir)
            .context("Failed to load exercise documents")?;

        let mut chunks = chunk_lectures_by_section(
            &lecture_texts,
            config.chunk_size,
            config.chunk_overlap,
            &config.chunk_separators,
        );
        chunks.extend(chunk_exercises_by_question(
            &exercise_texts,
            config.chunk_size,
            &config.chunk_separators,
        ));

        let master_keywords = build_master_keywords(
            lecture_texts.values().chain(exercise_texts.values()),
            &config,
        );

        tracing::info!(
            lectures = lecture_texts.len(),
            exercises = exercise_texts.len(),
            chunks = chunks.len(),
            keywords = master_keywords.len(),
            "Course corpus segmented"
        );

        embed_chunks(&mut chunks, embedder.as_ref(), &config).await?;

        let index = CourseIndex::from_parts(chunks, master_keywords, config)?;

        Ok(Self {
            index: Arc::new(index),
            embedder,
            generator,
        })
    }

    /// Assembles an engine from a pre-built index. Used by tests.
    pub fn from_index(
        index: CourseIndex,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            index: Arc::new(index),
            embedder,
            generator,
        }
    }

    pub fn index(&self) -> &CourseIndex {
        &self.index
    }

    /// Classifies a question without generating an answer.
    ///
    /// The embedding call is skipped when the pre-filter already decides
    /// the outcome or when the corpus is empty. A failed embedding call
    /// degrades to keyword-only scoring rather than failing the question.
    pub async fn classify_question(&self, question: &str) -> Classification {
        let question = question.trim();

        let matched = self.index.pre_filter.matches(question);
        let skip_embedding = self.index.is_empty() || !matched.is_empty();

        let embedding = if skip_embedding {
            None
        } else {
            match self.embedder.embed(question).await {
                Ok(embedding) => Some(embedding),
                Err(err) => {
                    tracing::warn!("Question embedding failed, scoring keywords only: {err:#}");
                    None
                }
            }
        };

        classify_prefiltered(question, matched, embedding.as_deref(), &self.index)
    }

    /// Classifies the question and, when relevant, generates a grounded
    /// answer. Generation failures degrade to an explanatory message with
    /// the classification and sources intact.
    pub async fn answer_question(&self, question: &str) -> TutorResponse {
        let question = question.trim();
        let classification = self.classify_question(question).await;
        let confidence = classification.confidence();
        let label = classification.label().to_string();

        let (answer, sources) = match &classification {
            Classification::RedirectToLecturer { matched_keywords } => {
                tracing::info!(words = ?matched_keywords, "Redirecting question");
                (self.index.config.redirect_message.clone(), Vec::new())
            }
            Classification::Irrelevant { confidence } => {
                tracing::info!(confidence, "Question judged out of syllabus");
                (self.index.config.irrelevant_message.clone(), Vec::new())
            }
            Classification::Relevant { chunks, .. } => {
                let top = &chunks[..chunks.len().min(MAX_ANSWER_SOURCES)];
                let prompt = build_tutor_prompt(question, top);

                let answer = match self.generator.generate(&prompt).await {
                    Ok(answer) => answer,
                    Err(err) => {
                        tracing::warn!("Answer generation failed: {err:#}");
                        "I found relevant course material for your question but could not \
                         generate an answer right now. Please try again, or consult the \
                         sources listed below."
                            .to_string()
                    }
                };

                let sources = top
                    .iter()
                    .map(|chunk| SourcePreview {
                        chunk_id: chunk.chunk_id.clone(),
                        document_name: chunk.document_name.clone(),
                        similarity_score: chunk.similarity_score,
                        preview: preview_text(&chunk.text, SOURCE_PREVIEW_CHARS),
                    })
                    .collect();

                (answer, sources)
            }
        };

        TutorResponse {
            question: question.to_string(),
            label,
            confidence,
            answer,
            sources,
        }
    }
}

/// Embeds all chunk texts in configured batches with a cooldown between
/// batches, then writes the vectors back onto the chunks.
async fn embed_chunks(
    chunks: &mut [Chunk],
    embedder: &dyn EmbeddingProvider,
    config: &TutorConfig,
) -> Result<()> {
    if chunks.is_empty() {
        return Ok(());
    }

    let batch_size = config.embedding_batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);

    for (batch_index, batch) in chunks.chunks_mut(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("Embedding batch {}/{} failed", batch_index + 1, total_batches))?;

        if embeddings.len() != batch.len() {
            return Err(anyhow::anyhow!(
                "Embedding batch {}/{} returned {} vectors for {} chunks",
                batch_index + 1,
                total_batches,
                embeddings.len(),
                batch.len()
            ));
        }

        for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }

        tracing::info!(
            "Embedded batch {}/{} ({} chunks)",
            batch_index + 1,
            total_batches,
            batch.len()
        );

        if batch_index + 1 < total_batches && config.embedding_batch_cooldown_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(
                config.embedding_batch_cooldown_ms,
            ))
            .await;
        }
    }

    Ok(())
}

/// First `max_chars` characters on a char boundary, with an ellipsis when
/// truncated.
fn preview_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview_text("short", 100), "short");
        let long = "σ".repeat(150);
        let preview = preview_text(&long, 100);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn empty_index_reports_empty() {
        let index =
            CourseIndex::from_parts(vec![], vec![], TutorConfig::default()).unwrap();
        assert!(index.is_empty());
    }
}
