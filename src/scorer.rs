use serde::Serialize;

use crate::engine::CourseIndex;
use crate::keywords::find_question_keywords;
use crate::references::{extract_document_references, match_references_to_chunks};

/// A chunk selected as relevant to a question, with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_name: String,
    pub chunk_index: usize,
    pub similarity_score: f32,
    pub text: String,
    /// True when the chunk was selected by an explicit reference rather
    /// than by embedding similarity.
    pub from_reference: bool,
}

/// The hybrid scorer's verdict for one question.
#[derive(Debug, Clone)]
pub struct RelevanceOutcome {
    pub relevant_chunks: Vec<ScoredChunk>,
    pub top_similarity: f32,
    pub keywords_found: Vec<String>,
    /// Weighted blend of the keyword and semantic signals.
    pub confidence: f32,
    pub is_relevant: bool,
}

/// Scores a question against the embedded chunk collection.
///
/// An explicit reference short-circuits semantic ranking: the resolved
/// chunks are returned with similarity 1.0 and nothing outside the resolved
/// set appears. Otherwise every chunk at or above the similarity threshold
/// is included. The final confidence blends the keyword signal (matched
/// vocabulary words, capped) with the top similarity using the configured
/// keyword weight.
pub fn score_question(
    question: &str,
    question_embedding: Option<&[f32]>,
    index: &CourseIndex,
) -> RelevanceOutcome {
    let config = &index.config;

    let keywords_found = find_question_keywords(question, &index.master_keywords);
    let keyword_signal = (keywords_found.len() as f32 / 5.0).min(1.0);

    let references = extract_document_references(question);
    let referenced_ids = match_references_to_chunks(&references, &index.chunks);

    let mut relevant_chunks: Vec<ScoredChunk> = Vec::new();

    if !referenced_ids.is_empty() {
        for chunk in &index.chunks {
            if referenced_ids.contains(&chunk.chunk_id) {
                relevant_chunks.push(ScoredChunk {
                    chunk_id: chunk.chunk_id.clone(),
                    document_name: chunk.document_name.clone(),
                    chunk_index: chunk.chunk_index,
                    similarity_score: 1.0,
                    text: chunk.text.clone(),
                    from_reference: true,
                });
            }
        }
    } else if let Some(question_embedding) = question_embedding {
        for chunk in &index.chunks {
            let similarity = cosine_similarity(question_embedding, &chunk.embedding);
            if similarity >= config.similarity_threshold {
                relevant_chunks.push(ScoredChunk {
                    chunk_id: chunk.chunk_id.clone(),
                    document_name: chunk.document_name.clone(),
                    chunk_index: chunk.chunk_index,
                    similarity_score: similarity,
                    text: chunk.text.clone(),
                    from_reference: false,
                });
            }
        }
    }

    // Stable sort: ties keep original chunk order.
    relevant_chunks.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let top_similarity = relevant_chunks
        .first()
        .map(|c| c.similarity_score)
        .unwrap_or(0.0);

    let confidence =
        config.keyword_weight * keyword_signal + (1.0 - config.keyword_weight) * top_similarity;

    tracing::debug!(
        keywords = keywords_found.len(),
        top_similarity,
        confidence,
        referenced = !referenced_ids.is_empty(),
        "Hybrid relevance scored"
    );

    RelevanceOutcome {
        is_relevant: confidence >= config.confidence_threshold,
        relevant_chunks,
        top_similarity,
        keywords_found,
        confidence,
    }
}

/// Cosine similarity in [-1, 1]; 0.0 for mismatched lengths or near-zero
/// norms (prevents division instability).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    const EPSILON: f32 = 1e-10;

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a < EPSILON || norm_b < EPSILON {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TutorConfig;
    use crate::documents::DocumentType;
    use crate::engine::CourseIndex;
    use crate::segmenter::Chunk;

    fn chunk(id: &str, doc: &str, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            document_name: doc.to_string(),
            document_type: DocumentType::Lecture,
            chunk_index: 0,
            section_title: "Preamble".to_string(),
            question_num: None,
            parts: Vec::new(),
            text: text.to_string(),
            char_length: text.chars().count(),
            embedding,
        }
    }

    fn index_with(chunks: Vec<Chunk>, master_keywords: Vec<String>, config: TutorConfig) -> CourseIndex {
        CourseIndex::from_parts(chunks, master_keywords, config).unwrap()
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn semantic_pass_honors_similarity_threshold() {
        let chunks = vec![
            chunk("Lecture 1.txt_0", "Lecture 1.txt", "close", vec![1.0, 0.0]),
            chunk("Lecture 1.txt_1", "Lecture 1.txt", "far", vec![0.0, 1.0]),
        ];
        let index = index_with(chunks, vec![], TutorConfig::default());

        let outcome = score_question("anything", Some(&[1.0, 0.0]), &index);
        assert_eq!(outcome.relevant_chunks.len(), 1);
        assert_eq!(outcome.relevant_chunks[0].chunk_id, "Lecture 1.txt_0");
        assert!((outcome.top_similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reference_override_assigns_unit_similarity_and_excludes_others() {
        let chunks = vec![
            chunk("Lecture 3.txt_0", "Lecture 3.txt", "referenced", vec![0.0, 1.0]),
            chunk("Lecture 9.txt_0", "Lecture 9.txt", "semantically close", vec![1.0, 0.0]),
        ];
        let index = index_with(chunks, vec![], TutorConfig::default());

        // The question embedding points at the *other* chunk; the explicit
        // reference must win anyway.
        let outcome = score_question("lecture 3", Some(&[1.0, 0.0]), &index);

        assert_eq!(outcome.relevant_chunks.len(), 1);
        let selected = &outcome.relevant_chunks[0];
        assert_eq!(selected.chunk_id, "Lecture 3.txt_0");
        assert_eq!(selected.similarity_score, 1.0);
        assert!(selected.from_reference);
        assert!(outcome
            .relevant_chunks
            .iter()
            .all(|c| c.similarity_score == 1.0));
    }

    #[test]
    fn results_sorted_descending_with_stable_ties() {
        let chunks = vec![
            chunk("Lecture 1.txt_0", "Lecture 1.txt", "first tie", vec![1.0, 1.0]),
            chunk("Lecture 1.txt_1", "Lecture 1.txt", "second tie", vec![1.0, 1.0]),
            chunk("Lecture 1.txt_2", "Lecture 1.txt", "exact", vec![1.0, 0.0]),
        ];
        let mut config = TutorConfig::default();
        config.similarity_threshold = 0.0;
        let index = index_with(chunks, vec![], config);

        let outcome = score_question("anything", Some(&[1.0, 0.0]), &index);
        let ids: Vec<&str> = outcome
            .relevant_chunks
            .iter()
            .map(|c| c.chunk_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["Lecture 1.txt_2", "Lecture 1.txt_0", "Lecture 1.txt_1"]
        );
    }

    #[test]
    fn confidence_blends_keyword_and_semantic_signals() {
        let chunks = vec![chunk("Lecture 1.txt_0", "Lecture 1.txt", "text", vec![1.0, 0.0])];
        let master = vec!["stationarity".to_string(), "variance".to_string()];
        let index = index_with(chunks, master, TutorConfig::default());

        let outcome = score_question("stationarity variance", Some(&[1.0, 0.0]), &index);
        // keyword signal = 2/5, top similarity = 1.0, weight = 0.15
        let expected = 0.15 * (2.0 / 5.0) + 0.85 * 1.0;
        assert!((outcome.confidence - expected).abs() < 1e-6);
        assert_eq!(outcome.keywords_found.len(), 2);
    }

    #[test]
    fn keyword_signal_caps_at_one() {
        let master: Vec<String> = ["alpha1x", "bravo", "charlie", "delta", "echo", "foxtrot"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut sorted = master.clone();
        sorted.sort();
        let index = index_with(vec![], sorted, TutorConfig::default());

        let outcome = score_question("alpha1x bravo charlie delta echo foxtrot", None, &index);
        // six matches, signal capped at 1.0
        assert!((outcome.confidence - 0.15).abs() < 1e-6);
    }

    #[test]
    fn monotonic_in_keyword_weight() {
        // keyword_signal > top_similarity: higher weight, higher confidence
        let master = vec!["stationarity".to_string()];
        let mut low = TutorConfig::default();
        low.keyword_weight = 0.10;
        let mut high = TutorConfig::default();
        high.keyword_weight = 0.60;

        let question = "stationarity";
        let outcome_low = score_question(question, None, &index_with(vec![], master.clone(), low));
        let outcome_high = score_question(question, None, &index_with(vec![], master.clone(), high));
        assert!(outcome_high.confidence > outcome_low.confidence);

        // keyword_signal < top_similarity: higher weight, lower confidence
        let chunks = vec![chunk("Lecture 1.txt_0", "Lecture 1.txt", "text", vec![1.0, 0.0])];
        let mut low = TutorConfig::default();
        low.keyword_weight = 0.10;
        let mut high = TutorConfig::default();
        high.keyword_weight = 0.60;
        let embedding = [1.0, 0.0];
        let outcome_low = score_question("unrelated", Some(&embedding), &index_with(chunks.clone(), vec![], low));
        let outcome_high = score_question("unrelated", Some(&embedding), &index_with(chunks, vec![], high));
        assert!(outcome_high.confidence < outcome_low.confidence);
    }

    #[test]
    fn empty_corpus_scores_zero() {
        let index = index_with(vec![], vec![], TutorConfig::default());
        let outcome = score_question("what is stationarity?", None, &index);
        assert!(outcome.relevant_chunks.is_empty());
        assert_eq!(outcome.confidence, 0.0);
        assert!(!outcome.is_relevant);
    }
}
