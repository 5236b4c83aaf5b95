use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use crate::config::TutorConfig;
use crate::engine::CourseIndex;
use crate::scorer::{score_question, ScoredChunk};

/// Three-way verdict for an incoming question.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "label", rename_all = "snake_case")]
pub enum Classification {
    /// Administrative or exam-related; must not be answered by the chatbot.
    RedirectToLecturer { matched_keywords: Vec<String> },
    /// On neither the blocked list nor the syllabus.
    Irrelevant { confidence: f32 },
    /// Course-content question the chatbot may answer.
    Relevant {
        confidence: f32,
        chunks: Vec<ScoredChunk>,
    },
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::RedirectToLecturer { .. } => "redirect_to_lecturer",
            Classification::Irrelevant { .. } => "irrelevant",
            Classification::Relevant { .. } => "relevant",
        }
    }

    /// Pre-filter hits are categorical, so they report full confidence.
    pub fn confidence(&self) -> f32 {
        match self {
            Classification::RedirectToLecturer { .. } => 1.0,
            Classification::Irrelevant { confidence } => *confidence,
            Classification::Relevant { confidence, .. } => *confidence,
        }
    }
}

/// Whole-word matcher for administrative and exam vocabulary.
///
/// Each configured word or phrase compiles to a word-bounded, case-insensitive
/// pattern once at startup, so "post" matches "Can you post the slides?" but
/// not "postulate".
#[derive(Debug)]
pub struct PreFilter {
    patterns: Vec<(String, Regex)>,
}

impl PreFilter {
    pub fn new(config: &TutorConfig) -> Result<Self> {
        let mut patterns = Vec::new();
        for word in config.admin_words.iter().chain(config.exam_words.iter()) {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
            let regex = Regex::new(&pattern)
                .with_context(|| format!("Invalid pre-filter word {:?}", word))?;
            patterns.push((word.clone(), regex));
        }
        Ok(Self { patterns })
    }

    /// All configured words present in the question, in configuration order.
    pub fn matches(&self, question: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(question))
            .map(|(word, _)| word.clone())
            .collect()
    }
}

/// Staged classification: pre-filter first, hybrid relevance second.
///
/// `question_embedding` is `None` when the caller skipped the embedding
/// call (pre-filter hit detected up front, or empty corpus); the semantic
/// signal then contributes nothing.
pub fn classify(
    question: &str,
    question_embedding: Option<&[f32]>,
    index: &CourseIndex,
) -> Classification {
    let matched = index.pre_filter.matches(question);
    classify_prefiltered(question, matched, question_embedding, index)
}

/// `classify` with the pre-filter matches already computed, for callers
/// that ran the pre-filter themselves (the engine checks it before
/// deciding whether to embed the question).
pub fn classify_prefiltered(
    question: &str,
    matched_keywords: Vec<String>,
    question_embedding: Option<&[f32]>,
    index: &CourseIndex,
) -> Classification {
    if !matched_keywords.is_empty() {
        tracing::info!(words = ?matched_keywords, "Question blocked by pre-filter");
        return Classification::RedirectToLecturer { matched_keywords };
    }

    let outcome = score_question(question, question_embedding, index);
    if outcome.is_relevant {
        Classification::Relevant {
            confidence: outcome.confidence,
            chunks: outcome.relevant_chunks,
        }
    } else {
        Classification::Irrelevant {
            confidence: outcome.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CourseIndex;

    fn index() -> CourseIndex {
        CourseIndex::from_parts(vec![], vec![], TutorConfig::default()).unwrap()
    }

    #[test]
    fn admin_word_redirects_at_full_confidence() {
        let index = index();
        let result = classify("When is the deadline for the coursework?", None, &index);
        match &result {
            Classification::RedirectToLecturer { matched_keywords } => {
                assert!(matched_keywords.contains(&"deadline".to_string()));
            }
            other => panic!("expected redirect, got {:?}", other),
        }
        assert_eq!(result.confidence(), 1.0);
        assert_eq!(result.label(), "redirect_to_lecturer");
    }

    #[test]
    fn exam_phrase_matches_case_insensitively() {
        let index = index();
        let result = classify("Is there a FORMULA SHEET in the exam?", None, &index);
        match result {
            Classification::RedirectToLecturer { matched_keywords } => {
                assert!(matched_keywords.contains(&"formula sheet".to_string()));
                assert!(matched_keywords.contains(&"exam".to_string()));
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn whole_word_only_no_substring_hits() {
        let filter = PreFilter::new(&TutorConfig::default()).unwrap();
        assert!(filter.matches("a postulate about reported tasks").is_empty());
        assert_eq!(filter.matches("can you post it"), vec!["post"]);
    }

    #[test]
    fn unmatched_question_without_signal_is_irrelevant() {
        let index = index();
        let result = classify("What is the best pizza topping?", None, &index);
        match result {
            Classification::Irrelevant { confidence } => assert_eq!(confidence, 0.0),
            other => panic!("expected irrelevant, got {:?}", other),
        }
    }

    #[test]
    fn keyword_only_signal_stays_below_threshold() {
        let master: Vec<String> = {
            let mut v: Vec<String> = ["autocorrelation", "differencing", "forecasting",
                "seasonality", "stationarity"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            v.sort();
            v
        };
        let index = CourseIndex::from_parts(vec![], master, TutorConfig::default()).unwrap();

        // 5 keyword hits saturate the keyword signal but 0.15 alone is below
        // the 0.25 threshold, so pure keyword matches stay irrelevant.
        let result = classify(
            "stationarity differencing seasonality forecasting autocorrelation",
            None,
            &index,
        );
        assert_eq!(result.label(), "irrelevant");
        assert!((result.confidence() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn precomputed_matches_agree_with_full_classify() {
        let index = index();
        let question = "When is the deadline?";
        let matched = index.pre_filter.matches(question);

        let from_full = classify(question, None, &index);
        let from_precomputed = classify_prefiltered(question, matched, None, &index);
        assert_eq!(from_full.label(), from_precomputed.label());
        assert_eq!(from_full.confidence(), from_precomputed.confidence());

        // An empty precomputed list falls through to relevance scoring.
        let fallthrough =
            classify_prefiltered("what is a random walk?", Vec::new(), None, &index);
        assert_eq!(fallthrough.label(), "irrelevant");
    }

    #[test]
    fn classification_is_deterministic() {
        let index = index();
        let a = classify("When is the exam?", None, &index);
        let b = classify("When is the exam?", None, &index);
        assert_eq!(a.label(), b.label());
        assert_eq!(a.confidence(), b.confidence());
    }

    #[test]
    fn serializes_with_tagged_label() {
        let c = Classification::Irrelevant { confidence: 0.1 };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["label"], "irrelevant");
    }
}
