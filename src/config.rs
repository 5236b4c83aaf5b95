use std::path::PathBuf;

// Keyword-extraction defaults tuned on the course corpus.
const DEFAULT_MIN_KEYWORD_SCORE: f32 = 0.025;
const DEFAULT_MIN_KEYWORD_LENGTH: usize = 3;

const DEFAULT_CHUNK_SIZE: usize = 1500;
const DEFAULT_CHUNK_OVERLAP: usize = 200;

const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.50;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_KEYWORD_WEIGHT: f32 = 0.15;

/// Single-letter math variables, subscripted forms, and filler terms that
/// survive tokenization but carry no topical signal.
const DEFAULT_MATH_NOISE: &[&str] = &[
    "u", "v", "t", "x", "y", "z", "o", "p", "q", "n", "k", "m", "r", "s", "h", "e", "w", "c", "a",
    "b", "d", "f", "g", "i", "j", "l", "pt", "yt", "ut", "xt", "zt", "p_t", "y_t", "u_t", "x_t",
    "z_t", "vt", "v_t", "exp", "variance", "squared", "zero", "sqrt", "rnorm", "norm",
];

const GREEK_CHARS: &[char] = &[
    'σ', 'μ', 'α', 'β', 'ε', 'γ', 'ω', 'θ', 'λ', 'ρ', 'π', 'δ', 'φ',
];

/// Administrative topics the chatbot must not answer.
const DEFAULT_ADMIN_WORDS: &[&str] = &[
    "upload",
    "recording",
    "recordings",
    "deadline",
    "post",
    "provide",
    "provided",
    "office hours",
];

/// Exam and assessment topics the chatbot must not answer.
const DEFAULT_EXAM_WORDS: &[&str] = &[
    "examinable",
    "examined",
    "memorise",
    "memorize",
    "memorisation",
    "memorization",
    "recite",
    "remember",
    "required",
    "grasp",
    "expected to",
    "tested",
    "statistical tables",
    "marks",
    "difficulty",
    "assessed",
    "formula sheet",
    "calculator",
    "ipac",
    "exam",
    "submit",
    "report",
    "csv",
    "r script",
    "r code",
    "ica",
    "submission",
    "task",
];

const DEFAULT_REDIRECT_MESSAGE: &str =
    "Please redirect questions regarding the exam or administrative matters to the forum.";
const DEFAULT_IRRELEVANT_MESSAGE: &str = "This question is likely out of syllabus. If you think \
     that is wrong, please rephrase your question and ask again, or submit it to the forum.";

/// Runtime configuration for the tutor pipeline.
///
/// Every knob can be overridden through environment variables without code
/// changes; `from_env` applies validated overrides on top of the defaults.
#[derive(Debug, Clone)]
pub struct TutorConfig {
    pub lectures_dir: PathBuf,
    pub exercises_dir: PathBuf,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Separator preference order for the length-bounded sub-splitter.
    pub chunk_separators: Vec<String>,

    /// Minimum cosine similarity for a chunk to be reported as relevant.
    pub similarity_threshold: f32,
    /// Acceptance threshold on the final hybrid confidence.
    pub confidence_threshold: f32,
    /// Weight of the keyword signal in the hybrid confidence; the semantic
    /// signal carries the remaining `1 - keyword_weight`.
    pub keyword_weight: f32,

    pub min_keyword_score: f32,
    pub min_keyword_length: usize,
    pub math_noise: Vec<String>,

    pub admin_words: Vec<String>,
    pub exam_words: Vec<String>,

    pub redirect_message: String,
    pub irrelevant_message: String,

    pub embedding_batch_size: usize,
    pub embedding_batch_cooldown_ms: u64,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            lectures_dir: PathBuf::from("./data/lectures"),
            exercises_dir: PathBuf::from("./data/exercises"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            chunk_separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            min_keyword_score: DEFAULT_MIN_KEYWORD_SCORE,
            min_keyword_length: DEFAULT_MIN_KEYWORD_LENGTH,
            math_noise: DEFAULT_MATH_NOISE.iter().map(|s| s.to_string()).collect(),
            admin_words: DEFAULT_ADMIN_WORDS.iter().map(|s| s.to_string()).collect(),
            exam_words: DEFAULT_EXAM_WORDS.iter().map(|s| s.to_string()).collect(),
            redirect_message: DEFAULT_REDIRECT_MESSAGE.to_string(),
            irrelevant_message: DEFAULT_IRRELEVANT_MESSAGE.to_string(),
            embedding_batch_size: 32,
            embedding_batch_cooldown_ms: 500,
        }
    }
}

impl TutorConfig {
    /// Builds a config from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("TUTOR_LECTURES_DIR") {
            config.lectures_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("TUTOR_EXERCISES_DIR") {
            config.exercises_dir = PathBuf::from(dir);
        }

        config.chunk_size = env_usize("TUTOR_CHUNK_SIZE", config.chunk_size);
        config.chunk_overlap = env_usize("TUTOR_CHUNK_OVERLAP", config.chunk_overlap);

        config.similarity_threshold =
            env_weight("TUTOR_SIMILARITY_THRESHOLD", config.similarity_threshold);
        config.confidence_threshold =
            env_weight("TUTOR_CONFIDENCE_THRESHOLD", config.confidence_threshold);
        config.keyword_weight = env_weight("TUTOR_KEYWORD_WEIGHT", config.keyword_weight);

        config.min_keyword_score = env_weight("TUTOR_MIN_KEYWORD_SCORE", config.min_keyword_score);
        config.min_keyword_length =
            env_usize("TUTOR_MIN_KEYWORD_LENGTH", config.min_keyword_length);

        if let Some(words) = env_word_list("TUTOR_MATH_NOISE") {
            config.math_noise = words;
        }
        if let Some(words) = env_word_list("TUTOR_ADMIN_WORDS") {
            config.admin_words = words;
        }
        if let Some(words) = env_word_list("TUTOR_EXAM_WORDS") {
            config.exam_words = words;
        }

        if let Ok(message) = std::env::var("TUTOR_REDIRECT_MESSAGE") {
            config.redirect_message = message;
        }
        if let Ok(message) = std::env::var("TUTOR_IRRELEVANT_MESSAGE") {
            config.irrelevant_message = message;
        }

        config.embedding_batch_size =
            env_usize("EMBEDDING_BATCH_SIZE", config.embedding_batch_size).max(1);
        config.embedding_batch_cooldown_ms = env_u64(
            "EMBEDDING_BATCH_COOLDOWN_MS",
            config.embedding_batch_cooldown_ms,
        );

        config
    }

    /// True when the term contains a Greek character used in course notation.
    pub fn has_greek_char(term: &str) -> bool {
        term.chars().any(|c| GREEK_CHARS.contains(&c))
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parse a weight-like value with validation for finite values in [0.0, 1.0].
fn env_weight(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .filter(|w| w.is_finite() && (0.0..=1.0).contains(w))
        .unwrap_or(default)
}

/// Comma-separated word list from an environment variable.
/// Returns None when the variable is unset or contains no usable entries.
fn env_word_list(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let words: Vec<String> = raw
        .split(',')
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_tuned_values() {
        let config = TutorConfig::default();
        assert_eq!(config.chunk_size, 1500);
        assert_eq!(config.chunk_overlap, 200);
        assert!((config.keyword_weight - 0.15).abs() < f32::EPSILON);
        assert!((config.confidence_threshold - 0.25).abs() < f32::EPSILON);
        assert!((config.similarity_threshold - 0.50).abs() < f32::EPSILON);
    }

    #[test]
    fn greek_detection() {
        assert!(TutorConfig::has_greek_char("σ2"));
        assert!(TutorConfig::has_greek_char("beta_β"));
        assert!(!TutorConfig::has_greek_char("variance"));
    }

    #[test]
    fn env_weight_rejects_out_of_range() {
        std::env::set_var("TUTOR_TEST_WEIGHT_A", "1.5");
        assert_eq!(env_weight("TUTOR_TEST_WEIGHT_A", 0.3), 0.3);
        std::env::set_var("TUTOR_TEST_WEIGHT_A", "0.4");
        assert_eq!(env_weight("TUTOR_TEST_WEIGHT_A", 0.3), 0.4);
        std::env::remove_var("TUTOR_TEST_WEIGHT_A");
    }

    #[test]
    fn word_list_parsing_trims_and_lowercases() {
        std::env::set_var("TUTOR_TEST_WORDS", "Deadline, office hours ,EXAM");
        let words = env_word_list("TUTOR_TEST_WORDS").unwrap();
        assert_eq!(words, vec!["deadline", "office hours", "exam"]);
        std::env::remove_var("TUTOR_TEST_WORDS");
    }
}
