use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use crate::config::TutorConfig;

/// English stopwords excluded from keyword extraction and question matching.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "also", "although",
    "always", "am", "among", "amongst", "an", "and", "another", "any", "anyhow", "anyone",
    "anything", "anywhere", "are", "around", "as", "at", "back", "be", "became", "because",
    "become", "becomes", "been", "before", "behind", "being", "below", "beside", "besides",
    "between", "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do", "does",
    "doing", "down", "during", "each", "either", "else", "elsewhere", "enough", "etc", "even",
    "ever", "every", "everyone", "everything", "everywhere", "few", "find", "first", "for",
    "former", "from", "further", "get", "give", "go", "had", "has", "have", "having", "he",
    "hence", "her", "here", "hereby", "herein", "hers", "herself", "him", "himself", "his",
    "how", "however", "i", "ie", "if", "in", "indeed", "instead", "into", "is", "it", "its",
    "itself", "just", "last", "latter", "least", "less", "may", "me", "meanwhile", "might",
    "mine", "more", "moreover", "most", "mostly", "much", "must", "my", "myself", "namely",
    "neither", "never", "nevertheless", "next", "no", "nobody", "none", "nor", "not", "nothing",
    "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or", "other",
    "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps",
    "please", "rather", "re", "same", "see", "seem", "seemed", "seeming", "seems", "several",
    "she", "should", "since", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "thence", "there", "thereafter", "thereby", "therefore", "therein",
    "thereupon", "these", "they", "this", "those", "though", "through", "throughout", "thus",
    "to", "together", "too", "toward", "towards", "under", "until", "up", "upon", "us", "very",
    "via", "was", "we", "well", "were", "what", "whatever", "when", "whence", "whenever",
    "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever", "whether",
    "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why", "will",
    "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

pub fn is_stopword(word: &str) -> bool {
    stopword_set().contains(word)
}

/// Word tokens of at least two characters, lower-cased. Underscores are kept
/// so that subscripted math tokens can be filtered out downstream.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|token| token.chars().count() >= 2)
        .map(|token| token.to_lowercase())
        .collect()
}

/// Extracts significant terms from a single document.
///
/// Importance is term frequency over unigrams, bigrams, and trigrams built
/// from the stopword-filtered token stream, L2-normalized within the
/// document. Scoring one document at a time is deliberate: a term salient
/// to an individual lecture keeps its weight even when it is common across
/// the whole course. Returns `(term, score)` pairs sorted by descending
/// score.
pub fn extract_keywords(text: &str, config: &TutorConfig) -> Vec<(String, f32)> {
    let tokens: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|token| !is_stopword(token))
        .collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for n in 1..=3usize {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            *counts.entry(window.join(" ")).or_insert(0) += 1;
        }
    }

    let norm = counts
        .values()
        .map(|&c| (c * c) as f32)
        .sum::<f32>()
        .sqrt()
        .max(f32::EPSILON);

    let mut keywords: Vec<(String, f32)> = counts
        .into_iter()
        .map(|(term, count)| (term, count as f32 / norm))
        .filter(|(term, score)| !is_noise(term, *score, config))
        .collect();

    keywords.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    keywords
}

fn is_noise(term: &str, score: f32, config: &TutorConfig) -> bool {
    score < config.min_keyword_score
        || term.chars().count() < config.min_keyword_length
        || config.math_noise.iter().any(|noise| noise == term)
        || TutorConfig::has_greek_char(term)
        || term.chars().any(|c| c.is_ascii_digit())
        || term.contains('_')
}

/// Unions per-document keywords into one sorted, deduplicated vocabulary.
pub fn build_master_keywords<'a, I>(texts: I, config: &TutorConfig) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut master: BTreeSet<String> = BTreeSet::new();
    for text in texts {
        master.extend(extract_keywords(text, config).into_iter().map(|(term, _)| term));
    }
    let keywords: Vec<String> = master.into_iter().collect();
    tracing::info!("Master keyword vocabulary: {} terms", keywords.len());
    keywords
}

/// Question words found in the master vocabulary, excluding stopwords.
///
/// Words are lower-cased, stripped of surrounding punctuation, and counted
/// once each. `master_keywords` must be sorted (it is, by construction).
pub fn find_question_keywords(question: &str, master_keywords: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut found = Vec::new();

    for raw in question.to_lowercase().split_whitespace() {
        let word = raw.trim_matches(|c: char| c.is_ascii_punctuation());
        if word.is_empty() || is_stopword(word) || !seen.insert(word.to_string()) {
            continue;
        }
        if master_keywords.binary_search_by(|k| k.as_str().cmp(word)).is_ok() {
            found.push(word.to_string());
        }
    }

    found
}
