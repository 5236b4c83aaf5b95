use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::documents::DocumentType;
use crate::segmenter::Chunk;

/// Explicit structural references extracted from one question.
///
/// Lecture and week references are `(number, optional example)` pairs.
/// Exercise references carry the flat set of exercise numbers plus a map
/// from `(exercise, optional question)` to the requested part labels.
/// References are ephemeral: recomputed per question, never stored.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentReferences {
    pub lectures: HashSet<(u32, Option<u32>)>,
    pub weeks: HashSet<(u32, Option<u32>)>,
    pub exercises: HashSet<u32>,
    pub exercise_parts: HashMap<(u32, Option<u32>), HashSet<String>>,
}

impl DocumentReferences {
    pub fn is_empty(&self) -> bool {
        self.lectures.is_empty() && self.weeks.is_empty() && self.exercises.is_empty()
    }
}

/// Compiled patterns for one reference keyword ("lecture" or "week").
/// Evaluated in a fixed order: compound forms first (with consumed-number
/// tracking), then ranges, then bare singles.
struct NumberedPatterns {
    compound: Regex,
    compound_reversed: Regex,
    ranges: Vec<Regex>,
    single: Regex,
}

impl NumberedPatterns {
    fn compile(keyword: &str) -> Self {
        let range_forms = [
            format!(r"(?i){0}s?\s+(\d+)\s*-\s*(\d+)", keyword),
            format!(r"(?i){0}s?\s+(\d+)\s+(?:and|&)\s+(\d+)", keyword),
            format!(r"(?i){0}s?\s+(\d+)\s+to\s+(\d+)", keyword),
        ];
        Self {
            compound: Regex::new(&format!(
                r"(?i){0}s?\s+(\d+)\s+examples?\s+(\d+)(?:\([a-z]\))?",
                keyword
            ))
            .expect("valid compound reference pattern"),
            compound_reversed: Regex::new(&format!(
                r"(?i)examples?\s+(\d+).*?{0}s?\s+(\d+)",
                keyword
            ))
            .expect("valid reversed compound reference pattern"),
            ranges: range_forms
                .iter()
                .map(|p| Regex::new(p).expect("valid range reference pattern"))
                .collect(),
            single: Regex::new(&format!(r"(?i){0}\s+(\d+)", keyword))
                .expect("valid single reference pattern"),
        }
    }

    /// Extraction with the shared precedence policy: a number claimed by a
    /// compound "keyword N example M" form never also yields a bare
    /// `(N, None)` reference.
    fn extract(&self, question: &str) -> HashSet<(u32, Option<u32>)> {
        let mut refs = HashSet::new();
        let mut consumed: HashSet<u32> = HashSet::new();

        for caps in self.compound.captures_iter(question) {
            if let (Some(num), Some(example)) = (parse_num(&caps, 1), parse_num(&caps, 2)) {
                refs.insert((num, Some(example)));
                consumed.insert(num);
            }
        }

        for caps in self.compound_reversed.captures_iter(question) {
            if let (Some(example), Some(num)) = (parse_num(&caps, 1), parse_num(&caps, 2)) {
                refs.insert((num, Some(example)));
                consumed.insert(num);
            }
        }

        for range in &self.ranges {
            for caps in range.captures_iter(question) {
                if let (Some(start), Some(end)) = (parse_num(&caps, 1), parse_num(&caps, 2)) {
                    for num in start..=end {
                        refs.insert((num, None));
                    }
                }
            }
        }

        for caps in self.single.captures_iter(question) {
            if let Some(num) = parse_num(&caps, 1) {
                if !consumed.contains(&num) {
                    refs.insert((num, None));
                }
            }
        }

        refs
    }
}

fn parse_num(caps: &Captures, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn lecture_patterns() -> &'static NumberedPatterns {
    static PATTERNS: OnceLock<NumberedPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| NumberedPatterns::compile("lecture"))
}

fn week_patterns() -> &'static NumberedPatterns {
    static PATTERNS: OnceLock<NumberedPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| NumberedPatterns::compile("week"))
}

pub fn extract_lecture_references(question: &str) -> HashSet<(u32, Option<u32>)> {
    lecture_patterns().extract(question)
}

pub fn extract_week_references(question: &str) -> HashSet<(u32, Option<u32>)> {
    week_patterns().extract(question)
}

type ExerciseParser = fn(&Captures) -> Option<(u32, u32, Option<String>)>;

/// Ordered exercise patterns: most specific surface forms first. Each entry
/// pairs a pattern with the parser mapping its capture layout onto
/// `(exercise, question, optional part)`.
fn exercise_patterns() -> &'static Vec<(Regex, ExerciseParser)> {
    const SHEET: &str = r"(?:exercises?\s+sheet|exercises?|ex\s+sheet|ex)";
    const PART: &str = r"[a-z]|\d+\(?[a-z]\)?|[ivxlcdm]+";
    const SUFFIX_PART: &str = r"[a-z]|\(\d*[a-z]\)|\d+\([a-z]\)";

    fn ex_q_part(caps: &Captures) -> Option<(u32, u32, Option<String>)> {
        Some((
            parse_num(caps, 1)?,
            parse_num(caps, 2)?,
            caps.get(3).map(|m| normalize_part(m.as_str())),
        ))
    }

    fn q_part_ex(caps: &Captures) -> Option<(u32, u32, Option<String>)> {
        Some((
            parse_num(caps, 3)?,
            parse_num(caps, 1)?,
            caps.get(2).map(|m| normalize_part(m.as_str())),
        ))
    }

    fn q_ex(caps: &Captures) -> Option<(u32, u32, Option<String>)> {
        Some((parse_num(caps, 2)?, parse_num(caps, 1)?, None))
    }

    static PATTERNS: OnceLock<Vec<(Regex, ExerciseParser)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let sources: Vec<(String, ExerciseParser)> = vec![
            // "exercise 2 question 3 part a"
            (
                format!(r"(?i)\b{SHEET}\s+(\d+)\s+(?:question|q)\s*(\d+)\s+part\s+({PART})\b"),
                ex_q_part,
            ),
            // "question 3 part a in exercise 2"
            (
                format!(r"(?i)(?:question|q)\s*(\d+)\s+part\s+({PART})\s+in\s+\b{SHEET}\s+(\d+)"),
                q_part_ex,
            ),
            // "exercise 2 question 3a" / "... q3(a)"
            (
                format!(r"(?i)\b{SHEET}\s+(\d+)\s+(?:question|q)\s*(\d+)({SUFFIX_PART})"),
                ex_q_part,
            ),
            // "question 3a in exercise 2"
            (
                format!(r"(?i)(?:question|q)\s*(\d+)({SUFFIX_PART})\s+in\s+\b{SHEET}\s+(\d+)"),
                q_part_ex,
            ),
            // "exercise 2 question 3" (no part)
            (
                format!(r"(?i)\b{SHEET}\s+(\d+)\s+(?:question|q)\s*(\d+)"),
                ex_q_part,
            ),
            // "question 3 in exercise 2"
            (
                format!(r"(?i)(?:question|q)\s*(\d+)\s+in\s+\b{SHEET}\s+(\d+)"),
                q_ex,
            ),
            // "exercise 2 3a" (question keyword elided)
            (
                format!(r"(?i)\b{SHEET}\s+(\d+)\s+(\d+)([a-z]|\([a-z]\))"),
                ex_q_part,
            ),
            // abbreviated/dotted: "ex. 2 q. 3a"
            (
                format!(r"(?i)\bex\.?\s*(\d+)\s*(?:q|question)\.?\s*(\d+)({SUFFIX_PART})?"),
                ex_q_part,
            ),
            // "ex. sheet 2 question 3a"
            (
                format!(r"(?i)\bex\.?\s+sheet\s+(\d+)\s+(?:question|q)\s*(\d+)({SUFFIX_PART})?"),
                ex_q_part,
            ),
        ];

        sources
            .into_iter()
            .map(|(pattern, parser)| {
                (
                    Regex::new(&pattern).expect("valid exercise reference pattern"),
                    parser,
                )
            })
            .collect()
    })
}

fn bare_exercise_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:exercises?\s+sheet|exercises?|ex\s+sheet|ex\.?)\s+(\d+)")
            .expect("valid bare exercise pattern")
    })
}

/// Strips bracket notation and lower-cases a part label: "(a)" -> "a".
fn normalize_part(part: &str) -> String {
    part.chars()
        .filter(|c| *c != '(' && *c != ')')
        .collect::<String>()
        .to_lowercase()
}

/// Extracts exercise references, trying every surface phrasing in order.
/// Bare "exercise N" mentions register the exercise with no question or
/// part constraint.
pub fn extract_exercise_references(
    question: &str,
) -> (HashSet<u32>, HashMap<(u32, Option<u32>), HashSet<String>>) {
    let mut exercises = HashSet::new();
    let mut exercise_parts: HashMap<(u32, Option<u32>), HashSet<String>> = HashMap::new();

    for (pattern, parser) in exercise_patterns() {
        for caps in pattern.captures_iter(question) {
            if let Some((ex_num, q_num, part)) = parser(&caps) {
                exercises.insert(ex_num);
                let parts = exercise_parts.entry((ex_num, Some(q_num))).or_default();
                if let Some(part) = part {
                    parts.insert(part);
                }
            }
        }
    }

    for caps in bare_exercise_regex().captures_iter(question) {
        if let Some(ex_num) = parse_num(&caps, 1) {
            exercises.insert(ex_num);
        }
    }

    (exercises, exercise_parts)
}

/// Extracts every explicit structural reference the question names.
/// Unparseable text simply fails to match: malformed references are never
/// an error, the question just falls through to semantic scoring.
pub fn extract_document_references(question: &str) -> DocumentReferences {
    let (exercises, exercise_parts) = extract_exercise_references(question);
    DocumentReferences {
        lectures: extract_lecture_references(question),
        weeks: extract_week_references(question),
        exercises,
        exercise_parts,
    }
}

fn lecture_doc_range_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)lecture\s+(\d+)\s*(?:-\s*(\d+))?\.txt")
            .expect("valid lecture document name pattern")
    })
}

fn exercise_doc_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)exercise\s+(\d+)").expect("valid exercise document name pattern")
    })
}

/// The lecture-number range encoded in a document name:
/// "Lecture 7-9.txt" covers 7..=9, "Lecture 4.txt" covers just 4.
fn document_lecture_range(document_name: &str) -> Option<(u32, u32)> {
    let caps = lecture_doc_range_regex().captures(document_name)?;
    let start: u32 = caps.get(1)?.as_str().parse().ok()?;
    let end: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => start,
    };
    Some((start, end))
}

/// Maps extracted references onto the chunk ids they unambiguously denote.
/// Pure function; an empty reference set resolves to an empty id set.
pub fn match_references_to_chunks(
    references: &DocumentReferences,
    chunks: &[Chunk],
) -> HashSet<String> {
    let mut matched: HashSet<String> = HashSet::new();

    let numbered_refs = references.lectures.iter().chain(references.weeks.iter());
    for &(num, example) in numbered_refs {
        for chunk in chunks {
            if chunk.document_type != DocumentType::Lecture {
                continue;
            }
            let Some((start, end)) = document_lecture_range(&chunk.document_name) else {
                continue;
            };
            if !(start..=end).contains(&num) {
                continue;
            }
            match example {
                Some(example) => {
                    let phrase = format!("example {}", example);
                    if chunk.text.to_lowercase().contains(&phrase) {
                        matched.insert(chunk.chunk_id.clone());
                    }
                }
                None => {
                    matched.insert(chunk.chunk_id.clone());
                }
            }
        }
    }

    for chunk in chunks {
        if chunk.document_type != DocumentType::Exercise {
            continue;
        }
        let Some(caps) = exercise_doc_regex().captures(&chunk.document_name) else {
            continue;
        };
        let Some(ex_num) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };

        // Constraints only restrict the exercise they name: a bare
        // "exercise N" reference still matches all of N's chunks even when
        // another exercise was referenced down to a question or part.
        let constraints: Vec<(&Option<u32>, &HashSet<String>)> = references
            .exercise_parts
            .iter()
            .filter(|((e, _), _)| *e == ex_num)
            .map(|((_, q), parts)| (q, parts))
            .collect();

        if constraints.is_empty() {
            if references.exercises.contains(&ex_num) {
                matched.insert(chunk.chunk_id.clone());
            }
            continue;
        }

        for (question_num, parts) in constraints {
            if let Some(q) = question_num {
                if chunk.question_num != Some(*q) {
                    continue;
                }
            }
            if parts.is_empty() || chunk.parts.is_empty() {
                // No part constraint, or a chunk with no detected parts:
                // the whole question block matches.
                matched.insert(chunk.chunk_id.clone());
            } else if chunk.parts.iter().any(|p| parts.contains(p)) {
                matched.insert(chunk.chunk_id.clone());
            }
        }
    }

    matched
}
