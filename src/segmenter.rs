use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::documents::DocumentType;

/// A chunk of course text with its embedding vector and structural metadata.
/// Chunks are the fundamental unit of retrieval: built once at startup from
/// the loaded documents and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: `{document}_{index}` for lectures,
    /// `{document}_Q{n}` for exercises, with `_sub{j}` appended for
    /// length-bounded sub-splits.
    pub chunk_id: String,
    pub document_name: String,
    pub document_type: DocumentType,
    pub chunk_index: usize,
    pub section_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_num: Option<u32>,
    /// Part labels detected inside an exercise question ("a", "ii", ...),
    /// in reading order without duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<String>,
    pub text: String,
    pub char_length: usize,
    /// Attached by the embedding provider after segmentation.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

fn lecture_section_regex() -> &'static Regex {
    static SECTION_REGEX: OnceLock<Regex> = OnceLock::new();
    SECTION_REGEX.get_or_init(|| {
        Regex::new(r"\\(?:sub)?section\{([^}]+)\}").expect("valid lecture section pattern")
    })
}

fn exercise_question_regex() -> &'static Regex {
    static QUESTION_REGEX: OnceLock<Regex> = OnceLock::new();
    QUESTION_REGEX.get_or_init(|| {
        Regex::new(r"\\(?:sub)?section\*\{Question\s+(\d+)\}")
            .expect("valid exercise question pattern")
    })
}

fn part_label_regex() -> &'static Regex {
    static PART_REGEX: OnceLock<Regex> = OnceLock::new();
    PART_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\\item\s*\[\(?([a-z]|[ivxlcdm]+)\)?\]").expect("valid part label pattern")
    })
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits lecture documents on `\section{..}` / `\subsection{..}` markers.
///
/// Each span between markers becomes one chunk tagged with the preceding
/// marker's title ("Preamble" before the first marker). Chunks longer than
/// `chunk_size` are sub-split with `overlap` characters of shared context
/// between consecutive pieces.
pub fn chunk_lectures_by_section(
    lecture_texts: &BTreeMap<String, String>,
    chunk_size: usize,
    overlap: usize,
    separators: &[String],
) -> Vec<Chunk> {
    let mut all_chunks = Vec::new();

    for (name, text) in lecture_texts {
        let mut section_title = "Preamble".to_string();
        let mut chunk_index = 0usize;
        let mut cursor = 0usize;

        let mut push_span = |span: &str, title: &str, index: &mut usize, out: &mut Vec<Chunk>| {
            let content = span.trim();
            if content.is_empty() {
                return;
            }
            out.push(Chunk {
                chunk_id: format!("{}_{}", name, index),
                document_name: name.clone(),
                document_type: DocumentType::Lecture,
                chunk_index: *index,
                section_title: title.to_string(),
                question_num: None,
                parts: Vec::new(),
                text: content.to_string(),
                char_length: char_len(content),
                embedding: Vec::new(),
            });
            *index += 1;
        };

        for marker in lecture_section_regex().captures_iter(text) {
            let Some(whole) = marker.get(0) else {
                continue;
            };
            push_span(
                &text[cursor..whole.start()],
                &section_title,
                &mut chunk_index,
                &mut all_chunks,
            );
            section_title = marker[1].to_string();
            cursor = whole.end();
        }
        push_span(
            &text[cursor..],
            &section_title,
            &mut chunk_index,
            &mut all_chunks,
        );
    }

    split_oversized(all_chunks, chunk_size, overlap, separators)
}

/// Splits exercise documents on `\section*{Question N}` markers.
///
/// Each question span becomes one chunk tagged with its question number and
/// detected part labels. Text before the first marker, or a whole document
/// without markers, becomes an untagged "Preamble" chunk so no content is
/// lost. Oversized spans are sub-split without overlap so part labels are
/// not duplicated across sub-chunks.
pub fn chunk_exercises_by_question(
    exercise_texts: &BTreeMap<String, String>,
    chunk_size: usize,
    separators: &[String],
) -> Vec<Chunk> {
    let mut all_chunks = Vec::new();

    for (name, text) in exercise_texts {
        let markers: Vec<(u32, usize, usize)> = exercise_question_regex()
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let num = caps[1].parse::<u32>().ok()?;
                Some((num, whole.start(), whole.end()))
            })
            .collect();

        let mut chunk_index = 0usize;

        let preamble_end = markers.first().map(|&(_, start, _)| start).unwrap_or(text.len());
        let preamble = text[..preamble_end].trim();
        if !preamble.is_empty() {
            all_chunks.push(Chunk {
                chunk_id: format!("{}_{}", name, chunk_index),
                document_name: name.clone(),
                document_type: DocumentType::Exercise,
                chunk_index,
                section_title: "Preamble".to_string(),
                question_num: None,
                parts: detect_part_labels(preamble),
                text: preamble.to_string(),
                char_length: char_len(preamble),
                embedding: Vec::new(),
            });
            chunk_index += 1;
        }

        for (i, &(question_num, _, span_start)) in markers.iter().enumerate() {
            let span_end = markers
                .get(i + 1)
                .map(|&(_, next_start, _)| next_start)
                .unwrap_or(text.len());
            let content = text[span_start..span_end].trim();
            if content.is_empty() {
                continue;
            }

            all_chunks.push(Chunk {
                chunk_id: format!("{}_Q{}", name, question_num),
                document_name: name.clone(),
                document_type: DocumentType::Exercise,
                chunk_index,
                section_title: format!("Question {}", question_num),
                question_num: Some(question_num),
                parts: detect_part_labels(content),
                text: content.to_string(),
                char_length: char_len(content),
                embedding: Vec::new(),
            });
            chunk_index += 1;
        }
    }

    split_oversized(all_chunks, chunk_size, 0, separators)
}

/// Enumerated part labels in reading order, lower-cased, deduplicated.
fn detect_part_labels(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for caps in part_label_regex().captures_iter(text) {
        let label = caps[1].to_lowercase();
        if !parts.contains(&label) {
            parts.push(label);
        }
    }
    parts
}

fn split_oversized(
    chunks: Vec<Chunk>,
    chunk_size: usize,
    overlap: usize,
    separators: &[String],
) -> Vec<Chunk> {
    let mut final_chunks = Vec::new();

    for chunk in chunks {
        if chunk.char_length <= chunk_size {
            final_chunks.push(chunk);
            continue;
        }

        let pieces = split_text(&chunk.text, chunk_size, overlap, separators);
        tracing::debug!(
            "Split oversized chunk {} ({} chars) into {} pieces",
            chunk.chunk_id,
            chunk.char_length,
            pieces.len()
        );

        for (j, piece) in pieces.into_iter().enumerate() {
            final_chunks.push(Chunk {
                chunk_id: format!("{}_sub{}", chunk.chunk_id, j),
                document_name: chunk.document_name.clone(),
                document_type: chunk.document_type,
                chunk_index: chunk.chunk_index,
                section_title: chunk.section_title.clone(),
                question_num: chunk.question_num,
                parts: chunk.parts.clone(),
                char_length: char_len(&piece),
                text: piece,
                embedding: Vec::new(),
            });
        }
    }

    final_chunks
}

/// Length-bounded splitter with an ordered separator preference list.
///
/// Tries each separator in order: the text is split at the first separator
/// that occurs in it, segments are greedily merged into pieces of at most
/// `chunk_size` characters, and any single segment still too large recurses
/// onto the remaining separators (ending in a hard character split). Each
/// piece after the first is prefixed with the last `overlap` characters of
/// its predecessor, so no piece exceeds `chunk_size + overlap` characters.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separators: &[String],
) -> Vec<String> {
    let pieces = split_bounded(text, chunk_size, separators);
    if overlap == 0 || pieces.len() < 2 {
        return pieces;
    }

    let mut with_overlap = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        if i == 0 {
            with_overlap.push(piece.clone());
        } else {
            let prefix = tail_chars(&pieces[i - 1], overlap);
            with_overlap.push(format!("{}{}", prefix, piece));
        }
    }
    with_overlap
}

fn split_bounded(text: &str, chunk_size: usize, separators: &[String]) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let (sep_index, sep) = match separators
        .iter()
        .enumerate()
        .find(|(_, sep)| !sep.is_empty() && text.contains(sep.as_str()))
    {
        Some((i, sep)) => (i, sep.as_str()),
        None => return hard_split(text, chunk_size),
    };

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for segment in split_keep_separator(text, sep) {
        let segment_len = char_len(&segment);

        if current_len + segment_len > chunk_size && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if segment_len > chunk_size {
            // A single segment that the current separator cannot shrink:
            // recurse with the lower-priority separators.
            pieces.extend(split_bounded(&segment, chunk_size, &separators[sep_index + 1..]));
        } else {
            current.push_str(&segment);
            current_len += segment_len;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces.retain(|piece| !piece.trim().is_empty());
    pieces
}

/// Splits on `sep`, keeping the separator attached to the preceding segment
/// so that concatenating the segments reproduces the input.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        segments.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            pieces.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// The last `n` characters of `text` (the whole text when shorter).
fn tail_chars(text: &str, n: usize) -> &str {
    let count = char_len(text);
    if count <= n {
        return text;
    }
    text.char_indices()
        .nth(count - n)
        .map(|(idx, _)| &text[idx..])
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_separators() -> Vec<String> {
        vec![
            "\n\n".to_string(),
            "\n".to_string(),
            ". ".to_string(),
            " ".to_string(),
        ]
    }

    fn lecture_map(name: &str, text: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), text.to_string());
        map
    }

    #[test]
    fn lecture_sections_become_titled_chunks() {
        let text = "Intro material.\n\\section{Expected Utility}\nUtility content.\n\\subsection{Risk Aversion}\nRisk content.";
        let chunks =
            chunk_lectures_by_section(&lecture_map("Lecture 1.txt", text), 1500, 200, &default_separators());

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section_title, "Preamble");
        assert_eq!(chunks[0].text, "Intro material.");
        assert_eq!(chunks[1].section_title, "Expected Utility");
        assert_eq!(chunks[2].section_title, "Risk Aversion");
        assert_eq!(chunks[0].chunk_id, "Lecture 1.txt_0");
        assert_eq!(chunks[2].chunk_id, "Lecture 1.txt_2");
    }

    #[test]
    fn document_without_markers_yields_single_chunk() {
        let chunks = chunk_lectures_by_section(
            &lecture_map("Lecture 3.txt", "Just some plain notes with no markers."),
            1500,
            200,
            &default_separators(),
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_title, "Preamble");
        assert_eq!(chunks[0].text, "Just some plain notes with no markers.");
    }

    #[test]
    fn segmentation_covers_all_content() {
        let text = "Before.\n\\section{One}\nAlpha beta.\n\\section{Two}\nGamma delta.";
        let chunks =
            chunk_lectures_by_section(&lecture_map("Lecture 1.txt", text), 1500, 200, &default_separators());

        let reassembled: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for fragment in ["Before.", "Alpha beta.", "Gamma delta."] {
            assert!(reassembled.contains(fragment), "missing {:?}", fragment);
        }
    }

    #[test]
    fn oversized_chunks_respect_size_plus_overlap_bound() {
        let sentence = "The expected utility of a lottery is the probability weighted sum. ";
        let text = sentence.repeat(40);
        let chunk_size = 200;
        let overlap = 30;

        let chunks = chunk_lectures_by_section(
            &lecture_map("Lecture 2.txt", &text),
            chunk_size,
            overlap,
            &default_separators(),
        );

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                chunk.char_length <= chunk_size + overlap,
                "chunk {} has {} chars",
                chunk.chunk_id,
                chunk.char_length
            );
            assert!(chunk.chunk_id.contains("_sub"));
            assert_eq!(chunk.section_title, "Preamble");
        }
    }

    #[test]
    fn sub_split_preserves_text_when_overlap_is_zero() {
        let word = "probability ";
        let text = word.repeat(100);
        let pieces = split_text(text.trim_end(), 120, 0, &default_separators());

        assert!(pieces.len() > 1);
        let reassembled: String = pieces.concat();
        assert_eq!(
            reassembled.split_whitespace().collect::<Vec<_>>(),
            text.split_whitespace().collect::<Vec<_>>()
        );
    }

    #[test]
    fn split_text_is_deterministic() {
        let sentence = "Autocovariance decays geometrically for a stationary AR process. ";
        let text = sentence.repeat(25);

        let first = split_text(&text, 180, 40, &default_separators());
        let second = split_text(&text, 180, 40, &default_separators());
        assert_eq!(first, second);

        let no_overlap_a = split_text(&text, 180, 0, &default_separators());
        let no_overlap_b = split_text(&text, 180, 0, &default_separators());
        assert_eq!(no_overlap_a, no_overlap_b);
    }

    #[test]
    fn hard_split_applies_when_no_separator_matches() {
        let text = "x".repeat(500);
        let pieces = split_text(&text, 100, 0, &default_separators());
        assert_eq!(pieces.len(), 5);
        assert!(pieces.iter().all(|p| p.chars().count() <= 100));
    }

    #[test]
    fn exercise_questions_become_chunks_with_parts() {
        let text = "\\section*{Question 1}\nCompute the variance.\n\\item[(a)] First part\n\\item[(b)] Second part\n\\section*{Question 2}\nState the theorem.\n\\item[i] Roman part\n\\item[ii] Another";
        let mut map = BTreeMap::new();
        map.insert("Exercise 1.txt".to_string(), text.to_string());

        let chunks = chunk_exercises_by_question(&map, 1500, &default_separators());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "Exercise 1.txt_Q1");
        assert_eq!(chunks[0].question_num, Some(1));
        assert_eq!(chunks[0].section_title, "Question 1");
        assert_eq!(chunks[0].parts, vec!["a", "b"]);
        assert_eq!(chunks[1].question_num, Some(2));
        assert_eq!(chunks[1].parts, vec!["i", "ii"]);
    }

    #[test]
    fn exercise_without_question_markers_yields_single_untagged_chunk() {
        let mut map = BTreeMap::new();
        map.insert("Exercise 9.txt".to_string(), "free-form notes".to_string());
        let chunks = chunk_exercises_by_question(&map, 1500, &default_separators());

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "Exercise 9.txt_0");
        assert_eq!(chunks[0].section_title, "Preamble");
        assert_eq!(chunks[0].question_num, None);
        assert_eq!(chunks[0].text, "free-form notes");
    }

    #[test]
    fn exercise_text_before_first_marker_is_kept() {
        let text = "General instructions for the sheet.\n\\section*{Question 1}\nCompute the mean.";
        let mut map = BTreeMap::new();
        map.insert("Exercise 5.txt".to_string(), text.to_string());

        let chunks = chunk_exercises_by_question(&map, 1500, &default_separators());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].section_title, "Preamble");
        assert_eq!(chunks[0].question_num, None);
        assert_eq!(chunks[0].text, "General instructions for the sheet.");
        assert_eq!(chunks[1].chunk_id, "Exercise 5.txt_Q1");
        assert_eq!(chunks[1].chunk_index, 1);

        let reassembled: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for fragment in ["General instructions", "Compute the mean."] {
            assert!(reassembled.contains(fragment), "missing {:?}", fragment);
        }
    }

    #[test]
    fn oversized_exercise_chunks_split_without_overlap() {
        let body = "Part text that goes on. ".repeat(30);
        let text = format!("\\section*{{Question 3}}\n\\item[(a)] {}", body);
        let mut map = BTreeMap::new();
        map.insert("Exercise 2.txt".to_string(), text);

        let chunks = chunk_exercises_by_question(&map, 150, &default_separators());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_length <= 150);
            assert!(chunk.chunk_id.starts_with("Exercise 2.txt_Q3_sub"));
            assert_eq!(chunk.question_num, Some(3));
            assert_eq!(chunk.parts, vec!["a"]);
        }
    }

    #[test]
    fn part_label_detection_is_case_insensitive_and_deduplicated() {
        let parts = detect_part_labels("\\item[(A)] one \\item[(a)] again \\item[IV] roman");
        assert_eq!(parts, vec!["a", "iv"]);
    }
}
