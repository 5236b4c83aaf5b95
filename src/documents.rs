use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Lecture,
    Exercise,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Lecture => write!(f, "lecture"),
            DocumentType::Exercise => write!(f, "exercise"),
        }
    }
}

/// Loads every `.txt` document under `dir` into a name → content map.
///
/// The map is ordered by filename so downstream chunk ids are stable across
/// runs. A missing or empty directory is not an error: the pipeline starts
/// with an empty corpus and every question falls through to the pre-filter.
pub fn load_document_texts(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut texts = BTreeMap::new();

    if !dir.exists() {
        tracing::warn!("Document directory {:?} does not exist, starting empty", dir);
        return Ok(texts);
    }

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("txt") {
            continue;
        }

        let filename = match path.file_name().and_then(|s| s.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read document {:?}", path))?;
        texts.insert(filename, content);
    }

    tracing::info!("Loaded {} documents from {:?}", texts.len(), dir);
    Ok(texts)
}
