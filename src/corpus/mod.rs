//! Text corpus loading
//!
//! A corpus is a directory of `.txt` files read in file-name order. Two file
//! names are reserved for run control and never treated as documents:
//!
//! - `goal.txt`: free-text goal steering schema discovery
//! - `labels.txt`: seed labels, either quoted and comma separated
//!   (`"Norma","Organismo"`) or one per line
//!
//! Files are decoded as UTF-8 (BOM stripped) with a configurable fallback
//! encoding. A file neither decoding accepts is skipped with a warning.

use encoding_rs::Encoding;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::{char_prefix, content_hash, decode_text, encoding_for_label};

/// Reserved goal file name
pub const GOAL_FILE: &str = "goal.txt";

/// Reserved seed label file name
pub const LABELS_FILE: &str = "labels.txt";

/// Corpus loading errors
#[derive(Error, Debug)]
pub enum CorpusError {
    /// Corpus path is missing or not a directory
    #[error("Corpus directory not found: {0}")]
    NotADirectory(PathBuf),

    /// Directory listing failed
    #[error("Failed to read corpus directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fallback encoding label not recognized
    #[error("Unknown fallback encoding: {0}")]
    UnknownEncoding(String),
}

/// One source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Position in corpus order
    pub index: usize,

    /// File name including extension
    pub filename: String,

    /// Decoded text
    pub text: String,
}

impl Document {
    pub fn new(index: usize, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            filename: filename.into(),
            text: text.into(),
        }
    }

    /// Id of the provenance node for this document. The raw file name is
    /// unique within a corpus directory, a normalized one is not.
    pub fn node_id(&self) -> String {
        self.filename.clone()
    }

    /// SHA-256 hex of the text
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }

    /// Leading `max_chars` characters sent to an agent
    pub fn prefix(&self, max_chars: usize) -> &str {
        char_prefix(&self.text, max_chars)
    }
}

/// A file that could not be loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// Ordered, read-only set of documents plus control data
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    /// Documents in file-name order
    pub documents: Vec<Document>,

    /// Contents of `goal.txt`, if present and non-empty
    pub goal: Option<String>,

    /// Raw seed labels from `labels.txt`
    pub seed_labels: Vec<String>,

    /// Files that failed to load
    pub skipped: Vec<SkippedFile>,
}

impl Corpus {
    /// Build an in-memory corpus from `(filename, text)` pairs, keeping order
    pub fn from_pairs<I, N, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let documents = pairs
            .into_iter()
            .enumerate()
            .map(|(i, (name, text))| Document::new(i, name, text))
            .collect();

        Self {
            documents,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Reads a corpus directory
#[derive(Debug, Clone)]
pub struct CorpusLoader {
    fallback: &'static Encoding,
    extension: String,
}

impl Default for CorpusLoader {
    fn default() -> Self {
        Self {
            fallback: encoding_rs::WINDOWS_1252,
            extension: "txt".to_string(),
        }
    }
}

impl CorpusLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the encoding with the given WHATWG label as UTF-8 fallback
    pub fn with_fallback_encoding(mut self, label: &str) -> Result<Self, CorpusError> {
        self.fallback =
            encoding_for_label(label).ok_or_else(|| CorpusError::UnknownEncoding(label.to_string()))?;
        Ok(self)
    }

    pub fn fallback_encoding(&self) -> &'static Encoding {
        self.fallback
    }

    /// Load every document and control file under `dir`
    pub fn load(&self, dir: &Path) -> Result<Corpus, CorpusError> {
        if !dir.is_dir() {
            return Err(CorpusError::NotADirectory(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(|source| CorpusError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| p.extension().is_some_and(|ext| ext == self.extension.as_str()))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut corpus = Corpus::default();

        for path in paths {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let text = match self.read_text(&path) {
                Ok(text) => text,
                Err(reason) => {
                    tracing::warn!(file = %filename, reason = %reason, "Skipping unreadable file");
                    corpus.skipped.push(SkippedFile { filename, reason });
                    continue;
                }
            };

            match filename.as_str() {
                GOAL_FILE => {
                    let goal = text.trim();
                    if !goal.is_empty() {
                        corpus.goal = Some(goal.to_string());
                    }
                }
                LABELS_FILE => corpus.seed_labels = parse_label_list(&text),
                _ => {
                    let index = corpus.documents.len();
                    corpus.documents.push(Document::new(index, filename, text));
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            documents = corpus.documents.len(),
            skipped = corpus.skipped.len(),
            has_goal = corpus.goal.is_some(),
            seed_labels = corpus.seed_labels.len(),
            "Corpus loaded"
        );

        Ok(corpus)
    }

    fn read_text(&self, path: &Path) -> Result<String, String> {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        decode_text(&bytes, self.fallback).map_err(|e| e.to_string())
    }
}

/// Parse a seed label list.
///
/// Accepts `"A","B"` style lists, plain comma separated values and one label
/// per line. Empty entries are ignored.
pub fn parse_label_list(text: &str) -> Vec<String> {
    text.split([',', '\n', '\r'])
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
