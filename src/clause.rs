//! Template clause records and their JSON hand-off format.
//!
//! A [`ClauseRecord`] is created from a template library entry, receives its
//! retrieval result once, and is then written out for the classification
//! stage, which fills in `answer` (and later `modified_clause`).

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::{BackendLocal, StorageManager};

/// One retrieved counterparty paragraph with its cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedClause {
    pub clause: String,
    pub confidence: f32,
}

/// Retrieved paragraphs, highest confidence first.
pub type RetrievalResult = Vec<RetrievedClause>;

#[derive(Debug, thiserror::Error)]
pub enum ClauseError {
    #[error("No retrieved clauses found for {clause_name} / {clause_subname}")]
    NoRetrievedClauses {
        clause_name: String,
        clause_subname: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseRecord {
    pub clause_name: String,
    pub clause_subname: String,
    /// Template clause text, used as the retrieval query
    pub input_clause: String,
    #[serde(default)]
    pub retrieved_clauses: RetrievalResult,
    /// Classification written by the downstream stage (e.g. "missing")
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_clause: Option<String>,
}

impl ClauseRecord {
    pub fn new(
        clause_name: impl Into<String>,
        clause_subname: impl Into<String>,
        input_clause: impl Into<String>,
    ) -> Self {
        Self {
            clause_name: clause_name.into(),
            clause_subname: clause_subname.into(),
            input_clause: input_clause.into(),
            retrieved_clauses: vec![],
            answer: None,
            modified_clause: None,
        }
    }

    /// Store the retrieval result. Each record is retrieved exactly once.
    pub fn attach_retrieval(&mut self, result: RetrievalResult) {
        if !self.retrieved_clauses.is_empty() {
            log::warn!(
                "overwriting retrieval result for {} / {}",
                self.clause_name,
                self.clause_subname
            );
        }
        self.retrieved_clauses = result;
    }

    /// Highest-confidence retrieved clause (the first one on ties).
    pub fn best_match(&self) -> Result<&RetrievedClause, ClauseError> {
        self.retrieved_clauses
            .iter()
            .reduce(|best, c| if c.confidence > best.confidence { c } else { best })
            .ok_or_else(|| ClauseError::NoRetrievedClauses {
                clause_name: self.clause_name.clone(),
                clause_subname: self.clause_subname.clone(),
            })
    }

    /// Whether the downstream answer equals `label`, ignoring case and
    /// surrounding whitespace.
    pub fn answer_matches(&self, label: &str) -> bool {
        self.answer
            .as_deref()
            .map(|a| a.trim().eq_ignore_ascii_case(label.trim()))
            .unwrap_or(false)
    }

    /// The first `top_n` retrieved clauses as a numbered text block.
    pub fn format_top(&self, top_n: usize) -> String {
        let mut lines = vec![format!("Top {top_n} retrieved clauses:")];

        for (i, c) in self.retrieved_clauses.iter().take(top_n).enumerate() {
            lines.push(format!("{}. Confidence: {:.4}", i + 1, c.confidence));
            lines.push(c.clause.clone());
            lines.push("-----".to_string());
        }

        lines.join("\n")
    }
}

impl fmt::Display for ClauseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.retrieved_clauses.is_empty() {
            return write!(f, "Contract with no retrieved clauses.");
        }

        writeln!(f, "Contract with the following retrieved clauses:")?;
        for (i, c) in self.retrieved_clauses.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "Clause {}:", i + 1)?;
            writeln!(f, "  Retrieved Clause:  {}", c.clause)?;
            writeln!(f, "  Confidence: {}", c.confidence)?;
        }
        Ok(())
    }
}

/// Write records as a pretty-printed JSON array, in order.
///
/// The file is replaced atomically, so readers never see a partial array.
pub fn save_records(path: impl AsRef<Path>, records: &[ClauseRecord]) -> Result<(), ClauseError> {
    let path = path.as_ref();
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("not a file path: {}", path.display()),
        )
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let json = serde_json::to_string_pretty(records)?;
    BackendLocal::new(dir)?.write(file_name, json.as_bytes())?;
    Ok(())
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<ClauseRecord>, ClauseError> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Records whose answer matches `label` (see [`ClauseRecord::answer_matches`]).
pub fn filter_by_answer<'a>(
    records: &'a [ClauseRecord],
    label: &'a str,
) -> impl Iterator<Item = &'a ClauseRecord> + 'a {
    records.iter().filter(move |r| r.answer_matches(label))
}
