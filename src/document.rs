//! Paragraph extraction from counterparty documents.
//!
//! Word documents are read straight out of the `.docx` zip container
//! (`word/document.xml`); anything else is treated as UTF-8 text with one
//! paragraph per line. Either way the result is a [`ParagraphCollection`]:
//! trimmed, non-empty paragraphs in document order.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

const DOCX_BODY: &str = "word/document.xml";
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("io error reading document: {0}")]
    Io(#[from] std::io::Error),
}

impl DocumentError {
    fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Ordered paragraphs of a single document.
///
/// The position of a paragraph is its identity: row `i` of a similarity
/// index built from this collection refers to `self[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphCollection {
    paragraphs: Vec<String>,
}

impl ParagraphCollection {
    /// Trim every candidate and keep the non-empty ones, in order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paragraphs = texts
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self { paragraphs }
    }

    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.paragraphs.get(idx).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paragraphs.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.paragraphs
    }
}

/// Extract the paragraphs of the document at `path`.
pub fn extract_paragraphs(path: impl AsRef<Path>) -> Result<ParagraphCollection, DocumentError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;

    let paragraphs = if is_docx(path, &bytes) {
        docx_paragraphs(path, &bytes)?
    } else {
        text_paragraphs(path, bytes)?
    };

    let collection = ParagraphCollection::from_texts(paragraphs);
    log::debug!(
        "extracted {} paragraphs from {}",
        collection.len(),
        path.display()
    );

    Ok(collection)
}

fn is_docx(path: &Path, bytes: &[u8]) -> bool {
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("docx"))
        .unwrap_or(false);

    by_extension || bytes.starts_with(ZIP_SIGNATURE)
}

fn text_paragraphs(path: &Path, bytes: Vec<u8>) -> Result<Vec<String>, DocumentError> {
    let text = String::from_utf8(bytes)
        .map_err(|e| DocumentError::parse(path, format!("not valid utf-8 text: {e}")))?;

    Ok(text.lines().map(str::to_string).collect())
}

fn docx_paragraphs(path: &Path, bytes: &[u8]) -> Result<Vec<String>, DocumentError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| DocumentError::parse(path, format!("not a docx archive: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| DocumentError::parse(path, format!("missing {DOCX_BODY}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| DocumentError::parse(path, format!("unreadable {DOCX_BODY}: {e}")))?;

    Ok(paragraphs_from_xml(&xml))
}

fn paragraph_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?w:p(?:\s[^>]*)?/?>").expect("paragraph tag regex is valid"))
}

/// `mc:Fallback` repeats the content of its `mc:Choice` for older readers.
fn fallback_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<mc:Fallback(?:\s[^>]*)?>.*?</mc:Fallback>|<mc:Fallback(?:\s[^>]*)?/>")
            .expect("fallback regex is valid")
    })
}

fn run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*?)?>(.*?)</w:t>|<w:tab\s*/>|<w:(?:br|cr)(?:\s[^>]*?)?/>")
            .expect("run regex is valid")
    })
}

/// Text of every `<w:p>` in WordprocessingML, ordered by where each
/// paragraph starts. Paragraphs nested in text boxes are separate entries
/// and do not swallow the text that follows them in the outer paragraph.
fn paragraphs_from_xml(xml: &str) -> Vec<String> {
    let xml = fallback_re().replace_all(xml, "");

    let mut paragraphs: Vec<String> = vec![];
    let mut open: Vec<usize> = vec![];
    let mut last = 0;

    for tag in paragraph_tag_re().find_iter(&xml) {
        if let Some(&current) = open.last() {
            push_runs(&mut paragraphs[current], &xml[last..tag.start()]);
        }
        last = tag.end();

        let tag = tag.as_str();
        if tag.starts_with("</") {
            open.pop();
        } else {
            paragraphs.push(String::new());
            if !tag.ends_with("/>") {
                open.push(paragraphs.len() - 1);
            }
        }
    }

    paragraphs
}

fn push_runs(text: &mut String, body: &str) {
    for run in run_re().captures_iter(body) {
        match run.get(1) {
            Some(t) => text.push_str(&decode_entities(t.as_str())),
            None if run[0].starts_with("<w:tab") => text.push('\t'),
            None => text.push('\n'),
        }
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let decoded = tail.find(';').and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
