//! Binary cache of built document indexes.
//!
//! File format: `<document hash hex>.idx`
//!
//! Header (79 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - document_hash: [u8; 32] (SHA256 of the source document bytes)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, in paragraph order):
//! - text_len: u32 (little-endian)
//! - text: [u8; text_len] (UTF-8 paragraph)
//! - embedding: [f32; dimensions] (little-endian, already normalized)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::document::ParagraphCollection;
use crate::semantic::{DocumentIndex, SimilarityIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + document_hash(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 79;

/// Bytes covered by the header checksum
const CHECKSUMMED: usize = HEADER_SIZE - 4;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexCacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Document mismatch: file was built from a different document")]
    DocumentMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,
}

/// SHA256 of a document's raw bytes.
pub fn document_hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// On-disk cache of document indexes, one file per document.
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Cache file for a document.
    pub fn path_for(&self, document_hash: &[u8; 32]) -> PathBuf {
        let name: String = document_hash.iter().map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{name}.idx"))
    }

    pub fn exists(&self, document_hash: &[u8; 32]) -> bool {
        self.path_for(document_hash).exists()
    }

    /// Load a cached index for the document, validated against the model.
    pub fn load(
        &self,
        model_id: &[u8; 32],
        document_hash: &[u8; 32],
    ) -> Result<DocumentIndex, IndexCacheError> {
        let file = File::open(self.path_for(document_hash))?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        if header.model_id != *model_id {
            return Err(IndexCacheError::ModelMismatch);
        }
        if header.document_hash != *document_hash {
            return Err(IndexCacheError::DocumentMismatch);
        }

        let dimensions = header.dimensions as usize;

        // Every entry takes at least its length prefix and its floats
        let min_entry_size = 4 + 4 * dimensions as u64;
        let body_len = file_len.saturating_sub(HEADER_SIZE as u64);
        if header.entry_count > body_len / min_entry_size {
            return Err(IndexCacheError::InvalidFormat(format!(
                "{} entries cannot fit in {} bytes",
                header.entry_count, body_len
            )));
        }

        let mut texts = Vec::with_capacity(header.entry_count as usize);
        let mut vectors = Vec::with_capacity(header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (text, embedding) = read_entry(&mut reader, dimensions)?;
            texts.push(text);
            vectors.push(embedding);
        }

        let paragraphs = ParagraphCollection::from_texts(&texts);
        if paragraphs.len() != texts.len() {
            return Err(IndexCacheError::InvalidFormat(
                "cached paragraph is empty".to_string(),
            ));
        }

        let index = SimilarityIndex::build(vectors)
            .map_err(|e| IndexCacheError::InvalidFormat(e.to_string()))?;

        DocumentIndex::from_parts(paragraphs, index)
            .map_err(|e| IndexCacheError::InvalidFormat(e.to_string()))
    }

    /// Save a document index.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        doc: &DocumentIndex,
        model_id: &[u8; 32],
        document_hash: &[u8; 32],
    ) -> Result<PathBuf, IndexCacheError> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path_for(document_hash);
        let temp_path = path.with_extension("tmp");

        if let Err(e) = write_to_file(&temp_path, doc, model_id, document_hash) {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        std::fs::rename(&temp_path, &path)?;

        Ok(path)
    }
}

fn write_to_file(
    path: &Path,
    doc: &DocumentIndex,
    model_id: &[u8; 32],
    document_hash: &[u8; 32],
) -> Result<(), IndexCacheError> {
    let dimensions = u16::try_from(doc.index().dimensions()).map_err(|_| {
        IndexCacheError::InvalidFormat(format!(
            "{} dimensions do not fit the header",
            doc.index().dimensions()
        ))
    })?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let header = Header {
        version: FORMAT_VERSION,
        model_id: *model_id,
        document_hash: *document_hash,
        dimensions,
        entry_count: doc.len() as u64,
    };
    write_header(&mut writer, &header)?;

    for (text, embedding) in doc.paragraphs().iter().zip(doc.index().vectors()) {
        let len = u32::try_from(text.len()).map_err(|_| {
            IndexCacheError::InvalidFormat("paragraph longer than 4 GiB".to_string())
        })?;
        writer.write_all(&len.to_le_bytes())?;
        writer.write_all(text.as_bytes())?;

        for &value in embedding {
            writer.write_all(&value.to_le_bytes())?;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    Ok(())
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    document_hash: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), IndexCacheError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..65].copy_from_slice(&header.document_hash);
    header_bytes[65..67].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[67..75].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[..CHECKSUMMED]);
    header_bytes[75..79].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, IndexCacheError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            IndexCacheError::InvalidFormat("truncated header".to_string())
        }
        _ => IndexCacheError::Io(e),
    })?;

    let version = header_bytes[0];
    if version != FORMAT_VERSION {
        return Err(IndexCacheError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes(array(&header_bytes[75..79]));
    if stored_checksum != crc32fast::hash(&header_bytes[..CHECKSUMMED]) {
        return Err(IndexCacheError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        model_id: array(&header_bytes[1..33]),
        document_hash: array(&header_bytes[33..65]),
        dimensions: u16::from_le_bytes(array(&header_bytes[65..67])),
        entry_count: u64::from_le_bytes(array(&header_bytes[67..75])),
    })
}

fn read_entry<R: Read>(
    reader: &mut R,
    dimensions: usize,
) -> Result<(String, Vec<f32>), IndexCacheError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;

    let text_len = u64::from(u32::from_le_bytes(len_bytes));
    let mut text_bytes = vec![];
    reader.by_ref().take(text_len).read_to_end(&mut text_bytes)?;
    if text_bytes.len() as u64 != text_len {
        return Err(IndexCacheError::InvalidFormat(
            "paragraph runs past end of file".to_string(),
        ));
    }
    let text = String::from_utf8(text_bytes)
        .map_err(|_| IndexCacheError::InvalidFormat("paragraph is not utf-8".to_string()))?;

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((text, embedding))
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
