//! Builds the vector index that retrieval reads.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ignore::WalkBuilder;
use lopdf::content::Content;
use lopdf::{Document, Object};
use tracing::{debug, info, warn};

use crate::config::RetrievalSettings;
use crate::index::{ChunkMeta, VectorIndex};
use crate::providers::embeddings::Embedder;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];
const PDF_EXTENSION: &str = "pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub chunk_overlap: usize,
    /// Chunks sent per embedding request
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            batch_size: 64,
        }
    }
}

impl From<&RetrievalSettings> for IngestOptions {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            batch_size: settings.batch_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub index_path: PathBuf,
}

/// Split `text` into overlapping character windows, dropping blank ones
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        start += step;
    }
    chunks
}

fn push_strings(text: &mut String, operands: &[Object]) {
    for operand in operands {
        if let Object::String(bytes, _) = operand {
            text.push_str(&String::from_utf8_lossy(bytes));
        }
    }
}

/// Text shown by the page content streams of a PDF, one line per text
/// object. `None` when the file cannot be parsed as a PDF at all.
pub fn read_pdf(path: &Path) -> Option<String> {
    let doc = match Document::load(path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping unreadable PDF");
            return None;
        }
    };

    let mut text = String::new();
    for (page_num, page_id) in doc.get_pages() {
        let content = match doc
            .get_page_content(page_id)
            .and_then(|data| Content::decode(&data))
        {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), page = page_num, error = %e, "skipping PDF page");
                continue;
            }
        };
        for operation in &content.operations {
            match operation.operator.as_str() {
                "Tj" | "'" | "\"" => push_strings(&mut text, &operation.operands),
                "TJ" => {
                    if let Some(Object::Array(items)) = operation.operands.first() {
                        push_strings(&mut text, items);
                    }
                }
                "ET" => text.push('\n'),
                _ => {}
            }
        }
    }
    Some(text)
}

/// Plain text, Markdown and PDF files under `docs_dir`, honouring ignore
/// files, in a stable order
pub fn collect_documents(docs_dir: &Path) -> Result<Vec<(PathBuf, String)>> {
    if !docs_dir.is_dir() {
        bail!("Documents folder {} does not exist", docs_dir.display());
    }

    let walker = WalkBuilder::new(docs_dir)
        .hidden(true)
        .git_ignore(true)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut documents = Vec::new();
    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let content = if extension == PDF_EXTENSION {
            match read_pdf(path) {
                Some(text) => text,
                None => continue,
            }
        } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            let bytes =
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            continue;
        };
        if content.trim().is_empty() {
            continue;
        }
        documents.push((path.to_path_buf(), content));
    }
    Ok(documents)
}

/// Chunk, embed and index every document under `docs_dir`, replacing the
/// index in `index_dir`. The previous index stays readable until the new
/// one is complete.
pub async fn ingest(
    docs_dir: &Path,
    index_dir: &Path,
    embedder: &dyn Embedder,
    options: IngestOptions,
) -> Result<IngestReport> {
    let documents = collect_documents(docs_dir)?;

    let mut texts = Vec::new();
    let mut meta = Vec::new();
    for (path, content) in &documents {
        let chunks = chunk_text(content, options.chunk_size, options.chunk_overlap);
        debug!(source = %path.display(), chunks = chunks.len(), "chunked document");
        for chunk in chunks {
            texts.push(chunk);
            meta.push(ChunkMeta {
                source: path.display().to_string(),
            });
        }
    }

    if texts.is_empty() {
        bail!(
            "No .pdf/.txt/.md content found in {}. Add documents, then rerun ingest.",
            docs_dir.display()
        );
    }

    info!(files = documents.len(), chunks = texts.len(), "embedding chunks");
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(options.batch_size.max(1)) {
        let embedded = embedder
            .embed(batch.to_vec())
            .await
            .context("Failed to embed document chunks")?;
        if embedded.len() != batch.len() {
            bail!(
                "Embedding service returned {} vectors for {} chunks",
                embedded.len(),
                batch.len()
            );
        }
        vectors.extend(embedded);
    }

    let dimension = vectors.first().map_or(0, Vec::len);
    let mut index = VectorIndex::new(dimension);
    for ((text, meta), vector) in texts.into_iter().zip(meta).zip(vectors) {
        index.add(text, meta, vector)?;
    }
    let index_path = index.save(index_dir)?;
    info!(path = %index_path.display(), items = index.len(), "index built");

    Ok(IngestReport {
        files: documents.len(),
        chunks: index.len(),
        index_path,
    })
}
