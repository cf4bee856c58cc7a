//! Page-tagged text extraction and chunking.

use crate::models::TextChunk;
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

/// Plain text of one page of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub document: String,
    pub page: u32,
    pub text: String,
}

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter: tries paragraph, line, then word boundaries,
/// and only cuts inside a word when nothing coarser fits.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    /// Splits every page and keeps the page locator on each chunk.
    pub fn split_pages(&self, pages: &[PageText]) -> Vec<TextChunk> {
        let chunks: Vec<TextChunk> = pages
            .iter()
            .flat_map(|p| {
                self.split_text(&p.text)
                    .into_iter()
                    .map(move |c| TextChunk::new(c, p.document.clone(), p.page))
            })
            .collect();
        debug!(pages = pages.len(), chunks = chunks.len(), "split document");
        chunks
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let finer = &separators[(idx + 1).min(separators.len())..];

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut out = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_with(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting, separator));
        }
        out
    }

    /// Packs small pieces into chunks, carrying up to `chunk_overlap` chars of
    /// trailing pieces into the next chunk.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if current.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }
            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
            total += len + joiner;
        }
        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>, separator: &str) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Display name used as the chunk locator for a file.
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extracts non-blank pages from a PDF, numbered from 1.
#[cfg(feature = "pdf")]
pub fn extract_pdf_pages(path: &Path) -> anyhow::Result<Vec<PageText>> {
    use anyhow::Context;

    let document = document_name(path);
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("failed to open PDF {}", path.display()))?;
    let mut pages = Vec::new();
    for page_num in doc.get_pages().keys() {
        let text = doc.extract_text(&[*page_num]).unwrap_or_default();
        if !text.trim().is_empty() {
            pages.push(PageText {
                document: document.clone(),
                page: *page_num,
                text,
            });
        }
    }
    if pages.is_empty() {
        // Some encodings defeat lopdf's per-page extraction.
        let text = pdf_extract::extract_text(path)
            .with_context(|| format!("failed to extract text from {}", path.display()))?;
        if !text.trim().is_empty() {
            pages.push(PageText {
                document,
                page: 1,
                text,
            });
        }
    }
    info!(path = %path.display(), pages = pages.len(), "extracted PDF text");
    Ok(pages)
}

#[cfg(not(feature = "pdf"))]
pub fn extract_pdf_pages(path: &Path) -> anyhow::Result<Vec<PageText>> {
    anyhow::bail!(
        "PDF support not compiled in (enable the `pdf` feature) for {}",
        path.display()
    )
}

/// Loads page-tagged text from a PDF, or from a plain text file where form
/// feeds separate pages.
pub fn load_document(path: &Path) -> anyhow::Result<Vec<PageText>> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if is_pdf {
        return extract_pdf_pages(path);
    }
    let text = std::fs::read_to_string(path)?;
    let document = document_name(path);
    let pages: Vec<PageText> = text
        .split('\u{c}')
        .enumerate()
        .filter(|(_, t)| !t.trim().is_empty())
        .map(|(i, t)| PageText {
            document: document.clone(),
            page: i as u32 + 1,
            text: t.to_string(),
        })
        .collect();
    info!(path = %path.display(), pages = pages.len(), "loaded text document");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 20);
        assert_eq!(
            splitter.split_text("  The parties agree.  "),
            vec!["The parties agree.".to_string()]
        );
        assert!(splitter.split_text("   ").is_empty());
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let splitter = TextSplitter::new(30, 10);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = splitter.split_text(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30, "chunk too long: {chunk:?}");
        }
        // Consecutive chunks share at least one word.
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].contains(last_word));
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(40, 0);
        let text = "1. Confidentiality applies.\n\n2. Either party may terminate.";
        let chunks = splitter.split_text(text);
        assert_eq!(
            chunks,
            vec![
                "1. Confidentiality applies.".to_string(),
                "2. Either party may terminate.".to_string()
            ]
        );
    }

    #[test]
    fn long_words_are_cut() {
        let splitter = TextSplitter::new(4, 0);
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn split_pages_keeps_locator() {
        let pages = vec![
            PageText {
                document: "msa.pdf".into(),
                page: 1,
                text: "Governing law is Delaware.".into(),
            },
            PageText {
                document: "msa.pdf".into(),
                page: 3,
                text: "Notices go to the addresses above.".into(),
            },
        ];
        let chunks = TextSplitter::default().split_pages(&pages);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].source.page, 3);
        assert_eq!(chunks[1].source.document, "msa.pdf");
    }

    #[test]
    fn text_files_split_on_form_feed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.txt");
        std::fs::write(&path, "Page one.\u{c}\u{c}Page three.").unwrap();
        let pages = load_document(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page, 3);
        assert_eq!(pages[0].document, "contract.txt");
    }
}
