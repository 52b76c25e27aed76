//! Word-window chunking with configurable size and overlap.

use finrag_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{Chunk, Section};

/// Window size and overlap, both in words.
///
/// Larger windows keep multi-sentence facts together but dilute what one
/// vector says about them. Larger overlap lowers the chance of cutting a fact
/// at a boundary and costs proportionally more chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingParams {
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    params: ChunkingParams,
}

impl Chunker {
    /// Rejects `overlap >= chunk_size` and a zero size.
    pub fn new(chunk_size: usize, overlap: usize) -> AppResult<Self> {
        Self::from_params(ChunkingParams {
            chunk_size,
            overlap,
        })
    }

    pub fn from_params(params: ChunkingParams) -> AppResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> ChunkingParams {
        self.params
    }

    /// Lazily split one section. Windows start every `chunk_size - overlap`
    /// words; the first window that reaches the end of the section is the last.
    pub fn chunk<'a>(&self, document_id: &'a str, section: &'a Section) -> SectionChunks<'a> {
        SectionChunks {
            document_id,
            section,
            words: word_spans(&section.text),
            params: self.params,
            next: Some(0),
        }
    }
}

/// Iterator over the chunks of one section.
#[derive(Debug)]
pub struct SectionChunks<'a> {
    document_id: &'a str,
    section: &'a Section,
    /// Byte range of every whitespace-delimited word.
    words: Vec<(usize, usize)>,
    params: ChunkingParams,
    next: Option<usize>,
}

impl Iterator for SectionChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let word_start = self.next?;
        if word_start >= self.words.len() {
            self.next = None;
            return None;
        }

        let word_end = (word_start + self.params.chunk_size).min(self.words.len());
        self.next = if word_end == self.words.len() {
            None
        } else {
            Some(word_start + self.params.step())
        };

        let byte_start = self.words[word_start].0;
        let byte_end = self.words[word_end - 1].1;
        let text = &self.section.text[byte_start..byte_end];

        Some(Chunk {
            id: chunk_id(self.document_id, self.section.ordinal, word_start),
            document_id: self.document_id.to_string(),
            section_label: self.section.label.clone(),
            section_ordinal: self.section.ordinal,
            word_start,
            word_end,
            page_start: self.section.page_at(byte_start),
            page_end: self.section.page_at(byte_end.saturating_sub(1)),
            text: text.to_string(),
            content_hash: content_hash(text.as_bytes()),
        })
    }
}

/// `{document_id}:{section_ordinal}:{word_offset}`
pub fn chunk_id(document_id: &str, section_ordinal: usize, word_offset: usize) -> String {
    format!("{}:{}:{}", document_id, section_ordinal, word_offset)
}

/// SHA-256 hex digest.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, idx));
                start = None;
            }
            (false, None) => start = Some(idx),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(words: usize) -> Section {
        let text = (0..words)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        Section {
            label: "Item 1A. Risk Factors".to_string(),
            ordinal: 1,
            page_start: 1,
            page_end: 1,
            page_breaks: Vec::new(),
            text,
        }
    }

    #[test]
    fn test_chunk_counts() {
        let chunker = Chunker::new(200, 50).unwrap();
        assert_eq!(chunker.chunk("doc", &section(500)).count(), 3);
        assert_eq!(chunker.chunk("doc", &section(300)).count(), 2);
    }

    #[test]
    fn test_short_section_yields_one_chunk() {
        let chunker = Chunker::new(200, 50).unwrap();
        let s = section(12);
        let chunks: Vec<Chunk> = chunker.chunk("doc", &s).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, s.text);
        assert_eq!(chunks[0].word_count(), 12);
    }

    #[test]
    fn test_empty_section_yields_nothing() {
        let chunker = Chunker::new(10, 2).unwrap();
        let mut s = section(0);
        s.text = "   ".to_string();
        assert_eq!(chunker.chunk("doc", &s).count(), 0);
    }

    #[test]
    fn test_windows_cover_section_with_overlap() {
        let chunker = Chunker::new(200, 50).unwrap();
        let s = section(500);
        let chunks: Vec<Chunk> = chunker.chunk("doc", &s).collect();

        assert_eq!(chunks[0].word_start, 0);
        assert_eq!(chunks.last().unwrap().word_end, 500);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].word_end - pair[1].word_start, 50);
        }
        for chunk in &chunks {
            assert!(chunk.word_count() <= 200);
            assert!(chunk.text.split_whitespace().count() <= 200);
        }
    }

    #[test]
    fn test_ids_are_deterministic() {
        let chunker = Chunker::new(200, 50).unwrap();
        let s = section(300);
        let first: Vec<String> = chunker.chunk("0001-23", &s).map(|c| c.id).collect();
        let second: Vec<String> = chunker.chunk("0001-23", &s).map(|c| c.id).collect();
        assert_eq!(first, vec!["0001-23:1:0", "0001-23:1:150"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        assert!(Chunker::new(100, 100).unwrap_err().is_config());
        assert!(Chunker::new(100, 150).unwrap_err().is_config());
        assert!(Chunker::new(0, 0).unwrap_err().is_config());
    }

    #[test]
    fn test_page_span_follows_breaks() {
        let mut s = section(10);
        let fifth_word = s.text.match_indices(' ').nth(4).unwrap().0;
        s.page_start = 3;
        s.page_breaks = vec![fifth_word];
        s.page_end = 4;

        let chunker = Chunker::new(4, 1).unwrap();
        let chunks: Vec<Chunk> = chunker.chunk("doc", &s).collect();
        assert_eq!((chunks[0].page_start, chunks[0].page_end), (3, 3));
        assert_eq!((chunks[1].page_start, chunks[1].page_end), (3, 4));
        assert_eq!(chunks.last().unwrap().page_end, 4);
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
