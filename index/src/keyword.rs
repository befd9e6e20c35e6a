use crate::FORMAT_VERSION;
use crate::error::{IndexError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sift_chunk::{Chunk, ChunkId};
use sift_tokenizer::{Tokenizer, TokenizerMode};
use std::collections::HashMap;
use std::path::Path;

/// BM25 term-frequency saturation constant.
const K1: f32 = 1.2;

/// BM25 document-length normalization constant.
const B: f32 = 0.75;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    id: ChunkId,
    token_count: u32,
}

/// Persisted form of a [`KeywordIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct KeywordIndexFile {
    format_version: u32,
    mode: TokenizerMode,
    avg_doc_len: f32,
    docs: Vec<DocEntry>,
    postings: HashMap<String, Vec<(u32, u32)>>,
}

/// BM25 keyword index over code-aware token statistics.
///
/// Term frequencies, document frequencies, and the average chunk length are
/// all computed at build time. Queries are tokenized with the same mode the
/// index was built with; the mode travels with the persisted file so the two
/// can never drift apart.
#[derive(Debug)]
pub struct KeywordIndex {
    tokenizer: Tokenizer,
    avg_doc_len: f32,
    docs: Vec<DocEntry>,
    /// term -> [(doc index, term frequency)], doc indexes ascending.
    postings: HashMap<String, Vec<(u32, u32)>>,
}

impl KeywordIndex {
    /// Build an index over `chunks` with the given tokenization mode.
    pub fn build(chunks: &[Chunk], mode: TokenizerMode) -> Self {
        let tokenizer = Tokenizer::new(mode);
        let mut docs = Vec::with_capacity(chunks.len());
        let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
        let mut total_tokens: u64 = 0;

        for (idx, chunk) in chunks.iter().enumerate() {
            let tokens = tokenizer.tokenize(&chunk.content);
            total_tokens += tokens.len() as u64;

            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token).or_insert(0) += 1;
            }

            docs.push(DocEntry {
                id: chunk.id.clone(),
                token_count: frequencies.values().sum(),
            });
            for (term, tf) in frequencies {
                postings.entry(term).or_default().push((idx as u32, tf));
            }
        }

        for list in postings.values_mut() {
            list.sort_by_key(|(idx, _)| *idx);
        }

        let avg_doc_len = if docs.is_empty() {
            0.0
        } else {
            total_tokens as f32 / docs.len() as f32
        };

        info!(
            "Built keyword index: {} chunks, {} terms, avg length {avg_doc_len:.1}",
            docs.len(),
            postings.len()
        );
        Self {
            tokenizer,
            avg_doc_len,
            docs,
            postings,
        }
    }

    /// Top-`k` chunks by BM25 score, best-first.
    ///
    /// Empty and fully out-of-vocabulary queries return an empty list, never
    /// an error. Ties are broken by chunk id so results are deterministic.
    pub fn search(&self, query: &str, k: usize) -> Vec<(ChunkId, f32)> {
        if self.docs.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut terms = self.tokenizer.tokenize(query);
        terms.sort();
        terms.dedup();

        let corpus_size = self.docs.len() as f32;
        let mut scores: HashMap<u32, f32> = HashMap::new();

        for term in &terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };

            let df = list.len() as f32;
            let idf = (1.0 + (corpus_size - df + 0.5) / (df + 0.5)).ln();

            for (doc_idx, tf) in list {
                let doc_len = self.docs[*doc_idx as usize].token_count as f32;
                let tf = *tf as f32;
                let length_norm = if self.avg_doc_len > 0.0 {
                    1.0 - B + B * doc_len / self.avg_doc_len
                } else {
                    1.0
                };
                let contribution = idf * tf * (K1 + 1.0) / (tf + K1 * length_norm);
                *scores.entry(*doc_idx).or_insert(0.0) += contribution;
            }
        }

        let mut scored: Vec<(u32, f32)> = scores.into_iter().collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.docs[a.0 as usize].id.cmp(&self.docs[b.0 as usize].id))
        });
        scored.truncate(k);

        debug!("Keyword search returned {} results", scored.len());
        scored
            .into_iter()
            .map(|(idx, score)| (self.docs[idx as usize].id.clone(), score))
            .collect()
    }

    pub fn mode(&self) -> TokenizerMode {
        self.tokenizer.mode()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Persist the index to `path` as a versioned JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = KeywordIndexFile {
            format_version: FORMAT_VERSION,
            mode: self.tokenizer.mode(),
            avg_doc_len: self.avg_doc_len,
            docs: self.docs.clone(),
            postings: self.postings.clone(),
        };
        let payload = serde_json::to_vec(&file)?;
        std::fs::write(path, payload)?;
        info!("Saved keyword index ({} chunks) to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a previously saved index, failing loudly on anything undecodable.
    pub fn load(path: &Path) -> Result<Self> {
        let payload = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IndexError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                IndexError::Io(e)
            }
        })?;

        let file: KeywordIndexFile =
            serde_json::from_slice(&payload).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        if file.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: file.format_version,
                expected: FORMAT_VERSION,
            });
        }
        let doc_count = file.docs.len() as u32;
        for list in file.postings.values() {
            if list.iter().any(|(idx, _)| *idx >= doc_count) {
                return Err(IndexError::Corrupt(
                    "posting references a document index out of range".to_string(),
                ));
            }
        }

        info!(
            "Loaded keyword index ({} chunks) from {}",
            file.docs.len(),
            path.display()
        );
        Ok(Self {
            tokenizer: Tokenizer::new(file.mode),
            avg_doc_len: file.avg_doc_len,
            docs: file.docs,
            postings: file.postings,
        })
    }
}
