//! Deterministic chunk planning.
//!
//! Within each selected chapter, sentences are accumulated greedily into a
//! chunk until the next sentence would push it past `max_words`. A chunk is
//! never closed while it holds fewer than `min_words` words, except for the
//! last chunk of a chapter. Sentences are atomic, so a single sentence longer
//! than `max_words` forms a chunk on its own.
//!
//! Chunk indices are assigned in document order: chapters in selection order,
//! chunks in text order. Exceeding `max_total_chunks` is an error, never a
//! truncation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::sentence::{split_sentences, word_count};
use crate::config::ChunkingConfig;
use crate::document::SourceDocument;

// ---------------------------------------------------------------------------
// PlanningError
// ---------------------------------------------------------------------------

/// Reasons a plan cannot be produced. All are fatal to job start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("invalid chunk bounds: min_words={min} max_words={max}")]
    InvalidBounds { min: usize, max: usize },

    #[error("no chapters selected")]
    EmptySelection,

    #[error("selected chapter {0} does not exist")]
    UnknownChapter(usize),

    #[error("chapter {0} selected more than once")]
    DuplicateChapter(usize),

    #[error("selected chapters contain no speakable text")]
    NoContent,

    #[error("plan exceeds the limit of {limit} chunks")]
    TooManyChunks { limit: usize },
}

// ---------------------------------------------------------------------------
// Chunk / ChunkPlan
// ---------------------------------------------------------------------------

/// One bounded, sentence-aligned unit of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the final ordering; plans always cover `0..len`.
    pub index: usize,
    /// `order` of the source chapter.
    pub chapter_order: usize,
    /// Position of the source chapter within the selection.
    pub chapter_slot: usize,
    pub text: String,
    pub word_count: usize,
}

/// A selected chapter and the range of chunks it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChapter {
    pub order: usize,
    pub title: String,
    pub first_chunk: usize,
    pub chunk_count: usize,
}

/// Output of [`ChunkPlanner::plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    /// Selected chapters in selection order, including those that produced
    /// no chunks.
    pub chapters: Vec<PlannedChapter>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Title of the chapter that `chunk` belongs to.
    pub fn chapter_title(&self, chunk: &Chunk) -> &str {
        self.chapters
            .get(chunk.chapter_slot)
            .map(|c| c.title.as_str())
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// ChunkPlanner
// ---------------------------------------------------------------------------

/// Splits selected chapters into an ordered chunk sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlanner {
    pub min_words: usize,
    pub max_words: usize,
    pub max_total_chunks: usize,
    pub normalize: bool,
}

impl ChunkPlanner {
    pub fn new(min_words: usize, max_words: usize, max_total_chunks: usize) -> Self {
        Self {
            min_words,
            max_words,
            max_total_chunks,
            normalize: false,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            min_words: config.min_words,
            max_words: config.max_words,
            max_total_chunks: config.max_total_chunks,
            normalize: config.normalize_text,
        }
    }

    /// Plan chunks for `selected` chapter orders of `document`.
    pub fn plan(
        &self,
        document: &SourceDocument,
        selected: &[usize],
    ) -> Result<ChunkPlan, PlanningError> {
        if self.max_words == 0 || self.min_words > self.max_words {
            return Err(PlanningError::InvalidBounds {
                min: self.min_words,
                max: self.max_words,
            });
        }
        if selected.is_empty() {
            return Err(PlanningError::EmptySelection);
        }

        let mut seen = HashSet::new();
        for &order in selected {
            if document.chapter(order).is_none() {
                return Err(PlanningError::UnknownChapter(order));
            }
            if !seen.insert(order) {
                return Err(PlanningError::DuplicateChapter(order));
            }
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut chapters = Vec::with_capacity(selected.len());

        for (slot, &order) in selected.iter().enumerate() {
            let chapter = document
                .chapter(order)
                .ok_or(PlanningError::UnknownChapter(order))?;
            let first_chunk = chunks.len();

            let mut current: Vec<String> = Vec::new();
            let mut current_words = 0usize;

            for sentence in split_sentences(&chapter.text, self.normalize) {
                let words = word_count(&sentence);
                let would_overflow = current_words + words > self.max_words;
                if would_overflow && !current.is_empty() && current_words >= self.min_words {
                    self.close(&mut chunks, &mut current, &mut current_words, order, slot)?;
                }
                current.push(sentence);
                current_words += words;
            }
            if !current.is_empty() {
                self.close(&mut chunks, &mut current, &mut current_words, order, slot)?;
            }

            chapters.push(PlannedChapter {
                order,
                title: chapter.title.clone(),
                first_chunk,
                chunk_count: chunks.len() - first_chunk,
            });
        }

        if chunks.is_empty() {
            return Err(PlanningError::NoContent);
        }

        log::debug!(
            "planner: {} chunks across {} chapters",
            chunks.len(),
            chapters.len()
        );
        Ok(ChunkPlan { chunks, chapters })
    }

    fn close(
        &self,
        chunks: &mut Vec<Chunk>,
        current: &mut Vec<String>,
        current_words: &mut usize,
        chapter_order: usize,
        chapter_slot: usize,
    ) -> Result<(), PlanningError> {
        if chunks.len() >= self.max_total_chunks {
            return Err(PlanningError::TooManyChunks {
                limit: self.max_total_chunks,
            });
        }
        chunks.push(Chunk {
            index: chunks.len(),
            chapter_order,
            chapter_slot,
            text: current.join(" "),
            word_count: *current_words,
        });
        current.clear();
        *current_words = 0;
        Ok(())
    }
}

/// Free-function form of [`ChunkPlanner::plan`] without text normalisation.
pub fn plan(
    document: &SourceDocument,
    selected_chapters: &[usize],
    min_words: usize,
    max_words: usize,
    max_total_chunks: usize,
) -> Result<ChunkPlan, PlanningError> {
    ChunkPlanner::new(min_words, max_words, max_total_chunks).plan(document, selected_chapters)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
