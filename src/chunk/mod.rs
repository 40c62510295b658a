//! Chunk planning: chapter text → ordered, bounded, sentence-aligned chunks.
//!
//! # Quick start
//!
//! ```rust
//! use audiobook_converter::chunk::ChunkPlanner;
//! use audiobook_converter::document::SourceDocument;
//!
//! let doc = SourceDocument::new("Book", "Author", [("One", "First sentence. Second one.")]);
//! let plan = ChunkPlanner::new(1, 40, 1_000).plan(&doc, &[0]).unwrap();
//! assert_eq!(plan.len(), 1);
//! assert_eq!(plan.chunks[0].index, 0);
//! ```

pub mod planner;
pub mod sentence;

pub use planner::{plan, Chunk, ChunkPlan, ChunkPlanner, PlannedChapter, PlanningError};
pub use sentence::{split_sentences, word_count};
