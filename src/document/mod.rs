//! Source documents handed to the conversion pipeline.
//!
//! Parsing structured archives is out of scope; this module only models the
//! already-extracted result ([`SourceDocument`]) and provides two small
//! loaders for it:
//!
//! * JSON: `{"title": .., "author": .., "chapters": [{"title": .., "text": ..}]}`
//! * plain text, where a line starting with `# ` opens a new chapter
//!
//! [`normalize_for_speech`] is the text clean-up applied before chunking.

pub mod normalize;
pub mod source;

pub use normalize::normalize_for_speech;
pub use source::{Chapter, DocumentError, SourceDocument};
