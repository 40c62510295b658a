//! [`SourceDocument`] model, content hashing and loaders.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised while loading a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document has no chapters")]
    NoChapters,
}

/// One chapter of extracted plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Position of the chapter in the document, starting at 0. Chapter
    /// selections refer to chapters by this value.
    pub order: usize,
    pub text: String,
    /// Size of `text` in bytes.
    pub byte_size: usize,
}

/// A parsed book: metadata plus ordered chapters. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub author: String,
    pub chapters: Vec<Chapter>,
    /// Image embedded as the audiobook cover. Not part of
    /// [`content_hash`](Self::content_hash): it never changes the audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RawDocument {
    title: String,
    #[serde(default = "unknown_author")]
    author: String,
    chapters: Vec<RawChapter>,
    /// Relative paths are resolved against the document's directory.
    #[serde(default)]
    cover: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RawChapter {
    title: String,
    text: String,
}

fn unknown_author() -> String {
    "Unknown".into()
}

impl SourceDocument {
    /// Build a document from `(title, text)` pairs; order and byte size are
    /// derived from position and content.
    pub fn new<I, T, X>(title: impl Into<String>, author: impl Into<String>, chapters: I) -> Self
    where
        I: IntoIterator<Item = (T, X)>,
        T: Into<String>,
        X: Into<String>,
    {
        let chapters = chapters
            .into_iter()
            .enumerate()
            .map(|(order, (title, text))| {
                let text: String = text.into();
                Chapter {
                    title: title.into(),
                    order,
                    byte_size: text.len(),
                    text,
                }
            })
            .collect();

        Self {
            title: title.into(),
            author: author.into(),
            chapters,
            cover_image: None,
        }
    }

    pub fn with_cover(mut self, cover: impl Into<PathBuf>) -> Self {
        self.cover_image = Some(cover.into());
        self
    }

    /// Look up a chapter by its `order`.
    pub fn chapter(&self, order: usize) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.order == order)
    }

    /// Orders of every chapter, in document order.
    pub fn all_chapter_orders(&self) -> Vec<usize> {
        self.chapters.iter().map(|c| c.order).collect()
    }

    /// SHA-256 over title, author and every chapter's title and text, as hex.
    ///
    /// Fields are length-prefixed so that moving text across a boundary
    /// always changes the hash.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        field(self.title.as_bytes());
        field(self.author.as_bytes());
        for chapter in &self.chapters {
            field(chapter.title.as_bytes());
            field(chapter.text.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    // -----------------------------------------------------------------------
    // Loaders
    // -----------------------------------------------------------------------

    /// Load a document from disk: `.json` files are parsed as JSON, anything
    /// else as heading-delimited plain text.
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut doc = if is_json {
            Self::from_json_str(&content)?
        } else {
            let fallback_title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Untitled".into());
            Self::from_plain_text(&content, &fallback_title)
        };

        if doc.chapters.is_empty() {
            return Err(DocumentError::NoChapters);
        }
        if let (Some(cover), Some(base)) = (doc.cover_image.as_mut(), path.parent()) {
            if cover.is_relative() {
                *cover = base.join(&*cover);
            }
        }
        log::info!(
            "document: loaded {:?} by {:?} ({} chapters)",
            doc.title,
            doc.author,
            doc.chapters.len()
        );
        Ok(doc)
    }

    /// Parse the JSON document format.
    pub fn from_json_str(content: &str) -> Result<Self, DocumentError> {
        let raw: RawDocument = serde_json::from_str(content)?;
        let mut doc = Self::new(
            raw.title,
            raw.author,
            raw.chapters.into_iter().map(|c| (c.title, c.text)),
        );
        doc.cover_image = raw.cover;
        Ok(doc)
    }

    /// Parse heading-delimited plain text.
    ///
    /// Leading `Title:` / `Author:` lines set the metadata. Each line starting
    /// with `# ` opens a chapter named by the rest of the line. Non-blank text
    /// before the first heading becomes an "Introduction" chapter; a file with
    /// no headings at all becomes a single chapter named after the book.
    pub fn from_plain_text(content: &str, fallback_title: &str) -> Self {
        let mut title = fallback_title.to_string();
        let mut author = unknown_author();
        let mut chapters: Vec<(String, String)> = Vec::new();
        let mut current_title: Option<String> = None;
        let mut body = String::new();
        let mut in_header = true;

        for line in content.lines() {
            if in_header {
                if let Some(v) = line.strip_prefix("Title:") {
                    title = v.trim().to_string();
                    continue;
                }
                if let Some(v) = line.strip_prefix("Author:") {
                    author = v.trim().to_string();
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                in_header = false;
            }

            if let Some(heading) = line.strip_prefix("# ") {
                match current_title.take() {
                    Some(t) => chapters.push((t, std::mem::take(&mut body))),
                    None if !body.trim().is_empty() => {
                        chapters.push(("Introduction".into(), std::mem::take(&mut body)));
                    }
                    None => body.clear(),
                }
                current_title = Some(heading.trim().to_string());
                continue;
            }

            body.push_str(line);
            body.push('\n');
        }

        match current_title {
            Some(t) => chapters.push((t, body)),
            None if !body.trim().is_empty() => chapters.push((title.clone(), body)),
            None => {}
        }

        let chapters = chapters
            .into_iter()
            .map(|(t, text)| (t, text.trim().to_string()));
        Self::new(title, author, chapters)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
