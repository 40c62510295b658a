//! Sentence segmentation for the chunk planner.
//!
//! Paragraph breaks (one or more blank lines) are hard boundaries; inside a
//! paragraph, boundaries follow the Unicode sentence rules (UAX #29) from
//! `unicode-segmentation`.

use unicode_segmentation::UnicodeSegmentation;

use crate::document::normalize_for_speech;

/// Split `text` into trimmed, non-empty sentences in reading order.
///
/// When `normalize` is set every paragraph goes through
/// [`normalize_for_speech`] first; otherwise whitespace is only collapsed.
pub fn split_sentences(text: &str, normalize: bool) -> Vec<String> {
    let mut sentences = Vec::new();
    for paragraph in paragraphs(text) {
        let cleaned = if normalize {
            normalize_for_speech(&paragraph)
        } else {
            paragraph.split_whitespace().collect::<Vec<_>>().join(" ")
        };
        sentences.extend(
            cleaned
                .unicode_sentences()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    sentences
}

/// Number of whitespace-separated words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                out.push(std::mem::take(&mut current));
            }
            current.clear();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() {
        out.push(current);
    }
    out
}
