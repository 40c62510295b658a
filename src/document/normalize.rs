//! Text clean-up applied to chapter text before it is chunked.
//!
//! Speech engines read typographic punctuation and markup characters
//! literally, and stumble over abbreviations whose trailing period looks like
//! a sentence end. [`normalize_for_speech`] rewrites those into plain,
//! speakable text and collapses all whitespace to single spaces.

/// Abbreviations expanded before sentence splitting, longest match first
/// where prefixes overlap (`Mrs.` before `Mr.`).
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("Mrs.", "Missus"),
    ("Mr.", "Mister"),
    ("Ms.", "Miss"),
    ("Dr.", "Doctor"),
    ("Prof.", "Professor"),
    ("St.", "Saint"),
    ("etc.", "et cetera"),
    ("vs.", "versus"),
    ("i.e.", "that is"),
    ("e.g.", "for example"),
];

/// Markup characters dropped outright.
const STRIPPED: &[char] = &['*', '_', '[', ']', '(', ')', '~', '`', '#'];

/// Normalise `text` for speech synthesis.
///
/// ```
/// use audiobook_converter::document::normalize_for_speech;
///
/// let out = normalize_for_speech("“Hello,” said Dr. Who — *twice*…");
/// assert_eq!(out, "\"Hello,\" said Doctor Who - twice...");
/// ```
pub fn normalize_for_speech(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => out.push('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' => out.push('\''),
            '\u{2014}' | '\u{2013}' => out.push_str(" - "),
            '\u{2026}' => out.push_str("..."),
            c if STRIPPED.contains(&c) => {}
            c => out.push(c),
        }
    }

    let mut expanded = out;
    for (abbr, full) in ABBREVIATIONS {
        expanded = replace_word_prefixed(&expanded, abbr, full);
    }

    expanded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace `needle` with `replacement` only where `needle` is not preceded by
/// an alphanumeric character, so `Mr.` inside `DMr.` is left alone.
fn replace_word_prefixed(haystack: &str, needle: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(pos) = rest.find(needle) {
        let preceded_by_word = rest[..pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric());
        out.push_str(&rest[..pos]);
        if preceded_by_word {
            out.push_str(needle);
        } else {
            out.push_str(replacement);
        }
        rest = &rest[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}
