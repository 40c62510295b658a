//! Metadata sanitising.
//!
//! Every free-text field that reaches the container (title, author, chapter
//! titles) goes through [`sanitize_metadata`]. File names derived from the
//! title additionally go through [`file_safe_name`].

/// Code points removed from metadata besides `char::is_control`.
const STRIPPED: &[char] = &[
    // line / paragraph separators
    '\u{2028}', '\u{2029}',
    // zero-width and byte-order marks
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}',
    // bidi marks, embeddings, overrides and isolates
    '\u{200E}', '\u{200F}', '\u{202A}', '\u{202B}', '\u{202C}', '\u{202D}', '\u{202E}',
    '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}',
    // quotes
    '"', '\'', '`', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{201C}', '\u{201D}',
    '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}',
];

/// Turn line breaks into spaces, strip control characters, bidi controls
/// and quotes, then collapse whitespace.
///
/// ```
/// use audiobook_converter::assembly::sanitize_metadata;
///
/// assert_eq!(sanitize_metadata("The \"Best\"\u{2028}Book\n"), "The Best Book");
/// ```
pub fn sanitize_metadata(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_line_break(c) { ' ' } else { c })
        .filter(|c| !c.is_control() && !STRIPPED.contains(c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Line and paragraph breaks separate words, so they turn into spaces.
fn is_line_break(c: char) -> bool {
    c.is_whitespace() && (c.is_control() || c == '\u{2028}' || c == '\u{2029}')
}

/// Characters not allowed in file names on common platforms.
const RESERVED_IN_FILE_NAMES: &[char] = &['/', '\\', ':', '*', '?', '<', '>', '|'];

const MAX_FILE_STEM_CHARS: usize = 120;

/// A file-name stem derived from `title`.
pub fn file_safe_name(title: &str) -> String {
    let sanitized = sanitize_metadata(title);
    let replaced: String = sanitized
        .chars()
        .map(|c| {
            if RESERVED_IN_FILE_NAMES.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .take(MAX_FILE_STEM_CHARS)
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "audiobook".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_every_dangerous_class() {
        let nasty = "A\u{0000}B\u{0007}C\u{001B}[31mD\u{0085}E\u{2028}F\u{2029}G\u{202E}H\u{2066}I\"J'K\u{201C}L\u{201D}";
        let out = sanitize_metadata(nasty);
        for c in out.chars() {
            assert!(!c.is_control(), "{c:?} survived");
            assert!(!STRIPPED.contains(&c), "{c:?} survived");
        }
        assert_eq!(out, "ABC[31mD E F GHIJKL");
    }

    #[test]
    fn newlines_and_tabs_become_single_spaces() {
        assert_eq!(sanitize_metadata("  Part\tOne\r\nTwo  "), "Part One Two");
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(sanitize_metadata("Chapter 1: Begin"), "Chapter 1: Begin");
    }

    #[test]
    fn file_names_drop_reserved_characters() {
        assert_eq!(file_safe_name("a/b\\c:d*e?f<g>h|i"), "a_b_c_d_e_f_g_h_i");
        assert_eq!(file_safe_name("../.."), "_");
        assert_eq!(file_safe_name("   \"\"  "), "audiobook");
        assert_eq!(file_safe_name("..."), "audiobook");
    }

    #[test]
    fn file_names_are_bounded() {
        let long = "x".repeat(500);
        assert_eq!(file_safe_name(&long).chars().count(), MAX_FILE_STEM_CHARS);
    }
}
