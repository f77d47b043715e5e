/// Ideographic (full-width) space substituted for ASCII spaces.
pub const FULL_WIDTH_SPACE: char = '\u{3000}';

/// Normalize text before tokenization.
///
/// zenz models are trained on text where spaces are full-width and line
/// breaks never appear, so:
/// - ASCII space → `U+3000`
/// - `\r` and `\n` are removed
///
/// Everything else passes through unchanged. The private-use sentinel tags
/// (U+EE00-U+EE06) are untouched.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => out.push(FULL_WIDTH_SPACE),
            '\r' | '\n' => {}
            _ => out.push(c),
        }
    }
    out
}
