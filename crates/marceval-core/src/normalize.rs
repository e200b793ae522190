use unicode_normalization::UnicodeNormalization;

/// Canonicalize a field value for comparison.
///
/// Steps (order matters):
/// 1. Unicode NFC, so precomposed and combining-mark spellings agree
/// 2. Lowercase
/// 3. Drop every character that is not a letter, digit or whitespace
/// 4. Collapse whitespace runs to one space and trim
/// 5. NFC again: dropping punctuation can bring a base letter next to an
///    alphabetic combining mark (U+0345) that now composes with it
///
/// `normalize(normalize(x)) == normalize(x)` for every input.
pub fn normalize(text: &str) -> String {
    let lowered = text.nfc().collect::<String>().to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else if c.is_alphanumeric() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out.nfc().collect()
}
