//! Path component sanitization for artifact and scratch directory names.

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make `input` safe to use as a single path component.
///
/// Control and reserved characters become `_` (runs collapse to one), leading
/// and trailing dots and spaces are trimmed, and an empty result becomes
/// `unnamed`. Never returns a component that could escape its parent.
pub fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
