/// Truncate a string to a maximum character count, appending "..." when cut
/// (UTF-8 safe).
#[inline]
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", truncated)
}

/// Keep the head of a string, appending "..." when cut. The result never
/// exceeds `max_chars` characters.
#[inline]
pub fn head_chars(s: &str, max_chars: usize) -> String {
    truncate_chars(s, max_chars)
}

/// Keep the tail of a string, prefixing "..." when cut. Used for paths where
/// the filename end matters more than the directory prefix.
#[inline]
pub fn tail_chars(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let tail: String = s.chars().skip(char_count - keep).collect();
    format!("...{}", tail)
}
