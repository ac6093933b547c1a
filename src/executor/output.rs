//! Tail-preserving output truncation.
//!
//! Agent conclusions live at the end of the transcript, so truncation drops
//! leading lines first, then repeatedly keeps the second half of the text
//! until it fits the byte budget.

pub const DEFAULT_MAX_BYTES: usize = 50 * 1024;
pub const DEFAULT_MAX_LINES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedOutput {
    pub output: String,
    pub truncated: bool,
}

pub fn truncate_output(output: &str, max_bytes: usize, max_lines: usize) -> TruncatedOutput {
    let mut truncated = false;

    let lines: Vec<&str> = output.split('\n').collect();
    let mut text = if lines.len() > max_lines {
        truncated = true;
        lines[lines.len() - max_lines..].join("\n")
    } else {
        output.to_string()
    };

    while text.len() > max_bytes && !text.is_empty() {
        truncated = true;
        let mut mid = (text.len() / 2).max(1);
        while !text.is_char_boundary(mid) {
            mid += 1;
        }
        text = text.split_off(mid);
    }

    TruncatedOutput { output: text, truncated }
}

pub fn truncate_output_default(output: &str) -> TruncatedOutput {
    truncate_output(output, DEFAULT_MAX_BYTES, DEFAULT_MAX_LINES)
}
