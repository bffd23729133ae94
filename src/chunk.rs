//! Overlapping fixed-size context windows.
//!
//! Splits a text blob into windows of `chunk_size` characters, each prefixed
//! with the [`OVERLAP_SIZE`] characters that precede it so a concept that
//! straddles a boundary is seen whole by at least one request.
//!
//! Lengths and offsets are counted in Unicode scalar values, not bytes.

/// Characters carried over from the previous window.
pub const OVERLAP_SIZE: usize = 200;

/// Windows shorter than this are boundary noise and never dispatched.
pub const MIN_WINDOW_CHARS: usize = 20;

/// Approximate chars-per-token ratio used by [`count_tokens`].
const CHARS_PER_TOKEN: usize = 4;

/// A contiguous slice of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    /// Position in the window sequence, starting at 0.
    pub index: usize,
    /// Start offset in characters (inclusive).
    pub start: usize,
    /// End offset in characters (exclusive).
    pub end: usize,
    pub text: String,
}

impl ContextWindow {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the window is long enough to be worth a request.
    pub fn is_dispatchable(&self) -> bool {
        self.char_len() >= MIN_WINDOW_CHARS
    }
}

/// Split `context` into `len / chunk_size + 1` windows.
///
/// Window `i` spans `[max(0, i*chunk_size - OVERLAP_SIZE), (i+1)*chunk_size)`,
/// clamped to the text length. Returns an empty vector only when
/// `chunk_size` is 0.
pub fn chunk_windows(context: &str, chunk_size: usize) -> Vec<ContextWindow> {
    if chunk_size == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string.
    let mut boundaries: Vec<usize> = context.char_indices().map(|(pos, _)| pos).collect();
    boundaries.push(context.len());
    let char_len = boundaries.len() - 1;

    (0..char_len / chunk_size + 1)
        .map(|index| {
            let start = (index * chunk_size).saturating_sub(OVERLAP_SIZE);
            let end = ((index + 1) * chunk_size).min(char_len);
            let start = start.min(end);
            ContextWindow {
                index,
                start,
                end,
                text: context[boundaries[start]..boundaries[end]].to_string(),
            }
        })
        .collect()
}

/// Estimate the token count of `text`.
pub fn count_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}
