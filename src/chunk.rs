//! Sliding-window text chunker.
//!
//! Splits extracted document text into overlapping fixed-size pieces.
//! Window and overlap are measured in characters; cut points are nudged
//! back to whitespace where possible so fragments do not split words.
//! Chunking is deterministic: identical input and configuration always
//! produce identical pieces and offsets.

/// A chunk of text plus its character offsets within the source.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPiece {
    pub text: String,
    pub offset_start: usize,
    pub offset_end: usize,
}

/// Split `text` into pieces of at most `chunk_size` characters, with
/// consecutive pieces sharing `overlap` characters. `overlap` must be
/// smaller than `chunk_size` (validated at config load).
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<TextPiece> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total == 0 {
        return Vec::new();
    }
    if total <= chunk_size {
        return vec![TextPiece {
            text: text.to_string(),
            offset_start: 0,
            offset_end: total,
        }];
    }

    let step = chunk_size - overlap;
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < total {
        let hard_end = (start + chunk_size).min(total);

        // Prefer breaking on whitespace, but never shrink below the overlap
        // span or consecutive pieces would stop being contiguous.
        let end = if hard_end < total {
            find_break(&chars, start + overlap.max(1), hard_end)
        } else {
            hard_end
        };

        let piece_text: String = chars[start..end].iter().collect();
        let trimmed = piece_text.trim();
        if !trimmed.is_empty() {
            pieces.push(TextPiece {
                text: piece_text,
                offset_start: start,
                offset_end: end,
            });
        }

        if end == total {
            break;
        }
        start += step.min(end.saturating_sub(start)).max(1);
    }

    pieces
}

/// Scan backwards from `hard_end` for a whitespace boundary, stopping at
/// `floor`. Falls back to the hard cut when the window has no whitespace.
fn find_break(chars: &[char], floor: usize, hard_end: usize) -> usize {
    let mut i = hard_end;
    while i > floor {
        if chars[i - 1].is_whitespace() {
            return i;
        }
        i -= 1;
    }
    hard_end
}
