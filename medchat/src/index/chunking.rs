//! Splitting reference text into overlapping passages for embedding.

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

const SENTENCE_BREAKS: [&str; 4] = [".", "!", "?", "\n\n"];

/// Split `text` into windows of at most `chunk_size` characters.
///
/// A window that does not reach the end of the text is cut back to the
/// first sentence break (in `SENTENCE_BREAKS` order) whose last occurrence
/// lies past 70% of the window. Consecutive windows overlap by `overlap`
/// characters. Chunks are trimmed and empty ones dropped.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    let min_break = chunk_size as f64 * 0.7;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        let mut window: String = chars[start..end].iter().collect();

        if end < chars.len() {
            for brk in SENTENCE_BREAKS {
                if let Some(byte_pos) = window.rfind(brk) {
                    let char_pos = window[..byte_pos].chars().count();
                    if char_pos as f64 > min_break {
                        let keep = char_pos + brk.chars().count();
                        window = window.chars().take(keep).collect();
                        end = start + keep;
                        break;
                    }
                }
            }
        }

        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= chars.len() {
            break;
        }
        // The break search keeps more than 70% of the window, so this always advances.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}
