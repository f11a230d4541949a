//! Splitting long text to fit the per-message size limit.

/// Telegram's limit, counted in Unicode scalar values.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Split `text` into pieces of at most [`MAX_MESSAGE_CHARS`] scalars.
pub fn chunk_message(text: &str) -> Vec<&str> {
    chunk_with_limit(text, MAX_MESSAGE_CHARS)
}

/// Prefer breaking at the last newline that keeps the piece within `limit`;
/// that newline is dropped. A line longer than `limit` is hard-split.
fn chunk_with_limit(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first scalar past the limit; None means the rest fits.
        let Some((cut, _)) = remaining.char_indices().nth(limit) else {
            chunks.push(remaining);
            break;
        };

        let window = &remaining[..cut];
        let newline = if remaining[cut..].starts_with('\n') {
            Some(cut)
        } else {
            window.rfind('\n')
        };

        match newline {
            Some(pos) if pos > 0 => {
                chunks.push(&remaining[..pos]);
                remaining = &remaining[pos + 1..];
            }
            _ => {
                chunks.push(window);
                remaining = &remaining[cut..];
            }
        }
    }

    chunks
}
