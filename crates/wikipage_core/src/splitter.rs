//! Byte-bounded splitting of storage markup into UTF-8 chunks.
//!
//! Chunk ends never fall inside a code point, and for every chunk but the last the end is
//! pulled back to just after a closing block tag when one sits in the second half of the
//! chunk. Concatenating the chunks in order yields the input exactly.

use std::str;

use serde::Serialize;

use crate::error::AssemblyError;

/// Closing tags tried, in priority order, when choosing a split point.
pub const BLOCK_CLOSING_TAGS: [&str; 4] = ["</p>", "</li>", "</td>", "</div>"];

pub const DEFAULT_BOUNDARY_FLOOR_PERCENT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOptions {
    pub max_chunk_bytes: usize,
    /// A closing tag only moves the split point when it starts strictly past this
    /// percentage of the chunk's length in characters.
    pub boundary_floor_percent: usize,
}

impl SplitOptions {
    pub fn new(max_chunk_bytes: usize) -> Self {
        Self {
            max_chunk_bytes,
            boundary_floor_percent: DEFAULT_BOUNDARY_FLOOR_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// 1-based position in the split.
    pub index: usize,
    pub text: String,
}

impl Chunk {
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

pub fn split_content(content: &[u8], max_chunk_bytes: usize) -> Result<Vec<Chunk>, AssemblyError> {
    split_content_with(content, &SplitOptions::new(max_chunk_bytes))
}

pub fn split_content_with(
    content: &[u8],
    options: &SplitOptions,
) -> Result<Vec<Chunk>, AssemblyError> {
    if options.max_chunk_bytes == 0 {
        return Err(AssemblyError::validation("chunk size must be greater than zero"));
    }
    if content.is_empty() {
        return Err(AssemblyError::validation("content to split is empty"));
    }
    if options.boundary_floor_percent > 100 {
        return Err(AssemblyError::validation(format!(
            "boundary floor must be within 0..=100 percent, got {}",
            options.boundary_floor_percent
        )));
    }

    let total = content.len();
    if total <= options.max_chunk_bytes {
        let text = str::from_utf8(content).map_err(|error| AssemblyError::Encoding {
            offset: error.valid_up_to(),
        })?;
        return Ok(vec![Chunk {
            index: 1,
            text: text.to_string(),
        }]);
    }

    let mut chunks = Vec::with_capacity(total.div_ceil(options.max_chunk_bytes));
    let mut offset = 0usize;
    while offset < total {
        let window_end = (offset + options.max_chunk_bytes).min(total);
        let mut text = decode_prefix(&content[offset..window_end], offset)?;

        if offset + text.len() < total
            && let Some(end) = block_boundary(text, options.boundary_floor_percent)
        {
            text = &text[..end];
        }

        chunks.push(Chunk {
            index: chunks.len() + 1,
            text: text.to_string(),
        });
        offset += text.len();
    }

    Ok(chunks)
}

/// Longest prefix of `window` that decodes as UTF-8. Equivalent to retracting the window
/// end one byte at a time until the slice decodes.
fn decode_prefix(window: &[u8], offset: usize) -> Result<&str, AssemblyError> {
    match str::from_utf8(window) {
        Ok(text) => Ok(text),
        Err(error) => {
            let valid = error.valid_up_to();
            if valid == 0 {
                return Err(AssemblyError::Encoding { offset });
            }
            // valid_up_to always lands on a code-point boundary
            str::from_utf8(&window[..valid]).map_err(|_| AssemblyError::Encoding { offset })
        }
    }
}

// Positions are compared in characters so multi-byte text does not push the floor
// past tags that sit in the second half of the chunk. The returned end is a byte offset.
fn block_boundary(text: &str, floor_percent: usize) -> Option<usize> {
    let floor = text.chars().count() * floor_percent / 100;
    for tag in BLOCK_CLOSING_TAGS {
        let Some(position) = text.rfind(tag) else {
            continue;
        };
        let chars_before = text[..position].chars().count();
        if chars_before > 0 && chars_before > floor {
            return Some(position + tag.len());
        }
    }
    None
}
