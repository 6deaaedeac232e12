//! Property-based tests for content splitting.
//!
//! - Concatenating chunks reproduces the input byte-for-byte
//! - Every chunk is non-empty, within the byte cap, and valid UTF-8 on its own
//! - Content at or under the cap comes back as a single identical chunk

use proptest::prelude::*;

use crate::splitter::{Chunk, split_content};

fn markup() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z ]{0,40}".prop_map(|text| format!("<p>{text}</p>")),
            "[a-zé漢]{0,12}".prop_map(|text| format!("<li>{text}</li>")),
            "\\PC{0,24}".prop_map(|text| format!("<td>{text}</td>")),
            "\\PC{0,24}",
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
    .prop_filter("splitting needs content", |content| !content.is_empty())
}

fn joined(chunks: &[Chunk]) -> String {
    chunks.iter().map(|chunk| chunk.text.as_str()).collect()
}

proptest! {
    #[test]
    fn chunks_reassemble_to_the_original(content in markup(), max in 4usize..256) {
        let chunks = split_content(content.as_bytes(), max).unwrap();
        prop_assert_eq!(joined(&chunks), content);
    }

    #[test]
    fn chunks_respect_the_byte_cap(content in markup(), max in 4usize..256) {
        let chunks = split_content(content.as_bytes(), max).unwrap();
        for chunk in &chunks {
            prop_assert!(chunk.byte_len() <= max);
            prop_assert!(chunk.byte_len() >= 1);
        }
    }

    #[test]
    fn chunk_indices_are_sequential(content in markup(), max in 4usize..256) {
        let chunks = split_content(content.as_bytes(), max).unwrap();
        for (position, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, position + 1);
        }
    }

    #[test]
    fn every_chunk_decodes_independently(content in markup(), max in 4usize..256) {
        let chunks = split_content(content.as_bytes(), max).unwrap();
        for chunk in &chunks {
            prop_assert!(std::str::from_utf8(chunk.text.as_bytes()).is_ok());
        }
    }

    #[test]
    fn content_under_the_cap_is_returned_whole(content in "\\PC{1,64}") {
        let max = content.len().max(1);
        let chunks = split_content(content.as_bytes(), max).unwrap();
        prop_assert_eq!(chunks.len(), 1);
        prop_assert_eq!(&chunks[0].text, &content);
    }

    #[test]
    fn ascii_splits_with_single_byte_windows(content in "[a-z<>/p]{2,64}") {
        let chunks = split_content(content.as_bytes(), 1).unwrap();
        prop_assert_eq!(chunks.len(), content.len());
        prop_assert_eq!(joined(&chunks), content);
    }
}
