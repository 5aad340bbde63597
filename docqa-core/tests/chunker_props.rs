//! Property tests for the sliding-window chunker.

use proptest::prelude::*;
use uuid::Uuid;

use docqa_core::TokenChunker;

/// "foo" followed by repetitions of " foo": one cl100k_base token per word.
fn words(count: usize) -> String {
    let mut text = String::from("foo");
    for _ in 1..count {
        text.push_str(" foo");
    }
    text
}

/// (chunk_size, overlap) pairs with overlap strictly smaller than size.
fn window_params() -> impl Strategy<Value = (usize, usize)> {
    (2usize..=64).prop_flat_map(|size| (Just(size), 0usize..size))
}

proptest! {
    #[test]
    fn chunks_tile_the_token_sequence((size, overlap) in window_params(), count in 1usize..400) {
        let chunker = TokenChunker::new(size, overlap).unwrap();
        let chunks = chunker.chunk(Uuid::new_v4(), &words(count)).unwrap();

        prop_assert!(!chunks.is_empty());
        prop_assert_eq!(chunks[0].token_start, 0);
        prop_assert_eq!(chunks[0].overlap_with_previous, 0);

        // Non-overlap regions cover every token exactly once, in order.
        let mut covered = 0;
        for chunk in &chunks {
            prop_assert_eq!(chunk.token_start + chunk.overlap_with_previous, covered);
            prop_assert!(chunk.token_end > chunk.token_start);
            covered = chunk.token_end;
        }
        prop_assert_eq!(covered, count);
    }

    #[test]
    fn window_bounds_hold((size, overlap) in window_params(), count in 1usize..400) {
        let chunker = TokenChunker::new(size, overlap).unwrap();
        let chunks = chunker.chunk(Uuid::new_v4(), &words(count)).unwrap();

        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, i);
            prop_assert!(chunk.token_count <= size);
            prop_assert_eq!(chunk.token_count, chunk.token_end - chunk.token_start);
            if i > 0 {
                // Interior windows are full-sized, so the shared region is
                // exactly the configured overlap.
                prop_assert_eq!(chunk.overlap_with_previous, overlap);
            }
        }
        // Every window except the last is full-sized.
        for chunk in &chunks[..chunks.len() - 1] {
            prop_assert_eq!(chunk.token_count, size);
        }
    }

    #[test]
    fn chunking_is_deterministic((size, overlap) in window_params(), count in 1usize..200) {
        let chunker = TokenChunker::new(size, overlap).unwrap();
        let text = words(count);
        let a = chunker.chunk(Uuid::new_v4(), &text).unwrap();
        let b = chunker.chunk(Uuid::new_v4(), &text).unwrap();

        prop_assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            prop_assert_eq!(&x.text, &y.text);
            prop_assert_eq!(x.token_start, y.token_start);
            prop_assert_eq!(x.token_end, y.token_end);
        }
    }
}
