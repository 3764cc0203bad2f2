//! Property-based tests for the streaming translation layer
//!
//! Fragment reassembly must be insensitive to how the network splits the
//! SSE body into chunks: for any chunking, the parser yields the same
//! fragments in the same order, and their concatenation equals the full
//! reply text.

use super::anthropic::{SseParser, StreamEvent};
use proptest::prelude::*;

/// Render a provider-shaped SSE body carrying the given fragments
fn render_sse_body(fragments: &[String]) -> String {
    let mut body = String::from("event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
    for fragment in fragments {
        let data = serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": fragment},
        });
        body.push_str("event: content_block_delta\ndata: ");
        body.push_str(&data.to_string());
        body.push_str("\n\n");
    }
    body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body
}

fn arb_fragments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-zA-Z0-9 _.!?,:\\-]{0,40}", 0..12)
}

proptest! {
    #[test]
    fn fragments_survive_arbitrary_chunking(
        fragments in arb_fragments(),
        sizes in prop::collection::vec(1usize..16, 1..64),
    ) {
        let body = render_sse_body(&fragments);
        let bytes = body.as_bytes();

        let mut parser = SseParser::new();
        let mut collected = Vec::new();
        let mut stopped = false;

        let mut offset = 0;
        let mut size_idx = 0;
        while offset < bytes.len() {
            let take = sizes[size_idx % sizes.len()].min(bytes.len() - offset);
            size_idx += 1;
            for event in parser.feed(&bytes[offset..offset + take]) {
                match event {
                    StreamEvent::Fragment(text) => collected.push(text),
                    StreamEvent::Stop => stopped = true,
                    StreamEvent::Error(err) => prop_assert!(false, "unexpected error: {err}"),
                }
            }
            offset += take;
        }

        prop_assert!(stopped, "stream must terminate with message_stop");
        prop_assert_eq!(&collected, &fragments);
        prop_assert_eq!(collected.concat(), fragments.concat());
    }

    #[test]
    fn single_feed_matches_chunked_feed(fragments in arb_fragments()) {
        let body = render_sse_body(&fragments);

        let mut whole = SseParser::new();
        let whole_fragments: Vec<String> = whole
            .feed(body.as_bytes())
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Fragment(text) => Some(text),
                _ => None,
            })
            .collect();

        let mut chunked = SseParser::new();
        let mut chunked_fragments = Vec::new();
        for byte in body.as_bytes() {
            for event in chunked.feed(std::slice::from_ref(byte)) {
                if let StreamEvent::Fragment(text) = event {
                    chunked_fragments.push(text);
                }
            }
        }

        prop_assert_eq!(whole_fragments, chunked_fragments);
    }
}
