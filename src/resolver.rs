use crate::dom::{node_length, text_nodes_in};
use crate::locator::evaluate_address;
use crate::range::TextRange;
use kuchiki::NodeRef;

/// Live element addressed by `address`, or `None` when the path is malformed,
/// matches nothing, or matches a non-element.
pub fn resolve(document: &NodeRef, address: &str) -> Option<NodeRef> {
    match evaluate_address(document, address) {
        Ok(Some(node)) if node.as_element().is_some() => Some(node),
        _ => None,
    }
}

/// Rebuild the range covering `text_length` chars starting `text_offset`
/// chars into `container`'s text. All or nothing: `None` if the window does
/// not fit in the container's current text.
pub fn find_range(container: &NodeRef, text_offset: usize, text_length: usize) -> Option<TextRange> {
    if text_length == 0 {
        return None;
    }
    let nodes = text_nodes_in(container);
    let mut consumed = 0usize;
    let mut start: Option<(usize, usize)> = None;
    for (idx, node) in nodes.iter().enumerate() {
        let len = node_length(node);
        if text_offset < consumed + len {
            start = Some((idx, text_offset - consumed));
            break;
        }
        consumed += len;
    }
    let (start_idx, start_offset) = start?;

    let mut remaining = text_length;
    let mut end: Option<(usize, usize)> = None;
    for (idx, node) in nodes.iter().enumerate().skip(start_idx) {
        let from = if idx == start_idx { start_offset } else { 0 };
        let available = node_length(node) - from;
        if remaining <= available {
            end = Some((idx, from + remaining));
            break;
        }
        remaining -= available;
    }
    let (end_idx, end_offset) = end?;

    TextRange::new(
        nodes[start_idx].clone(),
        start_offset,
        nodes[end_idx].clone(),
        end_offset,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use kuchiki::traits::TendrilSink;

    fn container(doc: &NodeRef) -> NodeRef {
        resolve(doc, "/html/body/p").expect("container resolves")
    }

    #[test]
    fn selects_single_word() {
        let doc = kuchiki::parse_html().one("<p>The quick brown fox</p>");
        let range = find_range(&container(&doc), 4, 5).expect("range");
        assert_eq!(range.text(), "quick");
    }

    #[test]
    fn spans_nested_inline_element() {
        let doc = kuchiki::parse_html().one("<p>The quick <em>brown</em> fox</p>");
        let range = find_range(&container(&doc), 4, 15).expect("range");
        assert_eq!(range.text(), "quick brown fox");
        assert!(range.start().node != range.end().node);
    }

    #[test]
    fn window_ending_on_node_edge_stays_in_that_node() {
        let doc = kuchiki::parse_html().one("<p>ab<b>cd</b>ef</p>");
        let range = find_range(&container(&doc), 1, 3).expect("range");
        assert_eq!(range.text(), "bcd");
        let cd = doc
            .select_first("b")
            .expect("b")
            .as_node()
            .first_child()
            .expect("cd");
        assert!(range.end().node == cd);
        assert_eq!(range.end().offset, 2);
    }

    #[test]
    fn shrunk_content_fails_instead_of_partial_range() {
        let doc = kuchiki::parse_html().one("<p>short</p>");
        let p = container(&doc);
        assert!(find_range(&p, 9, 2).is_none());
        assert!(find_range(&p, 5, 1).is_none());
        assert!(find_range(&p, 3, 4).is_none());
        assert!(find_range(&p, 0, 0).is_none());
    }

    #[test]
    fn resolve_rejects_malformed_and_missing_paths() {
        let doc = kuchiki::parse_html().one("<p>x</p>");
        assert!(resolve(&doc, "not a path").is_none());
        assert!(resolve(&doc, "/html/body/table").is_none());
        assert!(resolve(&doc, "/").is_none());
    }

    #[test]
    fn encode_then_resolve_round_trips_text() {
        let doc = kuchiki::parse_html().one(
            r##"<html><body><article><p>Intro</p><p id="t">Alpha <a href="#">beta <b>gamma</b></a> delta</p></article></body></html>"##,
        );
        let target = doc.select_first("#t").expect("t").as_node().clone();
        let texts = text_nodes_in(&target);
        let original = TextRange::new(texts[2].clone(), 2, texts[3].clone(), 3).expect("range");
        let captured = original.text();
        assert_eq!(captured, "mma de");

        let encoded = encode(&original).expect("encode");
        assert_eq!(encoded.address, "/html/body/article/p[2]");
        let element = resolve(&doc, &encoded.address).expect("resolve");
        assert!(element == target);
        let rebuilt = find_range(&element, encoded.text_offset, encoded.text_length)
            .expect("rebuilt");
        assert_eq!(rebuilt.text(), captured);
        assert!(rebuilt.start().node == texts[2]);
        assert!(rebuilt.end().node == texts[3]);
    }
}
