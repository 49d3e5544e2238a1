use crate::dom::{
    char_len, is_engine_node, is_logical_ancestor, logical_parent, node_length, resolve_split,
    text_nodes_in,
};
use crate::locator::locate;
use crate::range::{Boundary, TextRange, compare_boundary};
use kuchiki::NodeRef;
use std::cmp::Ordering;

/// Location of a selection relative to its container element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAnchor {
    pub address: String,
    pub text_offset: usize,
    pub text_length: usize,
}

/// Nearest element holding the range start, widened until it also holds the
/// range end. Engine wrappers are skipped so the container is always something
/// that survives a re-render.
pub fn container_element(range: &TextRange) -> Option<NodeRef> {
    let start = &range.start().node;
    let mut candidate = if start.as_text().is_some() {
        resolve_split(&start.parent()?)
    } else {
        resolve_split(start)
    };
    while is_engine_node(&candidate) || !is_logical_ancestor(&candidate, &range.end().node) {
        candidate = logical_parent(&candidate)?;
    }
    if candidate.as_element().is_none() {
        return None;
    }
    Some(candidate)
}

/// Chars of container text that precede `start`, walking text nodes in
/// document order. If `start` never shows up the partial sum is returned.
pub fn text_offset_within(container: &NodeRef, start: &Boundary) -> usize {
    let mut offset = 0usize;
    for node in text_nodes_in(container) {
        if node == start.node {
            return offset + start.offset;
        }
        let node_start = Boundary::new(node.clone(), 0);
        match compare_boundary(&node_start, start) {
            Ok(Ordering::Less) => offset += node_length(&node),
            _ => break,
        }
    }
    offset
}

/// Encode a live range as address + text window. `None` when the range has no
/// container element or the container cannot be addressed.
pub fn encode(range: &TextRange) -> Option<EncodedAnchor> {
    let container = container_element(range)?;
    let address = locate(&container);
    if address.is_empty() {
        return None;
    }
    Some(EncodedAnchor {
        address,
        text_offset: text_offset_within(&container, range.start()),
        text_length: char_len(&range.text()),
    })
}
