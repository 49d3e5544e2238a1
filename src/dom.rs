use html5ever::{LocalName, Namespace, QualName};
use kuchiki::{Attribute, ExpandedName, NodeData, NodeRef};
use std::cell::RefCell;

pub const HIGHLIGHT_CLASS: &str = "pageanchor-highlight";
pub const INDICATOR_CLASS: &str = "pageanchor-note-indicator";
pub const FALLBACK_CLASS: &str = "pageanchor-fallback";
pub const PULSE_CLASS: &str = "pageanchor-pulse";
pub const ANCHOR_ID_ATTR: &str = "data-anchor-id";
pub const SPLIT_CLASS: &str = "pageanchor-split";

// A split piece carries its own token; the element it was cut from lists the
// tokens of all its pieces, so the two can be joined again on clear.
pub(crate) const SPLIT_TOKEN_ATTR: &str = "data-anchor-split";
pub(crate) const SPLIT_SIDE_ATTR: &str = "data-anchor-split-side";
pub(crate) const SPLIT_ORIGIN_ATTR: &str = "data-anchor-split-origin";

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

pub(crate) fn new_element(tag: &str, attrs: &[(&str, String)]) -> NodeRef {
    let name = QualName::new(None, Namespace::from(HTML_NS), LocalName::from(tag));
    let node = NodeRef::new_element(name, std::iter::empty::<(ExpandedName, Attribute)>());
    if let Some(element) = node.as_element() {
        let mut attributes = element.attributes.borrow_mut();
        for (key, value) in attrs {
            attributes.insert(*key, value.clone());
        }
    }
    node
}

pub(crate) fn new_fragment() -> NodeRef {
    NodeRef::new(NodeData::DocumentFragment)
}

/// Copy of `node` without its children.
pub(crate) fn shallow_clone(node: &NodeRef) -> NodeRef {
    match node.data() {
        NodeData::Element(element) => {
            let attrs = element.attributes.borrow().map.clone();
            NodeRef::new_element(element.name.clone(), attrs)
        }
        NodeData::Text(text) => NodeRef::new_text(text.borrow().clone()),
        NodeData::Comment(text) => NodeRef::new_comment(text.borrow().clone()),
        _ => new_fragment(),
    }
}

pub(crate) fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|element| element.name.local.as_ref().to_ascii_lowercase())
}

pub(crate) fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attrs = element.attributes.borrow();
    attrs.get(name).map(str::to_string)
}

pub(crate) fn set_attr(node: &NodeRef, name: &str, value: impl Into<String>) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().insert(name, value.into());
    }
}

pub(crate) fn remove_attr(node: &NodeRef, name: &str) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().remove(name);
    }
}

pub fn has_class(node: &NodeRef, class: &str) -> bool {
    let Some(element) = node.as_element() else {
        return false;
    };
    let attrs = element.attributes.borrow();
    attrs
        .get("class")
        .map(|value| value.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

pub(crate) fn add_class(node: &NodeRef, class: &str) {
    if has_class(node, class) {
        return;
    }
    let Some(element) = node.as_element() else {
        return;
    };
    let mut attrs = element.attributes.borrow_mut();
    let next = match attrs.get("class") {
        Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
        _ => class.to_string(),
    };
    attrs.insert("class", next);
}

pub(crate) fn remove_class(node: &NodeRef, class: &str) {
    let Some(element) = node.as_element() else {
        return;
    };
    let mut attrs = element.attributes.borrow_mut();
    let Some(existing) = attrs.get("class").map(str::to_string) else {
        return;
    };
    let kept: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
    if kept.is_empty() {
        attrs.remove("class");
    } else {
        attrs.insert("class", kept.join(" "));
    }
}

/// Nodes this crate renders into the page. They are invisible to structural addressing.
pub fn is_engine_node(node: &NodeRef) -> bool {
    has_class(node, HIGHLIGHT_CLASS)
        || has_class(node, INDICATOR_CLASS)
        || has_class(node, FALLBACK_CLASS)
        || has_class(node, SPLIT_CLASS)
}

fn tree_root(node: &NodeRef) -> NodeRef {
    node.inclusive_ancestors()
        .last()
        .unwrap_or_else(|| node.clone())
}

pub(crate) fn split_tokens(node: &NodeRef) -> Vec<String> {
    attr(node, SPLIT_ORIGIN_ATTR)
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn set_split_tokens(node: &NodeRef, tokens: &[String]) {
    if tokens.is_empty() {
        remove_attr(node, SPLIT_ORIGIN_ATTR);
    } else {
        set_attr(node, SPLIT_ORIGIN_ATTR, tokens.join(" "));
    }
}

/// Element a split piece was cut from, if it is still in the same tree.
pub(crate) fn split_original(piece: &NodeRef) -> Option<NodeRef> {
    if !has_class(piece, SPLIT_CLASS) {
        return None;
    }
    let token = attr(piece, SPLIT_TOKEN_ATTR)?;
    tree_root(piece)
        .descendants()
        .find(|node| split_tokens(node).iter().any(|t| *t == token))
}

fn is_split_piece(node: &NodeRef) -> bool {
    split_original(node).is_some()
}

/// The element `node` stands for: itself, or the element its split piece
/// was cut from (following pieces of pieces).
pub(crate) fn resolve_split(node: &NodeRef) -> NodeRef {
    let mut current = node.clone();
    while let Some(original) = split_original(&current) {
        current = original;
    }
    current
}

/// Pieces cut from `original`: leading pieces first, trailing pieces after,
/// each group in document order.
fn split_pieces(original: &NodeRef) -> (Vec<NodeRef>, Vec<NodeRef>) {
    let tokens = split_tokens(original);
    if tokens.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mut leading = Vec::new();
    let mut trailing = Vec::new();
    for node in tree_root(original).descendants() {
        if !has_class(&node, SPLIT_CLASS) {
            continue;
        }
        let Some(token) = attr(&node, SPLIT_TOKEN_ATTR) else {
            continue;
        };
        if !tokens.contains(&token) {
            continue;
        }
        if attr(&node, SPLIT_SIDE_ATTR).as_deref() == Some("end") {
            leading.push(node);
        } else {
            trailing.push(node);
        }
    }
    (leading, trailing)
}

/// Children of `node` with the content of its split pieces joined back in.
pub(crate) fn logical_children(node: &NodeRef) -> Vec<NodeRef> {
    let (leading, trailing) = split_pieces(node);
    let mut out = Vec::new();
    for piece in &leading {
        out.extend(logical_children(piece));
    }
    out.extend(node.children());
    for piece in &trailing {
        out.extend(logical_children(piece));
    }
    out
}

/// Parent of `node`, reading a split piece as the element it was cut from.
pub(crate) fn logical_parent(node: &NodeRef) -> Option<NodeRef> {
    node.parent().map(|parent| resolve_split(&parent))
}

pub(crate) fn is_logical_ancestor(ancestor: &NodeRef, node: &NodeRef) -> bool {
    let mut current = Some(resolve_split(node));
    while let Some(candidate) = current {
        if candidate == *ancestor {
            return true;
        }
        current = logical_parent(&candidate);
    }
    false
}

/// Nearest ancestor that is not an engine node.
pub(crate) fn structural_parent(node: &NodeRef) -> Option<NodeRef> {
    let mut current = logical_parent(node)?;
    while is_engine_node(&current) {
        current = logical_parent(&current)?;
    }
    Some(current)
}

/// Element children of `parent`, looking through engine wrappers as if their
/// children sat directly under `parent`.
pub(crate) fn structural_children(parent: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeRef> = logical_children(parent).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.as_element().is_none() || is_split_piece(&node) {
            continue;
        }
        if is_engine_node(&node) {
            stack.extend(logical_children(&node).into_iter().rev());
        } else {
            out.push(node);
        }
    }
    out
}

/// Text nodes under `container` in document order.
pub fn text_nodes_in(container: &NodeRef) -> Vec<NodeRef> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeRef> = logical_children(container).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if node.as_text().is_some() {
            out.push(node);
        } else if !is_split_piece(&node) {
            stack.extend(logical_children(&node).into_iter().rev());
        }
    }
    out
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub(crate) fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let from = byte_index(text, start);
    let to = byte_index(text, end).max(from);
    &text[from..to]
}

/// Remove chars `start..end` from `text` and return them.
pub(crate) fn splice_text(text: &RefCell<String>, start: usize, end: usize) -> String {
    let mut data = text.borrow_mut();
    let from = byte_index(&data, start);
    let to = byte_index(&data, end).max(from);
    data.drain(from..to).collect()
}

/// DOM node length: chars for character data, child count otherwise.
pub fn node_length(node: &NodeRef) -> usize {
    match node.data() {
        NodeData::Text(text) | NodeData::Comment(text) => char_len(&text.borrow()),
        NodeData::Doctype(_) | NodeData::ProcessingInstruction(_) => 0,
        _ => node.children().count(),
    }
}

pub(crate) fn child_index(node: &NodeRef) -> Option<usize> {
    let parent = node.parent()?;
    parent.children().position(|child| child == *node)
}

pub(crate) fn is_inclusive_ancestor(ancestor: &NodeRef, node: &NodeRef) -> bool {
    node.inclusive_ancestors().any(|candidate| candidate == *ancestor)
}

/// Root of the tree containing `node` plus the child-index path from it.
pub(crate) fn tree_position(node: &NodeRef) -> (NodeRef, Vec<usize>) {
    let mut path = Vec::new();
    let mut current = node.clone();
    while let Some(parent) = current.parent() {
        let index = parent
            .children()
            .position(|child| child == current)
            .unwrap_or(0);
        path.push(index);
        current = parent;
    }
    path.reverse();
    (current, path)
}

pub(crate) fn body_or_root(document: &NodeRef) -> NodeRef {
    if let Ok(body) = document.select_first("body") {
        return body.as_node().clone();
    }
    document
        .children()
        .find(|child| child.as_element().is_some())
        .unwrap_or_else(|| document.clone())
}

pub(crate) fn nodes_with_class(document: &NodeRef, class: &str) -> Vec<NodeRef> {
    document
        .descendants()
        .filter(|node| has_class(node, class))
        .collect()
}

pub(crate) fn nodes_with_anchor_id(document: &NodeRef, id: &str) -> Vec<NodeRef> {
    document
        .descendants()
        .filter(|node| attr(node, ANCHOR_ID_ATTR).as_deref() == Some(id))
        .collect()
}

/// Move `node`'s children in front of it and drop the now-empty node.
pub(crate) fn unwrap_node(node: &NodeRef) {
    let children: Vec<NodeRef> = node.children().collect();
    for child in children {
        node.insert_before(child);
    }
    node.detach();
}

/// Merge adjacent text children and drop empty ones.
pub(crate) fn normalize_text_children(parent: &NodeRef) {
    let children: Vec<NodeRef> = parent.children().collect();
    let mut previous_text: Option<NodeRef> = None;
    for child in children {
        let Some(text) = child.as_text() else {
            previous_text = None;
            continue;
        };
        if text.borrow().is_empty() {
            child.detach();
            continue;
        }
        if let Some(prev) = &previous_text {
            if let Some(prev_text) = prev.as_text() {
                prev_text.borrow_mut().push_str(&text.borrow());
            }
            child.detach();
            continue;
        }
        previous_text = Some(child);
    }
}
