use crate::dom::{
    ANCHOR_ID_ATTR, FALLBACK_CLASS, HIGHLIGHT_CLASS, INDICATOR_CLASS, PULSE_CLASS, SPLIT_CLASS,
    SPLIT_ORIGIN_ATTR, SPLIT_SIDE_ATTR, SPLIT_TOKEN_ATTR, add_class, attr, body_or_root,
    has_class, new_element, nodes_with_anchor_id, nodes_with_class, normalize_text_children,
    remove_attr, remove_class, set_attr, set_split_tokens, split_original, split_tokens,
    unwrap_node,
};
use crate::range::{Split, SplitSide, TextRange};
use kuchiki::NodeRef;
use pageanchor_contract::{AnchorDescriptor, AnchorKind};

const FALLBACK_TOP_ATTR: &str = "data-anchor-top";
const TOOLTIP_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub fallback_inset: f64,
    pub fallback_size: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            fallback_inset: 8.0,
            fallback_size: 14.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapStrategy {
    Surround,
    Extract,
}

#[derive(Debug, Clone)]
pub struct RenderedHighlight {
    pub marker: NodeRef,
    pub indicator: Option<NodeRef>,
    pub strategy: WrapStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderedKind {
    Highlight,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ScrollTarget {
    pub node: NodeRef,
    pub kind: RenderedKind,
    // only set for fallback markers; primary markers scroll by node
    pub fallback_position: Option<f64>,
}

fn tooltip(descriptor: &AnchorDescriptor) -> String {
    let label = descriptor.label();
    let mut text: String = label.chars().take(TOOLTIP_MAX_CHARS).collect();
    if label.chars().count() > TOOLTIP_MAX_CHARS {
        text.push('…');
    }
    text
}

fn highlight_marker(descriptor: &AnchorDescriptor) -> NodeRef {
    new_element(
        "mark",
        &[
            ("class", HIGHLIGHT_CLASS.to_string()),
            (ANCHOR_ID_ATTR, descriptor.id.clone()),
            ("data-anchor-kind", descriptor.kind.as_str().to_string()),
            ("data-anchor-color", descriptor.color.name().to_string()),
            (
                "style",
                format!(
                    "background-color: {}; color: inherit; cursor: pointer;",
                    descriptor.color.hex()
                ),
            ),
        ],
    )
}

fn note_indicator(descriptor: &AnchorDescriptor) -> NodeRef {
    let comment = descriptor.comment.clone().unwrap_or_default();
    new_element(
        "span",
        &[
            ("class", INDICATOR_CLASS.to_string()),
            (ANCHOR_ID_ATTR, descriptor.id.clone()),
            ("role", "note".to_string()),
            ("title", comment.clone()),
            ("aria-label", comment),
            (
                "style",
                format!(
                    "display: inline-block; width: 0.6em; height: 0.6em; margin-left: 2px; \
                     border-radius: 50%; vertical-align: super; background-color: {};",
                    descriptor.color.hex()
                ),
            ),
        ],
    )
}

fn is_marker(node: &NodeRef) -> bool {
    has_class(node, HIGHLIGHT_CLASS) || has_class(node, INDICATOR_CLASS) || has_class(node, FALLBACK_CLASS)
}

// Pieces inherit every attribute of the element they were cut from, including
// split bookkeeping when that element was itself a piece, so each one is
// re-tagged from scratch. Cut markers of other annotations stay plain markers.
fn tag_splits(splits: &[Split], id: &str) {
    for (index, split) in splits.iter().enumerate() {
        if is_marker(&split.original) {
            continue;
        }
        let token = format!("{id}-{index}");
        let piece = &split.piece;
        remove_attr(piece, SPLIT_ORIGIN_ATTR);
        add_class(piece, SPLIT_CLASS);
        set_attr(piece, ANCHOR_ID_ATTR, id);
        set_attr(piece, SPLIT_TOKEN_ATTR, token.clone());
        let side = match split.side {
            SplitSide::Start => "start",
            SplitSide::End => "end",
        };
        set_attr(piece, SPLIT_SIDE_ATTR, side);
        let mut tokens = split_tokens(&split.original);
        tokens.push(token);
        set_split_tokens(&split.original, &tokens);
    }
}

pub fn render_highlight(mut range: TextRange, descriptor: &AnchorDescriptor) -> Option<RenderedHighlight> {
    let marker = highlight_marker(descriptor);
    // surround refuses before touching the tree, so the extract path starts clean
    let strategy = match range.surround_contents(&marker) {
        Ok(()) => WrapStrategy::Surround,
        Err(_) => {
            let splits = range.wrap_extracted(&marker).ok()?;
            tag_splits(&splits, &descriptor.id);
            WrapStrategy::Extract
        }
    };
    if descriptor.kind == AnchorKind::Note {
        set_attr(&marker, "title", tooltip(descriptor));
    }
    let indicator = if descriptor.kind == AnchorKind::Note {
        let indicator = note_indicator(descriptor);
        marker.insert_after(indicator.clone());
        Some(indicator)
    } else {
        None
    };
    Some(RenderedHighlight {
        marker,
        indicator,
        strategy,
    })
}

pub fn render_fallback(document: &NodeRef, descriptor: &AnchorDescriptor, style: &MarkerStyle) -> NodeRef {
    let top = if descriptor.fallback_position.is_finite() {
        descriptor.fallback_position.max(0.0)
    } else {
        0.0
    };
    let title = format!("{}: {}", descriptor.kind.as_str(), tooltip(descriptor));
    let marker = new_element(
        "div",
        &[
            ("class", FALLBACK_CLASS.to_string()),
            (ANCHOR_ID_ATTR, descriptor.id.clone()),
            ("data-anchor-kind", descriptor.kind.as_str().to_string()),
            (FALLBACK_TOP_ATTR, format!("{top}")),
            ("title", title.clone()),
            ("aria-label", title),
            ("tabindex", "0".to_string()),
            (
                "style",
                format!(
                    "position: absolute; top: {top}px; right: {inset}px; width: {size}px; \
                     height: {size}px; border-radius: 50%; background-color: {color}; \
                     opacity: 0.85; cursor: pointer; z-index: 2147483647;",
                    inset = style.fallback_inset,
                    size = style.fallback_size,
                    color = descriptor.color.hex(),
                ),
            ),
        ],
    );
    body_or_root(document).append(marker.clone());
    marker
}

fn push_unique(nodes: &mut Vec<NodeRef>, node: NodeRef) {
    if !nodes.contains(&node) {
        nodes.push(node);
    }
}

// Put a piece's content back at the matching end of the element it was cut
// from. Pieces later cut from this piece now hang off that element instead.
fn rejoin(piece: &NodeRef, touched: &mut Vec<NodeRef>) {
    if let Some(parent) = piece.parent() {
        push_unique(touched, parent);
    }
    let Some(original) = split_original(piece) else {
        unwrap_node(piece);
        return;
    };
    let children: Vec<NodeRef> = piece.children().collect();
    let leading = attr(piece, SPLIT_SIDE_ATTR).as_deref() == Some("end");
    match original.first_child() {
        Some(first) if leading => {
            for child in children {
                first.insert_before(child);
            }
        }
        _ => {
            for child in children {
                original.append(child);
            }
        }
    }
    let token = attr(piece, SPLIT_TOKEN_ATTR).unwrap_or_default();
    let mut tokens: Vec<String> = split_tokens(&original)
        .into_iter()
        .filter(|t| *t != token)
        .collect();
    tokens.extend(split_tokens(piece));
    set_split_tokens(&original, &tokens);
    piece.detach();
    push_unique(touched, original);
}

fn strip(detached: Vec<NodeRef>, markers: Vec<NodeRef>, mut pieces: Vec<NodeRef>) -> usize {
    let mut removed = 0usize;
    for node in detached {
        node.detach();
        removed += 1;
    }
    let mut touched: Vec<NodeRef> = Vec::new();
    for marker in markers {
        if let Some(parent) = marker.parent() {
            push_unique(&mut touched, parent);
        }
        unwrap_node(&marker);
        removed += 1;
    }
    // A piece may itself have been cut again by a later annotation; those
    // inner pieces go back first so their original is still in the tree.
    while !pieces.is_empty() {
        let index = pieces
            .iter()
            .position(|piece| {
                let cut_from = split_tokens(piece);
                !pieces.iter().any(|other| {
                    attr(other, SPLIT_TOKEN_ATTR).is_some_and(|token| cut_from.contains(&token))
                })
            })
            .unwrap_or(0);
        let piece = pieces.remove(index);
        rejoin(&piece, &mut touched);
        removed += 1;
    }
    for node in &touched {
        normalize_text_children(node);
    }
    removed
}

/// Undo every render on the page. Returns the number of engine nodes removed.
pub fn clear_rendered(document: &NodeRef) -> usize {
    let mut detached = nodes_with_class(document, INDICATOR_CLASS);
    detached.extend(nodes_with_class(document, FALLBACK_CLASS));
    strip(
        detached,
        nodes_with_class(document, HIGHLIGHT_CLASS),
        nodes_with_class(document, SPLIT_CLASS),
    )
}

pub fn remove_rendered(document: &NodeRef, id: &str) -> usize {
    let mut detached = Vec::new();
    let mut markers = Vec::new();
    let mut pieces = Vec::new();
    for node in nodes_with_anchor_id(document, id) {
        if has_class(&node, HIGHLIGHT_CLASS) {
            markers.push(node);
        } else if has_class(&node, SPLIT_CLASS) {
            pieces.push(node);
        } else if has_class(&node, INDICATOR_CLASS) || has_class(&node, FALLBACK_CLASS) {
            detached.push(node);
        }
    }
    strip(detached, markers, pieces)
}

pub fn update_comment(document: &NodeRef, descriptor: &AnchorDescriptor) -> usize {
    let mut touched = 0usize;
    for node in nodes_with_anchor_id(document, &descriptor.id) {
        if has_class(&node, INDICATOR_CLASS) {
            let comment = descriptor.comment.clone().unwrap_or_default();
            set_attr(&node, "title", comment.clone());
            set_attr(&node, "aria-label", comment);
        } else if has_class(&node, FALLBACK_CLASS) {
            let title = format!("{}: {}", descriptor.kind.as_str(), tooltip(descriptor));
            set_attr(&node, "title", title.clone());
            set_attr(&node, "aria-label", title);
        } else if has_class(&node, HIGHLIGHT_CLASS) {
            set_attr(&node, "title", tooltip(descriptor));
        } else {
            continue;
        }
        touched += 1;
    }
    touched
}

pub fn pulse_rendered(document: &NodeRef, id: &str) -> Option<ScrollTarget> {
    let nodes = nodes_with_anchor_id(document, id);
    let target = nodes
        .iter()
        .find(|node| has_class(node, HIGHLIGHT_CLASS))
        .map(|node| (node.clone(), RenderedKind::Highlight))
        .or_else(|| {
            nodes
                .iter()
                .find(|node| has_class(node, FALLBACK_CLASS))
                .map(|node| (node.clone(), RenderedKind::Fallback))
        });
    let (node, kind) = target?;
    for pulsing in nodes_with_class(document, PULSE_CLASS) {
        remove_class(&pulsing, PULSE_CLASS);
    }
    add_class(&node, PULSE_CLASS);
    let fallback_position = match kind {
        RenderedKind::Fallback => attr(&node, FALLBACK_TOP_ATTR).and_then(|v| v.parse().ok()),
        RenderedKind::Highlight => None,
    };
    Some(ScrollTarget {
        node,
        kind,
        fallback_position,
    })
}
