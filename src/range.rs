use crate::dom::{
    char_slice, child_index, is_inclusive_ancestor, new_fragment, node_length, shallow_clone,
    splice_text, tree_position,
};
use kuchiki::NodeRef;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// Offset beyond the node's length.
    IndexSize,
    /// Boundary nodes live in different trees.
    WrongDocument,
    /// End would precede start.
    Ordering,
    /// A non-text node is only partly inside the range.
    PartialElement,
    /// A boundary node has no parent where one is required.
    Detached,
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::IndexSize => write!(f, "boundary offset exceeds node length"),
            RangeError::WrongDocument => write!(f, "range boundaries are in different trees"),
            RangeError::Ordering => write!(f, "range end precedes range start"),
            RangeError::PartialElement => {
                write!(f, "range partially selects a non-text node")
            }
            RangeError::Detached => write!(f, "range boundary is detached from its tree"),
        }
    }
}

impl std::error::Error for RangeError {}

/// A point in the tree. For text nodes `offset` counts chars, otherwise children.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub node: NodeRef,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeRef, offset: usize) -> Self {
        Self { node, offset }
    }
}

impl PartialEq for Boundary {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.offset == other.offset
    }
}

/// Document-order comparison of two boundary points.
pub fn compare_boundary(a: &Boundary, b: &Boundary) -> Result<Ordering, RangeError> {
    if a.node == b.node {
        return Ok(a.offset.cmp(&b.offset));
    }
    let (root_a, path_a) = tree_position(&a.node);
    let (root_b, path_b) = tree_position(&b.node);
    if root_a != root_b {
        return Err(RangeError::WrongDocument);
    }
    if path_b.starts_with(&path_a) {
        let child = path_b[path_a.len()];
        return Ok(if a.offset <= child {
            Ordering::Less
        } else {
            Ordering::Greater
        });
    }
    if path_a.starts_with(&path_b) {
        let child = path_a[path_b.len()];
        return Ok(if b.offset <= child {
            Ordering::Greater
        } else {
            Ordering::Less
        });
    }
    Ok(path_a.cmp(&path_b))
}

/// Which end of the range cut through the original element. A `Start` piece
/// holds the original's trailing content, an `End` piece its leading content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSide {
    Start,
    End,
}

/// An element that extraction cut in two: `original` stays in the tree and
/// `piece` is the shallow clone that carried the selected part away.
#[derive(Debug, Clone)]
pub struct Split {
    pub original: NodeRef,
    pub piece: NodeRef,
    pub side: SplitSide,
}

/// Live range over a kuchiki tree, modelled on the DOM `Range` interface.
#[derive(Debug, Clone)]
pub struct TextRange {
    start: Boundary,
    end: Boundary,
}

impl TextRange {
    pub fn collapsed(node: NodeRef, offset: usize) -> Result<Self, RangeError> {
        if offset > node_length(&node) {
            return Err(RangeError::IndexSize);
        }
        let point = Boundary::new(node, offset);
        Ok(Self {
            start: point.clone(),
            end: point,
        })
    }

    pub fn new(
        start_node: NodeRef,
        start_offset: usize,
        end_node: NodeRef,
        end_offset: usize,
    ) -> Result<Self, RangeError> {
        let mut range = Self::collapsed(start_node, start_offset)?;
        range.set_end(end_node, end_offset)?;
        Ok(range)
    }

    /// Range covering exactly `node`.
    pub fn selecting(node: &NodeRef) -> Result<Self, RangeError> {
        let parent = node.parent().ok_or(RangeError::Detached)?;
        let index = child_index(node).ok_or(RangeError::Detached)?;
        Self::new(parent.clone(), index, parent, index + 1)
    }

    pub fn start(&self) -> &Boundary {
        &self.start
    }

    pub fn end(&self) -> &Boundary {
        &self.end
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn set_start(&mut self, node: NodeRef, offset: usize) -> Result<(), RangeError> {
        if offset > node_length(&node) {
            return Err(RangeError::IndexSize);
        }
        let candidate = Boundary::new(node, offset);
        if compare_boundary(&candidate, &self.end)? == Ordering::Greater {
            return Err(RangeError::Ordering);
        }
        self.start = candidate;
        Ok(())
    }

    pub fn set_end(&mut self, node: NodeRef, offset: usize) -> Result<(), RangeError> {
        if offset > node_length(&node) {
            return Err(RangeError::IndexSize);
        }
        let candidate = Boundary::new(node, offset);
        if compare_boundary(&self.start, &candidate)? == Ordering::Greater {
            return Err(RangeError::Ordering);
        }
        self.end = candidate;
        Ok(())
    }

    /// Re-check the boundaries against the tree as it is now.
    pub fn validate(&self) -> Result<(), RangeError> {
        if self.start.offset > node_length(&self.start.node)
            || self.end.offset > node_length(&self.end.node)
        {
            return Err(RangeError::IndexSize);
        }
        if compare_boundary(&self.start, &self.end)? == Ordering::Greater {
            return Err(RangeError::Ordering);
        }
        Ok(())
    }

    pub fn common_ancestor(&self) -> Result<NodeRef, RangeError> {
        self.start
            .node
            .inclusive_ancestors()
            .find(|ancestor| is_inclusive_ancestor(ancestor, &self.end.node))
            .ok_or(RangeError::WrongDocument)
    }

    /// Whether `node` lies entirely inside the range.
    pub fn contains_node(&self, node: &NodeRef) -> bool {
        let node_start = Boundary::new(node.clone(), 0);
        let node_end = Boundary::new(node.clone(), node_length(node));
        matches!(
            compare_boundary(&node_start, &self.start),
            Ok(Ordering::Greater)
        ) && matches!(compare_boundary(&node_end, &self.end), Ok(Ordering::Less))
    }

    /// Concatenated text data inside the range.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if self.start.node == self.end.node {
            if let Some(text) = self.start.node.as_text() {
                out.push_str(char_slice(&text.borrow(), self.start.offset, self.end.offset));
                return out;
            }
        }
        if let Some(text) = self.start.node.as_text() {
            let data = text.borrow();
            out.push_str(char_slice(&data, self.start.offset, usize::MAX));
        }
        if let Ok(common) = self.common_ancestor() {
            for node in common.descendants() {
                let Some(text) = node.as_text() else {
                    continue;
                };
                if node == self.start.node || node == self.end.node {
                    continue;
                }
                if self.contains_node(&node) {
                    out.push_str(&text.borrow());
                }
            }
        }
        if let Some(text) = self.end.node.as_text() {
            out.push_str(char_slice(&text.borrow(), 0, self.end.offset));
        }
        out
    }

    fn partially_contains_non_text(&self) -> Result<bool, RangeError> {
        let common = self.common_ancestor()?;
        let sides = [
            (&self.start.node, &self.end.node),
            (&self.end.node, &self.start.node),
        ];
        for (from, other) in sides {
            for node in from.inclusive_ancestors() {
                if node == common {
                    break;
                }
                if node.as_text().is_none() && !is_inclusive_ancestor(&node, other) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Move the range contents into a detached fragment and collapse the range
    /// to where they were. Partially selected elements are split: the
    /// fragment receives shallow clones holding the selected part.
    pub fn extract_contents(&mut self) -> Result<NodeRef, RangeError> {
        self.extract_into(&mut Vec::new())
    }

    fn extract_into(&mut self, splits: &mut Vec<Split>) -> Result<NodeRef, RangeError> {
        self.validate()?;
        let fragment = new_fragment();
        if self.is_collapsed() {
            return Ok(fragment);
        }
        let start = self.start.clone();
        let end = self.end.clone();

        if start.node == end.node {
            if let Some(text) = start.node.as_text() {
                let removed = splice_text(text, start.offset, end.offset);
                fragment.append(NodeRef::new_text(removed));
                self.end = start;
                return Ok(fragment);
            }
        }

        let common = self.common_ancestor()?;
        let start_contains_end = is_inclusive_ancestor(&start.node, &end.node);
        let end_contains_start = is_inclusive_ancestor(&end.node, &start.node);
        let first_partial = if start_contains_end {
            None
        } else {
            common
                .children()
                .find(|child| is_inclusive_ancestor(child, &start.node))
        };
        let last_partial = if end_contains_start {
            None
        } else {
            common
                .children()
                .find(|child| is_inclusive_ancestor(child, &end.node))
        };
        let contained: Vec<NodeRef> = common
            .children()
            .filter(|child| self.contains_node(child))
            .collect();

        let collapse_to = if start_contains_end {
            start.clone()
        } else {
            let mut reference = start.node.clone();
            loop {
                let parent = reference.parent().ok_or(RangeError::Detached)?;
                if is_inclusive_ancestor(&parent, &end.node) {
                    let index = child_index(&reference).ok_or(RangeError::Detached)?;
                    break Boundary::new(parent, index + 1);
                }
                reference = parent;
            }
        };

        if let Some(first) = &first_partial {
            if let Some(text) = first.as_text() {
                let removed = splice_text(text, start.offset, usize::MAX);
                fragment.append(NodeRef::new_text(removed));
            } else {
                let clone = shallow_clone(first);
                fragment.append(clone.clone());
                splits.push(Split {
                    original: first.clone(),
                    piece: clone.clone(),
                    side: SplitSide::Start,
                });
                let mut inner = TextRange {
                    start: start.clone(),
                    end: Boundary::new(first.clone(), node_length(first)),
                };
                let inner_fragment = inner.extract_into(splits)?;
                move_children(&inner_fragment, &clone);
            }
        }

        for child in contained {
            fragment.append(child);
        }

        if let Some(last) = &last_partial {
            if let Some(text) = last.as_text() {
                let removed = splice_text(text, 0, end.offset);
                fragment.append(NodeRef::new_text(removed));
            } else {
                let clone = shallow_clone(last);
                fragment.append(clone.clone());
                splits.push(Split {
                    original: last.clone(),
                    piece: clone.clone(),
                    side: SplitSide::End,
                });
                let mut inner = TextRange {
                    start: Boundary::new(last.clone(), 0),
                    end: end.clone(),
                };
                let inner_fragment = inner.extract_into(splits)?;
                move_children(&inner_fragment, &clone);
            }
        }

        self.start = collapse_to.clone();
        self.end = collapse_to;
        Ok(fragment)
    }

    /// Insert `node` at the range start, splitting a text node when the start
    /// falls inside one. Afterwards the range selects `node`.
    pub fn insert_node(&mut self, node: &NodeRef) -> Result<(), RangeError> {
        self.validate()?;
        let start = self.start.clone();
        if let Some(text) = start.node.as_text() {
            if start.node.parent().is_none() {
                return Err(RangeError::Detached);
            }
            let len = node_length(&start.node);
            if start.offset == 0 {
                start.node.insert_before(node.clone());
            } else if start.offset >= len {
                start.node.insert_after(node.clone());
            } else {
                let tail = splice_text(text, start.offset, usize::MAX);
                let tail_node = NodeRef::new_text(tail);
                start.node.insert_after(tail_node);
                start.node.insert_after(node.clone());
            }
        } else {
            match start.node.children().nth(start.offset) {
                Some(reference) => reference.insert_before(node.clone()),
                None => start.node.append(node.clone()),
            }
        }
        *self = TextRange::selecting(node)?;
        Ok(())
    }

    /// Wrap the contents in `wrapper`. Refuses ranges that would need to split
    /// an element.
    pub fn surround_contents(&mut self, wrapper: &NodeRef) -> Result<(), RangeError> {
        self.validate()?;
        if self.partially_contains_non_text()? {
            return Err(RangeError::PartialElement);
        }
        self.wrap_extracted(wrapper).map(|_| ())
    }

    /// Extract the contents, move them into `wrapper` and put `wrapper` where
    /// the contents were. Works for any valid range; the returned splits name
    /// every element that had to be cut, outermost first.
    pub fn wrap_extracted(&mut self, wrapper: &NodeRef) -> Result<Vec<Split>, RangeError> {
        let mut splits = Vec::new();
        let fragment = self.extract_into(&mut splits)?;
        for child in wrapper.children().collect::<Vec<_>>() {
            child.detach();
        }
        move_children(&fragment, wrapper);
        self.insert_node(wrapper)?;
        Ok(splits)
    }
}

fn move_children(from: &NodeRef, to: &NodeRef) {
    let children: Vec<NodeRef> = from.children().collect();
    for child in children {
        to.append(child);
    }
}
