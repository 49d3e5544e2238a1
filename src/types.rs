use crate::render::ScrollTarget;
use pageanchor_contract::{AnchorKind, HighlightColor};

/// Identity of the page annotations are scoped to. Matching is by exact `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

impl PageInfo {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// What the user asked to create for a captured selection.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRequest {
    pub kind: AnchorKind,
    /// `None` picks the configured default color.
    pub color: Option<HighlightColor>,
    pub comment: Option<String>,
}

impl AnnotationRequest {
    pub fn highlight(color: HighlightColor) -> Self {
        Self {
            kind: AnchorKind::Highlight,
            color: Some(color),
            comment: None,
        }
    }

    pub fn note(comment: impl Into<String>) -> Self {
        Self {
            kind: AnchorKind::Note,
            color: None,
            comment: Some(comment.into()),
        }
    }

    pub fn with_color(mut self, color: HighlightColor) -> Self {
        self.color = Some(color);
        self
    }
}

/// Result of handling an inbound page command.
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    Scrolled(ScrollTarget),
    /// No rendered marker carries the id.
    NotFound(String),
    Deleted { id: String, removed_nodes: usize },
}
