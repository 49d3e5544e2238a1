use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

mod store;

pub use store::{AnnotationStore, JsonFileStore, MemoryStore, StoreError};

pub const CONTRACT_ID: &str = "pageanchor.anchor_descriptor";
pub const CONTRACT_VERSION: &str = "1";

/// Wire field names of a persisted descriptor, in serialization order.
pub const DESCRIPTOR_FIELDS: [&str; 12] = [
    "id",
    "url",
    "pageTitle",
    "kind",
    "capturedText",
    "comment",
    "color",
    "address",
    "textOffset",
    "textLength",
    "fallbackPosition",
    "createdAt",
];

const ANCHOR_ID_HEX_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorKind {
    Highlight,
    Note,
}

impl AnchorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnchorKind::Highlight => "highlight",
            AnchorKind::Note => "note",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Yellow,
    Green,
    Blue,
    Pink,
    Purple,
}

impl HighlightColor {
    pub const PALETTE: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Purple,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Purple => "purple",
        }
    }

    pub fn hex(self) -> &'static str {
        match self {
            HighlightColor::Yellow => "#fff176",
            HighlightColor::Green => "#a5d6a7",
            HighlightColor::Blue => "#90caf9",
            HighlightColor::Pink => "#f48fb1",
            HighlightColor::Purple => "#ce93d8",
        }
    }
}

impl Default for HighlightColor {
    fn default() -> Self {
        HighlightColor::PALETTE[0]
    }
}

/// Persisted location record for one annotation.
///
/// Everything except `comment` is fixed at creation; `address` and the text
/// window are never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorDescriptor {
    pub id: String,
    pub url: String,
    pub page_title: String,
    pub kind: AnchorKind,
    pub captured_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub color: HighlightColor,
    pub address: String,
    pub text_offset: usize,
    pub text_length: usize,
    pub fallback_position: f64,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    EmptyId,
    EmptyAddress,
    EmptyText,
    CommentOnHighlight,
    NonFiniteFallback,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::EmptyId => write!(f, "descriptor id is empty"),
            DescriptorError::EmptyAddress => write!(f, "descriptor address is empty"),
            DescriptorError::EmptyText => write!(f, "descriptor text length is zero"),
            DescriptorError::CommentOnHighlight => {
                write!(f, "only note descriptors may carry a comment")
            }
            DescriptorError::NonFiniteFallback => {
                write!(f, "descriptor fallback position is not finite")
            }
        }
    }
}

impl std::error::Error for DescriptorError {}

impl AnchorDescriptor {
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.id.is_empty() {
            return Err(DescriptorError::EmptyId);
        }
        if self.address.is_empty() {
            return Err(DescriptorError::EmptyAddress);
        }
        if self.text_length == 0 {
            return Err(DescriptorError::EmptyText);
        }
        if self.kind == AnchorKind::Highlight && self.comment.is_some() {
            return Err(DescriptorError::CommentOnHighlight);
        }
        if !self.fallback_position.is_finite() {
            return Err(DescriptorError::NonFiniteFallback);
        }
        Ok(())
    }

    /// Copy with only the comment replaced. Location fields are carried over as-is.
    pub fn with_comment(&self, comment: impl Into<String>) -> Self {
        Self {
            comment: Some(comment.into()),
            ..self.clone()
        }
    }

    /// Text shown for the annotation in tooltips and exports.
    pub fn label(&self) -> &str {
        match self.comment.as_deref() {
            Some(comment) if self.kind == AnchorKind::Note && !comment.is_empty() => comment,
            _ => &self.captured_text,
        }
    }
}

/// Inbound page command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InboundMessage {
    ScrollToAnnotation { id: String },
    DeleteAnnotation { id: String },
}

pub fn descriptors_to_json(descriptors: &[AnchorDescriptor]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(descriptors)
}

pub fn descriptors_from_json(json: &str) -> Result<Vec<AnchorDescriptor>, serde_json::Error> {
    serde_json::from_str(json)
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut text = String::new();
            text.push_str(CONTRACT_ID);
            text.push('\n');
            text.push_str(CONTRACT_VERSION);
            for field in DESCRIPTOR_FIELDS {
                text.push('\n');
                text.push_str(field);
            }
            hex_sha256(text.as_bytes())
        })
        .clone()
}

/// Derive a fresh anchor id. `sequence` must be unique per process so two
/// anchors captured in the same millisecond at the same spot still differ.
pub fn anchor_id(url: &str, created_at: u64, address: &str, text_offset: usize, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(created_at.to_le_bytes());
    hasher.update(address.as_bytes());
    hasher.update(b"\n");
    hasher.update((text_offset as u64).to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    let mut id = hex_digest(hasher);
    id.truncate(ANCHOR_ID_HEX_LEN);
    id
}
