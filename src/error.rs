use pageanchor_contract::{DescriptorError, StoreError};
use std::fmt;

#[derive(Debug)]
pub enum AnchorError {
    InvalidConfiguration(String),
    /// The selection has no addressable container element.
    Unlocatable,
    EmptySelection,
    ColorNotInPalette(String),
    /// A comment edit targeted a plain highlight.
    NotANote(String),
    /// An inbound page command that is not valid JSON for a known kind.
    InvalidMessage(serde_json::Error),
    Descriptor(DescriptorError),
    Store(StoreError),
    Io(std::io::Error),
}

impl fmt::Display for AnchorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            AnchorError::Unlocatable => write!(f, "selection has no addressable container"),
            AnchorError::EmptySelection => write!(f, "selection is empty"),
            AnchorError::ColorNotInPalette(color) => {
                write!(f, "color {} is not in the configured palette", color)
            }
            AnchorError::NotANote(id) => write!(f, "annotation {} is not a note", id),
            AnchorError::InvalidMessage(err) => write!(f, "invalid page message: {}", err),
            AnchorError::Descriptor(err) => write!(f, "invalid descriptor: {}", err),
            AnchorError::Store(err) => write!(f, "store error: {}", err),
            AnchorError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for AnchorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnchorError::Descriptor(err) => Some(err),
            AnchorError::InvalidMessage(err) => Some(err),
            AnchorError::Store(err) => Some(err),
            AnchorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AnchorError {
    fn from(value: std::io::Error) -> Self {
        AnchorError::Io(value)
    }
}

impl From<StoreError> for AnchorError {
    fn from(value: StoreError) -> Self {
        AnchorError::Store(value)
    }
}

impl From<DescriptorError> for AnchorError {
    fn from(value: DescriptorError) -> Self {
        AnchorError::Descriptor(value)
    }
}
