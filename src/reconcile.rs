use crate::debug::DebugLogger;
use crate::render::{MarkerStyle, WrapStrategy, clear_rendered, render_fallback, render_highlight};
use crate::resolver::{find_range, resolve};
use kuchiki::NodeRef;
use pageanchor_contract::AnchorDescriptor;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Unresolved,
    RangeNotFound,
    WrapFailed,
    InvalidDescriptor,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::Unresolved => "unresolved",
            FallbackReason::RangeNotFound => "range_not_found",
            FallbackReason::WrapFailed => "wrap_failed",
            FallbackReason::InvalidDescriptor => "invalid_descriptor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOutcome {
    Anchored(WrapStrategy),
    Fallback(FallbackReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Nodes removed from earlier renders before this pass drew anything.
    pub cleared: usize,
    pub outcomes: Vec<(String, AnchorOutcome)>,
}

impl ReconcileReport {
    pub fn anchored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, AnchorOutcome::Anchored(_)))
            .count()
    }

    pub fn fallbacks(&self) -> usize {
        self.outcomes.len() - self.anchored()
    }

    pub fn outcome(&self, id: &str) -> Option<AnchorOutcome> {
        self.outcomes
            .iter()
            .find(|(candidate, _)| candidate == id)
            .map(|(_, outcome)| *outcome)
    }
}

pub(crate) fn render_descriptor(
    document: &NodeRef,
    descriptor: &AnchorDescriptor,
    style: &MarkerStyle,
) -> AnchorOutcome {
    let reason = match anchor_descriptor(document, descriptor) {
        Ok(strategy) => return AnchorOutcome::Anchored(strategy),
        Err(reason) => reason,
    };
    render_fallback(document, descriptor, style);
    AnchorOutcome::Fallback(reason)
}

fn anchor_descriptor(document: &NodeRef, descriptor: &AnchorDescriptor) -> Result<WrapStrategy, FallbackReason> {
    descriptor
        .validate()
        .map_err(|_| FallbackReason::InvalidDescriptor)?;
    let container = resolve(document, &descriptor.address).ok_or(FallbackReason::Unresolved)?;
    let range = find_range(&container, descriptor.text_offset, descriptor.text_length)
        .ok_or(FallbackReason::RangeNotFound)?;
    let rendered = render_highlight(range, descriptor).ok_or(FallbackReason::WrapFailed)?;
    Ok(rendered.strategy)
}

pub(crate) fn reconcile_with(
    document: &NodeRef,
    descriptors: &[AnchorDescriptor],
    style: &MarkerStyle,
    debug: Option<&DebugLogger>,
) -> ReconcileReport {
    let cleared = clear_rendered(document);
    let mut outcomes = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let outcome = render_descriptor(document, descriptor, style);
        if let Some(logger) = debug {
            let (label, reason) = match outcome {
                AnchorOutcome::Anchored(WrapStrategy::Surround) => ("anchored", "surround"),
                AnchorOutcome::Anchored(WrapStrategy::Extract) => ("anchored", "extract"),
                AnchorOutcome::Fallback(reason) => ("fallback", reason.as_str()),
            };
            logger.event(
                "anchor.resolve",
                json!({
                    "id": descriptor.id,
                    "address": descriptor.address,
                    "text_offset": descriptor.text_offset,
                    "text_length": descriptor.text_length,
                    "outcome": label,
                    "detail": reason,
                }),
            );
            logger.increment(&format!("anchor.{label}"), 1);
        }
        outcomes.push((descriptor.id.clone(), outcome));
    }
    ReconcileReport { cleared, outcomes }
}

/// Strip every earlier render, then anchor each descriptor independently.
/// Never fails: descriptors that cannot be anchored get a fallback marker.
pub fn reconcile_all(document: &NodeRef, descriptors: &[AnchorDescriptor]) -> ReconcileReport {
    reconcile_with(document, descriptors, &MarkerStyle::default(), None)
}
