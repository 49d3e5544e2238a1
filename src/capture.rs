use crate::error::AnchorError;
use crate::range::TextRange;
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// A selection taken from the live page, carried explicitly from the moment it
/// was observed to the moment the user commits an annotation for it.
#[derive(Debug, Clone)]
pub struct CapturedSelection {
    pub range: TextRange,
    pub text: String,
    /// Document Y of the selection: page scroll plus bounding-rect top.
    pub fallback_position: f64,
}

impl CapturedSelection {
    pub fn capture(range: TextRange, scroll_y: f64, rect_top: f64) -> Result<Self, AnchorError> {
        let text = range.text();
        if range.is_collapsed() || text.is_empty() {
            return Err(AnchorError::EmptySelection);
        }
        let fallback_position = scroll_y + rect_top;
        Ok(Self {
            range,
            text,
            fallback_position: if fallback_position.is_finite() {
                fallback_position
            } else {
                0.0
            },
        })
    }
}

/// Coalesces rapid selection-change events. Each `push` replaces whatever was
/// pending; `poll` hands the latest value out once the interval has passed
/// without another push.
#[derive(Debug)]
pub struct SelectionDebouncer<T> {
    interval: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> SelectionDebouncer<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn push(&mut self, now: Instant, value: T) {
        self.pending = Some((now, value));
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let ready = match &self.pending {
            Some((pushed, _)) => now.saturating_duration_since(*pushed) >= self.interval,
            None => false,
        };
        if !ready {
            return None;
        }
        self.pending.take().map(|(_, value)| value)
    }

    /// Time left before the pending value fires.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(pushed, _)| self.interval.saturating_sub(now.saturating_duration_since(*pushed)))
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, value)| value)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for SelectionDebouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
