mod capture;
mod debug;
mod dom;
mod encoder;
mod error;
mod export;
mod locator;
mod perf;
mod range;
mod reconcile;
mod render;
mod resolver;
mod types;

pub use capture::{CapturedSelection, DEFAULT_DEBOUNCE, SelectionDebouncer};
use debug::DebugLogger;
pub use dom::{
    ANCHOR_ID_ATTR, FALLBACK_CLASS, HIGHLIGHT_CLASS, INDICATOR_CLASS, PULSE_CLASS, SPLIT_CLASS,
    has_class, is_engine_node, node_length, text_nodes_in,
};
pub use encoder::{EncodedAnchor, container_element, encode, text_offset_within};
pub use error::AnchorError;
pub use export::{export_json, export_markdown};
pub use locator::{AddressError, evaluate_address, locate};
pub use pageanchor_contract::{
    AnchorDescriptor, AnchorKind, AnnotationStore, DescriptorError, HighlightColor, InboundMessage,
    JsonFileStore, MemoryStore, StoreError,
};
use perf::{DEFAULT_PERF_LOG, PerfLogger};
pub use range::{Boundary, RangeError, Split, SplitSide, TextRange, compare_boundary};
pub use reconcile::{AnchorOutcome, FallbackReason, ReconcileReport, reconcile_all};
pub use render::{
    MarkerStyle, RenderedHighlight, RenderedKind, ScrollTarget, WrapStrategy, clear_rendered,
    pulse_rendered, remove_rendered, render_fallback, render_highlight, update_comment,
};
pub use resolver::{find_range, resolve};
pub use types::{AnnotationRequest, MessageOutcome, PageInfo};

use kuchiki::NodeRef;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

type SharedStore = Arc<dyn AnnotationStore + Send + Sync>;

pub struct Annotator {
    store: SharedStore,
    palette: Vec<HighlightColor>,
    default_color: HighlightColor,
    debounce_interval: Duration,
    marker_style: MarkerStyle,
    debug: Option<Arc<DebugLogger>>,
    perf: Option<Arc<PerfLogger>>,
    sequence: AtomicU64,
}

#[derive(Clone)]
pub struct AnnotatorBuilder {
    store: Option<SharedStore>,
    palette: Vec<HighlightColor>,
    default_color: Option<HighlightColor>,
    debounce_interval: Duration,
    marker_style: MarkerStyle,
    debug_path: Option<std::path::PathBuf>,
    perf_enabled: bool,
    perf_path: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub descriptor: AnchorDescriptor,
    pub outcome: AnchorOutcome,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Annotator {
    pub fn builder() -> AnnotatorBuilder {
        AnnotatorBuilder::new()
    }

    pub fn palette(&self) -> &[HighlightColor] {
        &self.palette
    }

    pub fn default_color(&self) -> HighlightColor {
        self.default_color
    }

    pub fn debouncer<T>(&self) -> SelectionDebouncer<T> {
        SelectionDebouncer::new(self.debounce_interval)
    }

    fn log_event(&self, kind: &str, fields: serde_json::Value) {
        if let Some(logger) = self.debug.as_deref() {
            logger.event(kind, fields);
            logger.increment(kind, 1);
        }
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
        if let Some(perf) = self.perf.as_deref() {
            perf.flush();
        }
    }

    // Store calls never fail a page operation; errors only reach the debug log.
    fn save_best_effort(&self, descriptor: &AnchorDescriptor) {
        if let Err(err) = self.store.save(descriptor) {
            self.log_event(
                "store.error",
                json!({"op": "save", "id": descriptor.id, "error": err.to_string()}),
            );
        }
    }

    fn fetch_best_effort(&self, url: &str) -> Vec<AnchorDescriptor> {
        match self.store.get_all_for_url(url) {
            Ok(descriptors) => descriptors,
            Err(err) => {
                self.log_event(
                    "store.error",
                    json!({"op": "get_all_for_url", "url": url, "error": err.to_string()}),
                );
                Vec::new()
            }
        }
    }

    pub fn commit(
        &self,
        document: &NodeRef,
        page: &PageInfo,
        captured: CapturedSelection,
        request: AnnotationRequest,
    ) -> Result<CommitResult, AnchorError> {
        let started = Instant::now();
        let color = request.color.unwrap_or(self.default_color);
        if !self.palette.contains(&color) {
            return Err(AnchorError::ColorNotInPalette(color.name().to_string()));
        }
        let comment = match request.kind {
            AnchorKind::Note => Some(request.comment.unwrap_or_default()),
            AnchorKind::Highlight if request.comment.is_some() => {
                return Err(AnchorError::Descriptor(DescriptorError::CommentOnHighlight));
            }
            AnchorKind::Highlight => None,
        };

        let Some(encoded) = encode(&captured.range) else {
            self.log_event(
                "anchor.capture",
                json!({"url": page.url, "outcome": "unlocatable"}),
            );
            return Err(AnchorError::Unlocatable);
        };

        let created_at = now_millis();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let descriptor = AnchorDescriptor {
            id: pageanchor_contract::anchor_id(
                &page.url,
                created_at,
                &encoded.address,
                encoded.text_offset,
                sequence,
            ),
            url: page.url.clone(),
            page_title: page.title.clone(),
            kind: request.kind,
            captured_text: captured.text,
            comment,
            color,
            address: encoded.address,
            text_offset: encoded.text_offset,
            text_length: encoded.text_length,
            fallback_position: captured.fallback_position,
            created_at,
        };
        descriptor.validate()?;
        self.log_event(
            "anchor.capture",
            json!({
                "id": descriptor.id,
                "url": descriptor.url,
                "address": descriptor.address,
                "text_offset": descriptor.text_offset,
                "text_length": descriptor.text_length,
                "outcome": "encoded",
            }),
        );
        self.save_best_effort(&descriptor);

        let outcome = match render_highlight(captured.range, &descriptor) {
            Some(rendered) => AnchorOutcome::Anchored(rendered.strategy),
            None => {
                render_fallback(document, &descriptor, &self.marker_style);
                AnchorOutcome::Fallback(FallbackReason::WrapFailed)
            }
        };
        if let Some(perf) = self.perf.as_deref() {
            perf.log_since("capture", Some(page.url.as_str()), started);
        }
        Ok(CommitResult {
            descriptor,
            outcome,
        })
    }

    pub fn load_page(&self, document: &NodeRef, url: &str) -> ReconcileReport {
        let started = Instant::now();
        // a failed fetch still runs the pass so stale markers are cleared
        let descriptors = self.fetch_best_effort(url);
        if let Some(perf) = self.perf.as_deref() {
            perf.log_since("store.fetch", Some(url), started);
        }
        self.reconcile(document, url, &descriptors)
    }

    pub fn reconcile(&self, document: &NodeRef, url: &str, descriptors: &[AnchorDescriptor]) -> ReconcileReport {
        let started = Instant::now();
        let scoped: Vec<AnchorDescriptor> = descriptors
            .iter()
            .filter(|descriptor| descriptor.url == url)
            .cloned()
            .collect();
        let report = reconcile::reconcile_with(
            document,
            &scoped,
            &self.marker_style,
            self.debug.as_deref(),
        );
        if let Some(perf) = self.perf.as_deref() {
            perf.log_since("reconcile", Some(url), started);
            perf.log_counts(
                "reconcile",
                Some(url),
                &[
                    ("descriptors", scoped.len() as u64),
                    ("anchored", report.anchored() as u64),
                    ("fallback", report.fallbacks() as u64),
                    ("cleared", report.cleared as u64),
                ],
            );
        }
        self.emit_debug_summary("reconcile");
        report
    }

    pub fn delete(&self, document: &NodeRef, id: &str) -> usize {
        if let Err(err) = self.store.delete(id) {
            self.log_event(
                "store.error",
                json!({"op": "delete", "id": id, "error": err.to_string()}),
            );
        }
        let removed = remove_rendered(document, id);
        self.log_event("anchor.delete", json!({"id": id, "removed_nodes": removed}));
        removed
    }

    pub fn edit_comment(
        &self,
        document: &NodeRef,
        descriptor: &AnchorDescriptor,
        comment: impl Into<String>,
    ) -> Result<AnchorDescriptor, AnchorError> {
        if descriptor.kind != AnchorKind::Note {
            return Err(AnchorError::NotANote(descriptor.id.clone()));
        }
        let edited = descriptor.with_comment(comment);
        self.save_best_effort(&edited);
        update_comment(document, &edited);
        Ok(edited)
    }

    pub fn handle_message(&self, document: &NodeRef, message: &InboundMessage) -> MessageOutcome {
        match message {
            InboundMessage::ScrollToAnnotation { id } => match pulse_rendered(document, id) {
                Some(target) => MessageOutcome::Scrolled(target),
                None => {
                    self.log_event("anchor.scroll_miss", json!({"id": id}));
                    MessageOutcome::NotFound(id.clone())
                }
            },
            InboundMessage::DeleteAnnotation { id } => MessageOutcome::Deleted {
                id: id.clone(),
                removed_nodes: self.delete(document, id),
            },
        }
    }

    pub fn handle_message_json(&self, document: &NodeRef, raw: &str) -> Result<MessageOutcome, AnchorError> {
        let message: InboundMessage = serde_json::from_str(raw).map_err(AnchorError::InvalidMessage)?;
        Ok(self.handle_message(document, &message))
    }

    pub fn export_page_markdown(&self, page: &PageInfo) -> String {
        export_markdown(&page.title, &page.url, &self.fetch_best_effort(&page.url))
    }
}

impl AnnotatorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            palette: HighlightColor::PALETTE.to_vec(),
            default_color: None,
            debounce_interval: DEFAULT_DEBOUNCE,
            marker_style: MarkerStyle::default(),
            debug_path: None,
            perf_enabled: false,
            perf_path: None,
        }
    }

    pub fn store<S>(mut self, store: S) -> Self
    where
        S: AnnotationStore + Send + Sync + 'static,
    {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn AnnotationStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn palette(mut self, palette: impl IntoIterator<Item = HighlightColor>) -> Self {
        self.palette = palette.into_iter().collect();
        self
    }

    // Color used when a request does not pick one. Defaults to the first palette entry.
    pub fn default_color(mut self, color: HighlightColor) -> Self {
        self.default_color = Some(color);
        self
    }

    pub fn debounce_interval(mut self, interval: Duration) -> Self {
        self.debounce_interval = interval;
        self
    }

    // Distance of fallback markers from the right edge of the page, in px.
    pub fn fallback_inset(mut self, inset: f64) -> Self {
        self.marker_style.fallback_inset = inset;
        self
    }

    // Enable debug logging to a JSONL file of anchoring decisions.
    pub fn debug_log(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Enable performance logging to a JSONL file for timing/counter inspection.
    pub fn perf_log(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.perf_enabled = true;
        self.perf_path = Some(path.into());
        self
    }

    // Toggle performance logging (uses default file when enabled and no path is set).
    pub fn perf_enabled(mut self, enabled: bool) -> Self {
        self.perf_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Annotator, AnchorError> {
        let Some(first) = self.palette.first().copied() else {
            return Err(AnchorError::InvalidConfiguration(
                "palette must contain at least one color".to_string(),
            ));
        };
        let default_color = self.default_color.unwrap_or(first);
        if !self.palette.contains(&default_color) {
            return Err(AnchorError::InvalidConfiguration(format!(
                "default_color={} is not in the palette",
                default_color.name()
            )));
        }
        if self.debounce_interval.is_zero() {
            return Err(AnchorError::InvalidConfiguration(
                "debounce_interval must be > 0".to_string(),
            ));
        }
        if !self.marker_style.fallback_inset.is_finite() || self.marker_style.fallback_inset < 0.0 {
            return Err(AnchorError::InvalidConfiguration(
                "fallback_inset must be a finite value >= 0".to_string(),
            ));
        }
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        let perf = if self.perf_enabled || self.perf_path.is_some() {
            let path = self
                .perf_path
                .unwrap_or_else(|| std::path::PathBuf::from(DEFAULT_PERF_LOG));
            Some(Arc::new(PerfLogger::new(path)?))
        } else {
            None
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as SharedStore);
        Ok(Annotator {
            store,
            palette: self.palette,
            default_color,
            debounce_interval: self.debounce_interval,
            marker_style: self.marker_style,
            debug,
            perf,
            sequence: AtomicU64::new(0),
        })
    }
}

impl Default for AnnotatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchiki::traits::TendrilSink;
    use std::path::PathBuf;

    const URL: &str = "https://example.com/post";
    const PAGE: &str = r#"<html><body><header><p>Site</p></header><article><p>The quick <em>brown</em> fox jumps</p><p>over the lazy dog</p></article></body></html>"#;

    fn temp_log_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "pageanchor_{tag}_{}_{}.jsonl",
            std::process::id(),
            nanos
        ))
    }

    fn page() -> PageInfo {
        PageInfo::new(URL, "Post")
    }

    fn select(doc: &NodeRef, selector: &str, start: usize, end_selector: &str, end: usize) -> CapturedSelection {
        let start_node = doc
            .select_first(selector)
            .expect("start element")
            .as_node()
            .first_child()
            .expect("start text");
        let end_node = doc
            .select_first(end_selector)
            .expect("end element")
            .as_node()
            .last_child()
            .expect("end text");
        let range = TextRange::new(start_node, start, end_node, end).expect("range");
        CapturedSelection::capture(range, 400.0, 20.0).expect("capture")
    }

    struct FailingStore;

    impl AnnotationStore for FailingStore {
        fn save(&self, _descriptor: &AnchorDescriptor) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        fn get_all_for_url(&self, _url: &str) -> Result<Vec<AnchorDescriptor>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[test]
    fn builder_rejects_invalid_configuration() {
        assert!(matches!(
            Annotator::builder().palette(Vec::new()).build(),
            Err(AnchorError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Annotator::builder()
                .palette([HighlightColor::Green])
                .default_color(HighlightColor::Pink)
                .build(),
            Err(AnchorError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Annotator::builder().debounce_interval(Duration::ZERO).build(),
            Err(AnchorError::InvalidConfiguration(_))
        ));
        let engine = Annotator::builder()
            .palette([HighlightColor::Blue, HighlightColor::Pink])
            .build()
            .expect("engine");
        assert_eq!(engine.default_color(), HighlightColor::Blue);
    }

    #[test]
    fn commit_saves_renders_and_reloads_on_fresh_page() {
        let store = Arc::new(MemoryStore::new());
        let engine = Annotator::builder()
            .shared_store(store.clone())
            .build()
            .expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);
        let captured = select(&doc, "article p", 4, "article p", 4);
        assert_eq!(captured.text, "quick brown fox");

        let committed = engine
            .commit(&doc, &page(), captured, AnnotationRequest::note("look"))
            .expect("commit");
        let descriptor = committed.descriptor;
        assert_eq!(descriptor.address, "/html/body/article/p[1]");
        assert_eq!(descriptor.text_offset, 4);
        assert_eq!(descriptor.text_length, 15);
        assert_eq!(descriptor.color, HighlightColor::Yellow);
        assert_eq!(descriptor.fallback_position, 420.0);
        assert_eq!(descriptor.id.len(), 32);
        assert!(matches!(committed.outcome, AnchorOutcome::Anchored(_)));
        assert_eq!(store.len(), 1);

        let fresh = kuchiki::parse_html().one(PAGE);
        let report = engine.load_page(&fresh, URL);
        assert_eq!(report.anchored(), 1);
        let marker = fresh
            .select_first(".pageanchor-highlight")
            .expect("marker");
        assert_eq!(marker.as_node().text_contents(), "quick brown fox");
        assert_eq!(fresh.select("span.pageanchor-note-indicator").expect("selector").count(), 1);
    }

    #[test]
    fn selection_inside_split_element_addresses_the_original() {
        const SPLIT_PAGE: &str = "<html><body><p>a<b>bold</b> and more</p></body></html>";
        let store = Arc::new(MemoryStore::new());
        let engine = Annotator::builder()
            .shared_store(store.clone())
            .build()
            .expect("engine");
        let doc = kuchiki::parse_html().one(SPLIT_PAGE);
        let captured = select(&doc, "b", 2, "p", 4);
        assert_eq!(captured.text, "ld and");
        let wide = engine
            .commit(&doc, &page(), captured, AnnotationRequest::highlight(HighlightColor::Yellow))
            .expect("wide");
        assert_eq!(wide.outcome, AnchorOutcome::Anchored(WrapStrategy::Extract));

        let piece_text = doc
            .select_first("b.pageanchor-split")
            .expect("piece")
            .as_node()
            .first_child()
            .expect("piece text");
        let range = TextRange::new(piece_text.clone(), 1, piece_text, 2).expect("range");
        let captured = CapturedSelection::capture(range, 400.0, 20.0).expect("capture");
        let letter = engine
            .commit(&doc, &page(), captured, AnnotationRequest::note("letter"))
            .expect("letter");
        assert_eq!(letter.descriptor.address, "/html/body/p/b");
        assert_eq!(letter.descriptor.text_offset, 3);
        assert_eq!(letter.descriptor.text_length, 1);

        let alone = kuchiki::parse_html().one(SPLIT_PAGE);
        let report = engine.reconcile(&alone, URL, std::slice::from_ref(&letter.descriptor));
        assert_eq!(report.anchored(), 1);
        let marker = alone.select_first(".pageanchor-highlight").expect("marker");
        assert_eq!(marker.as_node().text_contents(), "d");

        let fresh = kuchiki::parse_html().one(SPLIT_PAGE);
        assert_eq!(engine.load_page(&fresh, URL).anchored(), 2);
    }

    #[test]
    fn ids_differ_for_identical_commits() {
        let engine = Annotator::builder().build().expect("engine");
        let first_doc = kuchiki::parse_html().one(PAGE);
        let second_doc = kuchiki::parse_html().one(PAGE);
        let a = engine
            .commit(
                &first_doc,
                &page(),
                select(&first_doc, "em", 0, "em", 5),
                AnnotationRequest::highlight(HighlightColor::Green),
            )
            .expect("a");
        let b = engine
            .commit(
                &second_doc,
                &page(),
                select(&second_doc, "em", 0, "em", 5),
                AnnotationRequest::highlight(HighlightColor::Green),
            )
            .expect("b");
        assert_ne!(a.descriptor.id, b.descriptor.id);
        assert_eq!(a.descriptor.address, "/html/body/article/p[1]/em");
    }

    #[test]
    fn commit_rejects_unlocatable_and_invalid_requests() {
        let store = Arc::new(MemoryStore::new());
        let engine = Annotator::builder()
            .palette([HighlightColor::Yellow, HighlightColor::Green])
            .shared_store(store.clone())
            .build()
            .expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);

        let captured = select(&doc, "header p", 0, "header p", 4);
        doc.select_first("header").expect("header").as_node().detach();
        assert!(matches!(
            engine.commit(&doc, &page(), captured, AnnotationRequest::highlight(HighlightColor::Yellow)),
            Err(AnchorError::Unlocatable)
        ));

        let captured = select(&doc, "em", 0, "em", 5);
        assert!(matches!(
            engine.commit(&doc, &page(), captured.clone(), AnnotationRequest::highlight(HighlightColor::Purple)),
            Err(AnchorError::ColorNotInPalette(_))
        ));
        let mut stray = AnnotationRequest::highlight(HighlightColor::Yellow);
        stray.comment = Some("no".to_string());
        assert!(matches!(
            engine.commit(&doc, &page(), captured, stray),
            Err(AnchorError::Descriptor(DescriptorError::CommentOnHighlight))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn store_failures_never_block_the_page() {
        let log_path = temp_log_path("store_failure");
        let engine = Annotator::builder()
            .store(FailingStore)
            .debug_log(&log_path)
            .build()
            .expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);
        let committed = engine
            .commit(
                &doc,
                &page(),
                select(&doc, "em", 0, "em", 5),
                AnnotationRequest::highlight(HighlightColor::Yellow),
            )
            .expect("commit despite store");
        assert!(matches!(committed.outcome, AnchorOutcome::Anchored(_)));

        let report = engine.load_page(&doc, URL);
        assert_eq!(report.cleared, 1);
        assert!(report.outcomes.is_empty());
        drop(engine);

        let log = std::fs::read_to_string(&log_path).expect("read debug log");
        assert!(log.contains("\"store.error\""));
        assert!(log.contains("\"debug.summary\""));
        let _ = std::fs::remove_file(log_path);
    }

    #[test]
    fn delete_and_scroll_messages() {
        let store = Arc::new(MemoryStore::new());
        let engine = Annotator::builder()
            .shared_store(store.clone())
            .build()
            .expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);
        let committed = engine
            .commit(
                &doc,
                &page(),
                select(&doc, "article p:nth-child(2)", 9, "article p:nth-child(2)", 13),
                AnnotationRequest::note("lazy?"),
            )
            .expect("commit");
        let id = committed.descriptor.id.clone();

        let raw = format!(r#"{{"kind":"scrollToAnnotation","id":"{id}"}}"#);
        match engine.handle_message_json(&doc, &raw).expect("message") {
            MessageOutcome::Scrolled(target) => {
                assert_eq!(target.kind, RenderedKind::Highlight);
                assert!(has_class(&target.node, PULSE_CLASS));
                assert_eq!(target.node.text_contents(), "lazy");
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let outcome = engine.handle_message(&doc, &InboundMessage::DeleteAnnotation { id: id.clone() });
        assert!(matches!(outcome, MessageOutcome::Deleted { removed_nodes: 2, .. }));
        assert!(store.is_empty());
        assert!(matches!(
            engine.handle_message(&doc, &InboundMessage::ScrollToAnnotation { id }),
            MessageOutcome::NotFound(_)
        ));
        let p = doc.select_first("article p:nth-child(2)").expect("p");
        assert_eq!(p.as_node().to_string(), "<p>over the lazy dog</p>");
    }

    #[test]
    fn edit_comment_keeps_location() {
        let store = Arc::new(MemoryStore::new());
        let engine = Annotator::builder()
            .shared_store(store.clone())
            .build()
            .expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);
        let committed = engine
            .commit(&doc, &page(), select(&doc, "em", 0, "em", 5), AnnotationRequest::note("first"))
            .expect("commit");
        let edited = engine
            .edit_comment(&doc, &committed.descriptor, "second")
            .expect("edit");
        assert_eq!(edited.comment.as_deref(), Some("second"));
        assert_eq!(edited.address, committed.descriptor.address);
        assert_eq!(edited.text_offset, committed.descriptor.text_offset);
        let stored = store.get_all_for_url(URL).expect("stored");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].comment.as_deref(), Some("second"));
        let indicator = doc
            .select_first(".pageanchor-note-indicator")
            .expect("indicator");
        let title = indicator.attributes.borrow().get("title").map(str::to_string);
        assert_eq!(title.as_deref(), Some("second"));

        let highlight = engine
            .commit(
                &doc,
                &page(),
                select(&doc, "article p:nth-child(2)", 0, "article p:nth-child(2)", 4),
                AnnotationRequest::highlight(HighlightColor::Yellow),
            )
            .expect("highlight");
        assert!(matches!(
            engine.edit_comment(&doc, &highlight.descriptor, "x"),
            Err(AnchorError::NotANote(_))
        ));
    }

    #[test]
    fn reconcile_scopes_to_exact_url_and_logs_perf() {
        let perf_path = temp_log_path("perf");
        let engine = Annotator::builder().perf_log(&perf_path).build().expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);
        let make = |id: &str, url: &str| AnchorDescriptor {
            id: id.to_string(),
            url: url.to_string(),
            page_title: "Post".to_string(),
            kind: AnchorKind::Highlight,
            captured_text: "over".to_string(),
            comment: None,
            color: HighlightColor::Yellow,
            address: "/html/body/article/p[2]".to_string(),
            text_offset: 0,
            text_length: 4,
            fallback_position: 0.0,
            created_at: 1,
        };
        let report = engine.reconcile(
            &doc,
            URL,
            &[make("same", URL), make("query", "https://example.com/post?x=1")],
        );
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].0, "same");
        drop(engine);

        let log = std::fs::read_to_string(&perf_path).expect("perf log");
        assert!(log.contains("\"perf.span\""));
        assert!(log.contains("\"reconcile\""));
        let _ = std::fs::remove_file(&perf_path);
        let hot = perf_path.with_file_name(format!(
            "{}_hot.log",
            perf_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
        ));
        let _ = std::fs::remove_file(hot);
    }

    #[test]
    fn export_page_markdown_reads_store() {
        let engine = Annotator::builder().build().expect("engine");
        let doc = kuchiki::parse_html().one(PAGE);
        engine
            .commit(
                &doc,
                &page(),
                select(&doc, "em", 0, "em", 5),
                AnnotationRequest::highlight(HighlightColor::Green),
            )
            .expect("commit");
        let md = engine.export_page_markdown(&page());
        assert!(md.starts_with("# Post\n"));
        assert!(md.contains("> brown\n"));
    }

    #[test]
    fn debouncer_uses_configured_interval() {
        let engine = Annotator::builder()
            .debounce_interval(Duration::from_millis(250))
            .build()
            .expect("engine");
        let debouncer = engine.debouncer::<u32>();
        assert_eq!(debouncer.interval(), Duration::from_millis(250));
    }
}
