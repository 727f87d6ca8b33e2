//! Page-isolated observer ("bridge").
//!
//! Relays shield verdicts to the coordinator and guards the document against
//! markup-level redirects: refresh metas, third-party frames, forced
//! overlays, hijacked clicks and form submissions. Every guard is a no-op
//! while the extension is disabled, and the bridge assumes disabled until the
//! coordinator says otherwise.

pub mod batch;
pub mod config;
pub mod events;
pub mod guards;

pub use batch::MutationBatcher;
pub use batch::OverlayCache;
pub use config::ObserverConfig;
pub use events::ClickEvent;
pub use events::EventOutcome;
pub use events::Intervention;
pub use events::SubmitEvent;

use nr_classifier::OriginClassifier;
use nr_classifier::PatternTable;
use nr_core::Clock;
use nr_core::ComponentId;
use nr_core::RedirectKind;
use nr_core::RedirectVerdict;
use nr_dom::Document;
use nr_dom::NodeId;
use nr_ipc::RuntimeMessage;
use nr_ipc::RuntimePort;
use nr_ipc::RuntimeResponse;
use nr_ipc::WindowMessage;
use nr_ipc::WindowPayload;
use std::sync::Arc;

/// Elements changed by one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub removed_refreshes: Vec<NodeId>,
    pub contained_frames: Vec<NodeId>,
    pub removed_overlays: Vec<NodeId>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.removed_refreshes.is_empty()
            && self.contained_frames.is_empty()
            && self.removed_overlays.is_empty()
    }
}

pub struct Bridge<P: RuntimePort> {
    port: P,
    config: ObserverConfig,
    patterns: Arc<PatternTable>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    batcher: MutationBatcher,
    overlays: OverlayCache,
    page_outbox: Vec<WindowMessage>,
}

impl<P: RuntimePort> Bridge<P> {
    /// Builds a disabled bridge without contacting the coordinator.
    pub fn new(
        port: P,
        config: ObserverConfig,
        patterns: Arc<PatternTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let overlays = OverlayCache::new(config.overlay_cache_period(), clock.now());
        let batcher = MutationBatcher::new(config.batch_window());

        Self {
            port,
            config,
            patterns,
            clock,
            enabled: false,
            batcher,
            overlays,
            page_outbox: Vec::new(),
        }
    }

    /// Builds the bridge and asks the coordinator for the current state once.
    pub fn start(
        port: P,
        config: ObserverConfig,
        patterns: Arc<PatternTable>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut bridge = Self::new(port, config, patterns, clock);
        bridge.sync_state();
        bridge
    }

    /// Pulls the enabled flag. No answer leaves the bridge where it was.
    pub fn sync_state(&mut self) {
        match self.port.request(RuntimeMessage::IsEnabled) {
            Some(RuntimeResponse::Enabled { enabled }) => self.set_enabled(enabled),
            Some(other) => tracing::debug!(?other, "unexpected answer to isEnabled"),
            None => tracing::debug!("coordinator did not answer isEnabled"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    /// Messages to post into the page realm (state mirror for the shield).
    pub fn take_page_messages(&mut self) -> Vec<WindowMessage> {
        std::mem::take(&mut self.page_outbox)
    }

    /// Coordinator broadcasts.
    pub fn on_runtime_message(&mut self, message: &RuntimeMessage) {
        if let RuntimeMessage::StateChanged { enabled } = message {
            self.set_enabled(*enabled);
        }
    }

    /// Same-realm page messages. Only our own blocked notifications are relayed.
    pub fn on_window_message(&mut self, message: &WindowMessage) {
        if !message.is_internal() || !self.enabled {
            return;
        }
        let WindowPayload::Blocked { from, to, kind } = &message.payload else {
            return;
        };

        self.port.post(RuntimeMessage::ContentScriptBlocked {
            from: Some(from.clone()).filter(|from| !from.is_empty()),
            to: Some(to.clone()).filter(|to| !to.is_empty()),
            kind: Some(*kind),
        });
    }

    /// Checks refresh metas and frames present when the document loaded.
    pub fn on_load(&mut self, document: &mut Document) -> ScanReport {
        let mut report = ScanReport::default();
        if !self.enabled {
            return report;
        }
        let Some(classifier) = self.classifier(document) else {
            return report;
        };

        for meta in document.elements_by_tag("meta") {
            self.check_refresh(document, &classifier, meta, &mut report);
        }
        for frame in document.elements_by_tag("iframe") {
            self.check_frame(document, &classifier, frame, &mut report);
        }
        report
    }

    /// Collects pending mutations and scans them once the batch window closed.
    pub fn on_mutations(&mut self, document: &mut Document) -> ScanReport {
        let records = document.take_mutations();
        if !self.enabled {
            return ScanReport::default();
        }

        let now = self.clock.now();
        self.overlays.expire(now);
        self.batcher.push(records, now);
        let Some(inserted) = self.batcher.take_due(now) else {
            return ScanReport::default();
        };

        let mut report = ScanReport::default();
        let Some(classifier) = self.classifier(document) else {
            return report;
        };
        for node in inserted {
            self.scan_inserted(document, &classifier, node, &mut report);
        }
        report
    }

    /// Capture-phase click. Suspicious-click handling runs first; a click it
    /// leaves alone may still be shielded as a clean in-site click.
    pub fn on_click(&mut self, document: &mut Document, event: &ClickEvent) -> EventOutcome {
        if !self.enabled {
            return EventOutcome::default();
        }
        let Some(classifier) = self.classifier(document) else {
            return EventOutcome::default();
        };

        let intervention =
            events::intercept_suspicious_click(document, event, &classifier, &self.config);
        if let Some(verdict) = &intervention.verdict {
            self.report(verdict);
        }
        if !intervention.outcome.is_untouched() {
            return intervention.outcome;
        }

        events::enforce_clean_click(document, event, &classifier)
    }

    pub fn on_submit(&mut self, document: &Document, event: &SubmitEvent) -> EventOutcome {
        if !self.enabled {
            return EventOutcome::default();
        }
        let Some(classifier) = self.classifier(document) else {
            return EventOutcome::default();
        };

        let intervention = events::guard_submit(document, event, &classifier);
        if let Some(verdict) = &intervention.verdict {
            self.report(verdict);
        }
        intervention.outcome
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::info!(enabled, "bridge state changed");
        }
        self.enabled = enabled;
        if !enabled {
            self.batcher.clear();
        }
        self.page_outbox.push(WindowMessage::state(enabled));
    }

    fn classifier(&self, document: &Document) -> Option<OriginClassifier> {
        OriginClassifier::parse_page(document.url(), Arc::clone(&self.patterns))
            .inspect_err(|error| tracing::debug!(%error, "page guards skipped"))
            .ok()
    }

    fn scan_inserted(
        &mut self,
        document: &mut Document,
        classifier: &OriginClassifier,
        node: NodeId,
        report: &mut ScanReport,
    ) {
        self.check_element(document, classifier, node, report);
        for child in document.element_children(node) {
            self.check_element(document, classifier, child, report);
            if self.config.scan_grandchildren {
                for grandchild in document.element_children(child) {
                    self.check_element(document, classifier, grandchild, report);
                }
            }
        }
    }

    fn check_element(
        &mut self,
        document: &mut Document,
        classifier: &OriginClassifier,
        node: NodeId,
        report: &mut ScanReport,
    ) {
        if !document.is_connected(node) {
            return;
        }
        if document.is_element(node, "meta") {
            self.check_refresh(document, classifier, node, report);
        } else if document.is_element(node, "iframe") {
            self.check_frame(document, classifier, node, report);
        } else if document.is_element(node, "div") {
            self.check_overlay(document, node, report);
        }
    }

    fn check_refresh(
        &mut self,
        document: &mut Document,
        classifier: &OriginClassifier,
        node: NodeId,
        report: &mut ScanReport,
    ) {
        let Some(target) = guards::meta_refresh_url(document, node) else {
            return;
        };
        if !classifier.is_suspicious(&target) {
            return;
        }

        document.remove(node);
        report.removed_refreshes.push(node);
        let verdict = RedirectVerdict::new(
            document.url(),
            target,
            RedirectKind::MetaRefresh,
            ComponentId::Bridge,
        );
        self.report(&verdict);
    }

    fn check_frame(
        &mut self,
        document: &mut Document,
        classifier: &OriginClassifier,
        node: NodeId,
        report: &mut ScanReport,
    ) {
        if guards::contain_frame(document, node, classifier, &self.config) {
            tracing::debug!(node, "third-party frame sandboxed");
            report.contained_frames.push(node);
        }
    }

    fn check_overlay(&mut self, document: &mut Document, node: NodeId, report: &mut ScanReport) {
        if !self.overlays.first_visit(node, self.clock.now()) {
            return;
        }
        if guards::is_forced_overlay(document, node, &self.config) {
            tracing::debug!(node, "forced overlay removed");
            document.remove(node);
            report.removed_overlays.push(node);
        }
    }

    fn report(&self, verdict: &RedirectVerdict) {
        tracing::debug!(kind = verdict.kind.as_str(), to = %verdict.to, "relaying verdict");
        self.port.post(RuntimeMessage::report(verdict));
    }
}
