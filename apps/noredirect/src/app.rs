//! Realm wiring for one headless invocation: page realm, isolated bridge and
//! coordinator, joined by in-memory ports.

use crate::config::AppConfig;
use nr_classifier::OriginClassifier;
use nr_classifier::PatternTable;
use nr_coordinator::Coordinator;
use nr_coordinator::HostAction;
use nr_coordinator::NavigationEvent;
use nr_coordinator::RecordingHost;
use nr_core::BlockEntry;
use nr_core::Clock;
use nr_core::GuardError;
use nr_core::GuardResult;
use nr_core::ManualClock;
use nr_core::TabId;
use nr_html::HtmlParser;
use nr_ipc::MemoryPort;
use nr_ipc::RuntimeMessage;
use nr_ipc::RuntimeResponse;
use nr_js::JsHostEnvironment;
use nr_js::JsRuntime;
use nr_js::ScriptSource;
use nr_observer::Bridge;
use nr_observer::ScanReport;
use nr_shield::ShieldPolicy;
use nr_storage::StorageConfig;
use std::fmt::Write as _;
use std::sync::Arc;

pub struct App {
    config: AppConfig,
    patterns: Arc<PatternTable>,
    clock: Arc<dyn Clock>,
    coordinator: Coordinator<RecordingHost>,
}

impl App {
    pub fn open(config: AppConfig, storage: &StorageConfig, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        let store = storage.open()?;
        let coordinator = Coordinator::new(
            config.coordinator.clone(),
            store,
            RecordingHost::listening(),
            Arc::clone(&clock),
        )?;
        let patterns = Arc::new(config.patterns.clone());
        Ok(Self {
            config,
            patterns,
            clock,
            coordinator,
        })
    }

    pub fn coordinator(&self) -> &Coordinator<RecordingHost> {
        &self.coordinator
    }

    pub fn classify(&self, url: &str, page: &str) -> GuardResult<String> {
        let classifier = OriginClassifier::parse_page(page, Arc::clone(&self.patterns))?;
        let resolved = classifier
            .resolve(url)
            .map(|url| url.to_string())
            .unwrap_or_else(|| "(unparsable)".to_owned());

        let mut out = String::new();
        let _ = writeln!(out, "target:       {resolved}");
        let _ = writeln!(out, "page origin:  {}", classifier.origin().ascii_serialization());
        let _ = writeln!(out, "cross-origin: {}", yes_no(classifier.is_cross_origin(url)));
        let _ = writeln!(out, "pattern hit:  {}", yes_no(self.patterns.matches(url)));
        let _ = writeln!(out, "suspicious:   {}", yes_no(classifier.is_suspicious(url)));
        Ok(out)
    }

    /// Observer pass over a document. `dynamic` inserts the markup after load
    /// so the mutation path (overlays included) runs instead of the load scan.
    pub fn scan(&mut self, html: &str, page: &str, tab: Option<TabId>, dynamic: bool) -> GuardResult<String> {
        let report = if dynamic {
            self.scan_inserted(html, page, tab)?
        } else {
            let mut bridge = self.bridge(Arc::clone(&self.clock));
            let mut document = HtmlParser.parse(html, page);
            let report = bridge.on_load(&mut document);
            self.relay(&bridge, tab);
            report
        };

        let mut out = String::new();
        let _ = writeln!(out, "page:               {page}");
        let _ = writeln!(out, "protection:         {}", on_off(self.coordinator.is_enabled()));
        let _ = writeln!(out, "removed refreshes:  {}", report.removed_refreshes.len());
        let _ = writeln!(out, "contained frames:   {}", report.contained_frames.len());
        let _ = writeln!(out, "removed overlays:   {}", report.removed_overlays.len());
        self.append_new_blocks(&mut out);
        Ok(out)
    }

    fn scan_inserted(&mut self, html: &str, page: &str, tab: Option<TabId>) -> GuardResult<ScanReport> {
        let timeline = ManualClock::new(self.clock.now());
        let mut bridge = self.bridge(Arc::new(timeline.clone()));
        let mut document = HtmlParser.parse("<html><head></head><body></body></html>", page);
        let body = document.first_element_by_tag("body").ok_or_else(|| {
            GuardError::new("app.scan_body_missing", "parsed shell document has no body")
        })?;
        HtmlParser.parse_fragment(&mut document, body, html)?;

        let mut report = bridge.on_mutations(&mut document);
        timeline.advance(bridge.config().batch_window());
        let flushed = bridge.on_mutations(&mut document);
        report.removed_refreshes.extend(flushed.removed_refreshes);
        report.contained_frames.extend(flushed.contained_frames);
        report.removed_overlays.extend(flushed.removed_overlays);

        self.relay(&bridge, tab);
        Ok(report)
    }

    /// Runs a page script with the shield installed and relays its verdicts.
    pub fn run_script(&mut self, origin: &str, source: &str, page: &str, tab: Option<TabId>) -> String {
        let mut bridge = self.bridge(Arc::clone(&self.clock));
        let host = JsHostEnvironment {
            page_messages: bridge.take_page_messages(),
            ..JsHostEnvironment::for_page(page)
        };
        let runtime = JsRuntime::with_policy(
            self.config.js.clone(),
            ShieldPolicy::new(Arc::clone(&self.patterns)),
        );
        let output = runtime.execute_scripts_with_host(&host, &[ScriptSource::inline(origin, source)]);
        for message in &output.messages {
            bridge.on_window_message(message);
        }
        self.relay(&bridge, tab);

        let mut out = String::new();
        let _ = writeln!(out, "scripts executed: {}", output.report.scripts_executed);
        let _ = writeln!(out, "scripts failed:   {}", output.report.scripts_failed);
        for error in &output.report.errors {
            let _ = writeln!(out, "  error in {}: {}", error.origin, error.message);
        }
        let _ = writeln!(
            out,
            "final location:   {}",
            output.location_href.as_deref().unwrap_or(page)
        );
        for opened in &output.opened_windows {
            let _ = writeln!(out, "opened window:    {opened}");
        }
        for url in &output.history_urls {
            let _ = writeln!(out, "history entry:    {url}");
        }
        self.append_new_blocks(&mut out);
        out
    }

    pub fn status(&self) -> GuardResult<String> {
        let status = self.coordinator.status()?;
        let mut out = String::new();
        let _ = writeln!(out, "protection:    {}", on_off(status.enabled));
        let _ = writeln!(out, "this session:  {}", status.session_blocked);
        let _ = writeln!(out, "total blocked: {}", status.total_blocked);
        if status.recent_blocks.is_empty() {
            let _ = writeln!(out, "no blocks recorded");
        }
        for entry in &status.recent_blocks {
            write_entry(&mut out, entry);
        }
        Ok(out)
    }

    pub fn toggle(&mut self) -> GuardResult<String> {
        let enabled = self.coordinator.toggle()?;
        Ok(format!("protection {}\n", on_off(enabled)))
    }

    pub fn clear_history(&mut self) -> GuardResult<String> {
        self.coordinator.clear_history()?;
        Ok("history cleared\n".to_owned())
    }

    /// Fresh-install reset of every persisted key.
    pub fn reset(&mut self) -> GuardResult<String> {
        self.coordinator.on_installed()?;
        Ok("store reset to defaults\n".to_owned())
    }

    /// Feeds a JSON array of navigation events to the coordinator.
    pub fn replay(&mut self, events_json: &str, startup: bool) -> GuardResult<String> {
        let events: Vec<NavigationEvent> = serde_json::from_str(events_json).map_err(|error| {
            GuardError::new(
                "app.replay_invalid",
                format!("navigation events are not valid JSON: {error}"),
            )
        })?;

        if startup {
            self.coordinator.on_startup()?;
        }
        self.coordinator.host_mut().take_actions();

        let mut out = String::new();
        let mut blocked = 0_usize;
        for event in &events {
            if let Some(entry) = self.coordinator.handle_event(event)? {
                blocked += 1;
                write_entry(&mut out, &entry);
            }
        }

        for action in self.coordinator.host_mut().take_actions() {
            match action {
                HostAction::TabUpdated { tab, url } => {
                    let _ = writeln!(out, "  tab {tab} reverted to {url}");
                }
                HostAction::TabRemoved { tab } => {
                    let _ = writeln!(out, "  tab {tab} closed");
                }
                HostAction::Badge(_)
                | HostAction::RulesetToggled { .. }
                | HostAction::Broadcast(_) => {}
            }
        }
        let _ = writeln!(out, "{} events, {blocked} blocked", events.len());
        Ok(out)
    }

    fn bridge(&self, clock: Arc<dyn Clock>) -> Bridge<MemoryPort> {
        let enabled = self.coordinator.is_enabled();
        let port = MemoryPort::answering(move |message| match message {
            RuntimeMessage::IsEnabled => Some(RuntimeResponse::Enabled { enabled }),
            _ => None,
        });
        Bridge::start(
            port,
            self.config.observer.clone(),
            Arc::clone(&self.patterns),
            clock,
        )
    }

    fn relay(&mut self, bridge: &Bridge<MemoryPort>, tab: Option<TabId>) {
        self.coordinator.host_mut().take_actions();
        for message in bridge.port().take_posted() {
            self.coordinator.handle_message(message, tab);
        }
    }

    fn append_new_blocks(&mut self, out: &mut String) {
        for action in self.coordinator.host_mut().take_actions() {
            if let HostAction::Broadcast(RuntimeMessage::BlockRecorded { data }) = action {
                write_entry(out, &data.entry);
            }
        }
    }
}

fn write_entry(out: &mut String, entry: &BlockEntry) {
    let _ = writeln!(
        out,
        "  [{}] {:<22} {} -> {} (tab {})",
        entry.timestamp,
        entry.kind.as_str(),
        entry.from,
        entry.to,
        entry.tab_id
    );
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::App;
    use crate::config::AppConfig;
    use nr_core::ManualClock;
    use nr_storage::StorageConfig;
    use std::sync::Arc;

    fn app() -> App {
        App::open(
            AppConfig::default(),
            &StorageConfig::ephemeral(),
            Arc::new(ManualClock::default()),
        )
        .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn classify_reports_cross_origin_and_patterns() {
        let out = app()
            .classify("https://ads.example/x", "https://site.test/")
            .unwrap_or_else(|_| unreachable!());
        assert!(out.contains("cross-origin: yes"));
        assert!(out.contains("suspicious:   yes"));

        let same = app()
            .classify("/redirect?to=1", "https://site.test/")
            .unwrap_or_else(|_| unreachable!());
        assert!(same.contains("cross-origin: no"));
        assert!(same.contains("pattern hit:  yes"));
    }

    #[test]
    fn classify_needs_a_valid_page() {
        assert!(app().classify("/x", "not a url").is_err());
    }

    #[test]
    fn load_scan_records_meta_refresh() {
        let mut app = app();
        let out = app
            .scan(
                r#"<html><head><meta http-equiv="refresh" content="5;url=https://track.example/x"></head></html>"#,
                "https://site.test/",
                Some(3),
                false,
            )
            .unwrap_or_else(|_| unreachable!());
        assert!(out.contains("removed refreshes:  1"));
        assert!(out.contains("meta_refresh"));
        assert_eq!(app.coordinator().session_blocked(), 1);
    }

    #[test]
    fn dynamic_scan_runs_the_mutation_path() {
        let mut app = app();
        let out = app
            .scan(
                r#"<div style="position:fixed;z-index:2147483647"></div><meta http-equiv="refresh" content="0;url=https://track.example/x">"#,
                "https://site.test/",
                None,
                true,
            )
            .unwrap_or_else(|_| unreachable!());
        assert!(out.contains("removed overlays:   1"));
        assert!(out.contains("removed refreshes:  1"));
    }

    #[test]
    fn script_verdicts_reach_history() {
        let mut app = app();
        let out = app.run_script(
            "inline:1",
            "location.assign('https://ads.example/x');",
            "https://site.test/a",
            Some(7),
        );
        assert!(out.contains("final location:   https://site.test/a"));
        assert!(out.contains("location_assign"));

        let status = app.status().unwrap_or_else(|_| unreachable!());
        assert!(status.contains("this session:  1"));
        assert!(status.contains("(tab 7)"));
    }

    #[test]
    fn each_run_starts_a_fresh_session() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let storage = StorageConfig::with_root(dir.path());
        let open = || {
            App::open(AppConfig::default(), &storage, Arc::new(ManualClock::default()))
                .unwrap_or_else(|_| unreachable!())
        };

        let mut first = open();
        first.run_script(
            "inline:1",
            "location.assign('https://ads.example/x');",
            "https://site.test/a",
            Some(7),
        );
        assert_eq!(first.coordinator().session_blocked(), 1);
        drop(first);

        let status = open().status().unwrap_or_else(|_| unreachable!());
        assert!(status.contains("this session:  0"));
        assert!(status.contains("total blocked: 1"));
    }

    #[test]
    fn disabled_protection_lets_scripts_navigate() {
        let mut app = app();
        assert_eq!(
            app.toggle().unwrap_or_else(|_| unreachable!()),
            "protection off\n"
        );
        let out = app.run_script(
            "inline:1",
            "location.assign('https://ads.example/x');",
            "https://site.test/a",
            None,
        );
        assert!(out.contains("final location:   https://ads.example/x"));
        assert_eq!(app.coordinator().session_blocked(), 0);
    }

    #[test]
    fn replay_reverts_and_counts() {
        let mut app = app();
        let out = app
            .replay(
                r#"[
                    {"event":"beforeNavigate","tabId":7,"url":"https://site.test/a"},
                    {"event":"committed","tabId":7,"url":"https://site.test/a"},
                    {"event":"committed","tabId":7,"url":"https://ads.example/b","qualifiers":["server_redirect"]},
                    {"event":"createdNavigationTarget","sourceTabId":7,"tabId":9,"url":"https://pop.example/"}
                ]"#,
                true,
            )
            .unwrap_or_else(|_| unreachable!());
        assert!(out.contains("server_redirect"));
        assert!(out.contains("popup_redirect"));
        assert!(out.contains("tab 7 reverted to https://site.test/a"));
        assert!(out.contains("tab 9 closed"));
        assert!(out.contains("4 events, 2 blocked"));
    }

    #[test]
    fn replay_rejects_garbage() {
        assert!(app().replay("{not json", false).is_err());
    }

    #[test]
    fn clear_and_reset() {
        let mut app = app();
        app.run_script("inline:1", "window.open('https://ads.example/');", "https://site.test/", None);
        app.clear_history().unwrap_or_else(|_| unreachable!());
        let status = app.status().unwrap_or_else(|_| unreachable!());
        assert!(status.contains("total blocked: 1"));
        assert!(status.contains("no blocks recorded"));

        app.reset().unwrap_or_else(|_| unreachable!());
        let status = app.status().unwrap_or_else(|_| unreachable!());
        assert!(status.contains("total blocked: 0"));
    }
}
