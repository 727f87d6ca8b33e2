//! Background coordinator: per-tab baselines, block recording and the
//! runtime message contract.
//!
//! The coordinator is the only realm with cross-tab visibility and storage
//! access. It reverts committed cross-origin redirects, closes popups spawned
//! toward foreign origins, and keeps counters, history and the badge in step.

pub mod config;
pub mod host;
pub mod navigation;

pub use config::CoordinatorConfig;
pub use config::DEFAULT_RULESET_ID;
pub use host::Badge;
pub use host::BrowserHost;
pub use host::HostAction;
pub use host::RecordingHost;
pub use navigation::BaselineTable;
pub use navigation::NavigationEvent;
pub use navigation::NavigationOrigin;
pub use navigation::TOP_LEVEL_FRAME;
pub use navigation::TransitionQualifier;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use nr_classifier::is_blank_target;
use nr_classifier::origins_differ;
use nr_core::BlockEntry;
use nr_core::BlockHistory;
use nr_core::Clock;
use nr_core::GuardResult;
use nr_core::NO_TAB;
use nr_core::RedirectKind;
use nr_core::TabId;
use nr_ipc::BlockNotification;
use nr_ipc::Envelope;
use nr_ipc::LocalEndpoint;
use nr_ipc::RuntimeMessage;
use nr_ipc::RuntimeResponse;
use nr_ipc::StatusSnapshot;
use nr_storage::KEY_ENABLED;
use nr_storage::KEY_RECENT_BLOCKS;
use nr_storage::KEY_SESSION_BLOCKED;
use nr_storage::KeyValueStore;
use nr_storage::PersistedState;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Placeholder for a block whose target is unknown.
pub const UNKNOWN_TARGET: &str = "(unknown)";
/// Placeholder source for in-page reports without one.
pub const CURRENT_PAGE: &str = "(current page)";
/// Source recorded for rule matches without an initiator.
pub const NETWORK_INITIATOR: &str = "(network)";

const MAX_PATH_CHARS: usize = 30;
const MAX_RAW_CHARS: usize = 60;

pub struct Coordinator<H> {
    config: CoordinatorConfig,
    store: Box<dyn KeyValueStore>,
    host: H,
    clock: Arc<dyn Clock>,
    baselines: BaselineTable,
    enabled: bool,
    session_blocked: u64,
    last_sweep: DateTime<Utc>,
}

impl<H: BrowserHost> Coordinator<H> {
    /// Restores the enabled flag and counters from `store`.
    pub fn new(
        config: CoordinatorConfig,
        store: Box<dyn KeyValueStore>,
        host: H,
        clock: Arc<dyn Clock>,
    ) -> GuardResult<Self> {
        let state = PersistedState::load(store.as_ref())?;
        let last_sweep = clock.now();
        Ok(Self {
            config,
            store,
            host,
            clock,
            baselines: BaselineTable::default(),
            enabled: state.enabled,
            session_blocked: 0,
            last_sweep,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn baselines(&self) -> &BaselineTable {
        &self.baselines
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn session_blocked(&self) -> u64 {
        self.session_blocked
    }

    /// First install: every persisted key back to its default.
    pub fn on_installed(&mut self) -> GuardResult<()> {
        let state = PersistedState::default();
        state.save(self.store.as_mut())?;
        self.enabled = state.enabled;
        self.session_blocked = 0;
        self.baselines = BaselineTable::default();
        self.refresh_badge();
        tracing::info!("store reset on install");
        Ok(())
    }

    /// Browser start: keeps the enabled flag, zeroes the session counter.
    pub fn on_startup(&mut self) -> GuardResult<()> {
        let state = PersistedState::load(self.store.as_ref())?;
        self.store.set(KEY_SESSION_BLOCKED, Value::from(0_u64))?;
        self.enabled = state.enabled;
        self.session_blocked = 0;
        self.refresh_badge();
        tracing::info!(
            enabled = self.enabled,
            total_blocked = state.total_blocked,
            "coordinator started"
        );
        Ok(())
    }

    /// Feeds one navigation-lifecycle event. Returns the block it caused, if any.
    pub fn handle_event(&mut self, event: &NavigationEvent) -> GuardResult<Option<BlockEntry>> {
        self.tick();
        match event {
            NavigationEvent::BeforeNavigate {
                tab_id,
                frame_id,
                url,
                source_url,
            } => {
                self.on_before_navigate(*tab_id, *frame_id, source_url.as_deref().unwrap_or(url));
                Ok(None)
            }
            NavigationEvent::Committed {
                tab_id,
                frame_id,
                url,
                qualifiers,
            } => self.on_committed(*tab_id, *frame_id, url, qualifiers),
            NavigationEvent::CreatedNavigationTarget {
                source_tab_id,
                tab_id,
                url,
            } => self.on_created_navigation_target(*source_tab_id, *tab_id, url),
            NavigationEvent::TabRemoved { tab_id } => {
                self.on_tab_removed(*tab_id);
                Ok(None)
            }
            NavigationEvent::RuleMatched {
                tab_id,
                initiator,
                url,
            } => self.on_rule_matched(*tab_id, initiator.as_deref(), url),
        }
    }

    /// Remembers where a tab was before its first tracked navigation.
    pub fn on_before_navigate(&mut self, tab: TabId, frame_id: i64, current_url: &str) {
        if !self.enabled || frame_id != TOP_LEVEL_FRAME {
            return;
        }
        let now = self.clock.now();
        if self.baselines.set_if_absent(tab, current_url, now) {
            tracing::trace!(tab, url = current_url, "baseline recorded");
        }
    }

    /// Reverts cross-origin redirect commits; anything else becomes the new baseline.
    pub fn on_committed(
        &mut self,
        tab: TabId,
        frame_id: i64,
        url: &str,
        qualifiers: &[TransitionQualifier],
    ) -> GuardResult<Option<BlockEntry>> {
        if !self.enabled || frame_id != TOP_LEVEL_FRAME {
            return Ok(None);
        }

        if let Some(kind) = redirect_kind(qualifiers) {
            let baseline = self
                .baselines
                .get(tab)
                .filter(|origin| origin.url != url && origins_differ(&origin.url, url))
                .map(|origin| origin.url.clone());

            if let Some(baseline) = baseline {
                let entry = self.record_block(tab, &baseline, url, kind)?;
                if let Err(error) = self.host.update_tab(tab, &baseline) {
                    tracing::warn!(
                        code = "coordinator.tab_update_failed",
                        tab,
                        %error,
                        "could not revert redirected tab"
                    );
                }
                return Ok(Some(entry));
            }
        }

        let now = self.clock.now();
        self.baselines.set(tab, url, now);
        Ok(None)
    }

    /// Closes new tabs opened from a tracked tab toward a foreign origin.
    pub fn on_created_navigation_target(
        &mut self,
        source_tab: TabId,
        new_tab: TabId,
        url: &str,
    ) -> GuardResult<Option<BlockEntry>> {
        if !self.enabled || is_blank_target(url) {
            return Ok(None);
        }
        let Some(source) = self
            .baselines
            .get(source_tab)
            .filter(|origin| origins_differ(&origin.url, url))
            .map(|origin| origin.url.clone())
        else {
            return Ok(None);
        };

        let entry = self.record_block(source_tab, &source, url, RedirectKind::PopupRedirect)?;
        if let Err(error) = self.host.remove_tab(new_tab) {
            tracing::warn!(
                code = "coordinator.tab_remove_failed",
                tab = new_tab,
                %error,
                "could not close popup tab"
            );
        }
        Ok(Some(entry))
    }

    pub fn on_tab_removed(&mut self, tab: TabId) {
        self.baselines.remove(tab);
    }

    /// Declarative rule-match feedback.
    pub fn on_rule_matched(
        &mut self,
        tab: TabId,
        initiator: Option<&str>,
        url: &str,
    ) -> GuardResult<Option<BlockEntry>> {
        if !self.enabled {
            return Ok(None);
        }
        let from = initiator.unwrap_or(NETWORK_INITIATOR);
        self.record_block(tab, from, url, RedirectKind::NetworkRule)
            .map(Some)
    }

    /// Runs the baseline sweep when its interval has elapsed.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        if now - self.last_sweep < self.config.sweep_interval() {
            return 0;
        }
        self.last_sweep = now;
        self.sweep_baselines(now)
    }

    pub fn sweep_baselines(&mut self, now: DateTime<Utc>) -> usize {
        let removed = self.baselines.sweep(now, self.config.baseline_idle());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.baselines.len(), "idle baselines evicted");
        }
        removed
    }

    /// Counts, persists and announces one suppressed redirect.
    pub fn record_block(
        &mut self,
        tab: TabId,
        from: &str,
        to: &str,
        kind: RedirectKind,
    ) -> GuardResult<BlockEntry> {
        let now = self.clock.now();
        let mut state = PersistedState::load(self.store.as_ref())?;

        let entry = BlockEntry {
            id: now.timestamp_millis(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            from: truncate_url(from),
            to: truncate_url(to),
            kind,
            tab_id: tab,
        };

        self.session_blocked = self.session_blocked.saturating_add(1);
        let mut history = BlockHistory::from_entries(
            self.config.history_capacity,
            std::mem::take(&mut state.recent_blocks),
        );
        history.record(entry.clone());

        state.recent_blocks = history.into_entries();
        state.total_blocked = state.total_blocked.saturating_add(1);
        state.session_blocked = self.session_blocked;
        state.enabled = self.enabled;
        state.save(self.store.as_mut())?;

        tracing::debug!(
            tab,
            kind = kind.as_str(),
            from = entry.from.as_str(),
            to = entry.to.as_str(),
            "redirect blocked"
        );
        self.refresh_badge();
        self.notify(&RuntimeMessage::BlockRecorded {
            data: BlockNotification {
                session_blocked: self.session_blocked,
                total_blocked: state.total_blocked,
                entry: entry.clone(),
            },
        });
        Ok(entry)
    }

    /// In-page report. Missing fields fall back to placeholders.
    pub fn report_block(
        &mut self,
        from: Option<&str>,
        to: Option<&str>,
        kind: Option<RedirectKind>,
        sender_tab: Option<TabId>,
    ) -> GuardResult<BlockEntry> {
        self.record_block(
            sender_tab.unwrap_or(NO_TAB),
            from.unwrap_or(CURRENT_PAGE),
            to.unwrap_or(UNKNOWN_TARGET),
            kind.unwrap_or(RedirectKind::JsRedirect),
        )
    }

    /// Flips protection, keeping the declarative ruleset in lockstep.
    pub fn toggle(&mut self) -> GuardResult<bool> {
        let enabled = !self.enabled;
        self.store.set(KEY_ENABLED, Value::from(enabled))?;
        self.enabled = enabled;
        self.refresh_badge();

        if let Err(error) = self
            .host
            .set_ruleset_enabled(&self.config.ruleset_id, enabled)
        {
            tracing::warn!(
                code = "coordinator.ruleset_toggle_failed",
                ruleset = self.config.ruleset_id.as_str(),
                %error,
                "could not update declarative rules"
            );
        }
        self.notify(&RuntimeMessage::StateChanged { enabled });
        tracing::info!(enabled, "protection toggled");
        Ok(enabled)
    }

    pub fn status(&self) -> GuardResult<StatusSnapshot> {
        let state = PersistedState::load(self.store.as_ref())?;
        Ok(StatusSnapshot {
            enabled: self.enabled,
            session_blocked: self.session_blocked,
            total_blocked: state.total_blocked,
            recent_blocks: state.recent_blocks,
        })
    }

    /// Empties the history list. Counters stay.
    pub fn clear_history(&mut self) -> GuardResult<()> {
        self.store.set(KEY_RECENT_BLOCKS, Value::Array(Vec::new()))
    }

    /// Answers one runtime message. `None` for messages the coordinator only sends.
    pub fn handle_message(
        &mut self,
        message: RuntimeMessage,
        sender_tab: Option<TabId>,
    ) -> Option<RuntimeResponse> {
        match message {
            RuntimeMessage::IsEnabled => Some(RuntimeResponse::Enabled {
                enabled: self.enabled,
            }),
            RuntimeMessage::Toggle => {
                let enabled = self
                    .toggle()
                    .inspect_err(|error| tracing::warn!(%error, "toggle not persisted"))
                    .unwrap_or(self.enabled);
                Some(RuntimeResponse::Enabled { enabled })
            }
            RuntimeMessage::GetStatus => {
                let snapshot = self.status().unwrap_or_else(|error| {
                    tracing::warn!(%error, "status read failed");
                    StatusSnapshot {
                        enabled: self.enabled,
                        session_blocked: self.session_blocked,
                        total_blocked: 0,
                        recent_blocks: Vec::new(),
                    }
                });
                Some(RuntimeResponse::Status(snapshot))
            }
            RuntimeMessage::ContentScriptBlocked { from, to, kind } => {
                let ok = self
                    .report_block(from.as_deref(), to.as_deref(), kind, sender_tab)
                    .inspect_err(|error| tracing::warn!(%error, "report not recorded"))
                    .is_ok();
                Some(RuntimeResponse::Ack { ok })
            }
            RuntimeMessage::ClearHistory => {
                let ok = self
                    .clear_history()
                    .inspect_err(|error| tracing::warn!(%error, "history not cleared"))
                    .is_ok();
                Some(RuntimeResponse::Ack { ok })
            }
            RuntimeMessage::StateChanged { .. } | RuntimeMessage::BlockRecorded { .. } => {
                tracing::debug!(action = message.action(), "ignoring outbound-only message");
                None
            }
        }
    }

    /// Serves envelopes from one isolated realm until the channel goes quiet
    /// for `idle_timeout` or closes. Returns the number of envelopes handled.
    pub fn serve(
        &mut self,
        endpoint: &LocalEndpoint,
        sender_tab: Option<TabId>,
        idle_timeout: Duration,
    ) -> usize {
        let mut handled = 0;
        loop {
            let envelope = match endpoint.recv_timeout(idle_timeout) {
                Ok(envelope) => envelope,
                Err(error) if error.code == "ipc.recv_failed" => break,
                Err(error) => {
                    tracing::debug!(%error, "dropping undecodable envelope");
                    continue;
                }
            };
            self.tick();

            match envelope {
                Envelope::Request { id, message } => {
                    let response = self
                        .handle_message(message, sender_tab)
                        .unwrap_or(RuntimeResponse::Ack { ok: false });
                    if let Err(error) = endpoint.send(&Envelope::Response { id, response }) {
                        tracing::debug!(%error, id, "response dropped");
                    }
                }
                Envelope::Post { message } => {
                    let _ = self.handle_message(message, sender_tab);
                }
                Envelope::Response { id, .. } => {
                    tracing::debug!(id, "ignoring stray response");
                }
            }
            handled += 1;
        }
        handled
    }

    fn refresh_badge(&mut self) {
        let badge = Badge::for_state(self.enabled, self.session_blocked);
        self.host.set_badge(&badge);
    }

    fn notify(&mut self, message: &RuntimeMessage) {
        if let Err(error) = self.host.broadcast(message) {
            tracing::trace!(%error, action = message.action(), "no listener for broadcast");
        }
    }
}

/// Redirect qualifier of a commit. A server redirect outranks a client one.
fn redirect_kind(qualifiers: &[TransitionQualifier]) -> Option<RedirectKind> {
    if qualifiers.contains(&TransitionQualifier::ServerRedirect) {
        Some(RedirectKind::ServerRedirect)
    } else if qualifiers.contains(&TransitionQualifier::ClientRedirect) {
        Some(RedirectKind::ClientRedirect)
    } else {
        None
    }
}

/// Compact display form stored in history: host plus a shortened path.
pub fn truncate_url(raw: &str) -> String {
    if raw.is_empty() {
        return UNKNOWN_TARGET.to_owned();
    }

    match Url::parse(raw) {
        Ok(url) => format!(
            "{}{}",
            url.host_str().unwrap_or_default(),
            truncate_chars(url.path(), MAX_PATH_CHARS)
        ),
        Err(_) => truncate_chars(raw, MAX_RAW_CHARS),
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::Coordinator;
    use super::CoordinatorConfig;
    use super::HostAction;
    use super::NavigationEvent;
    use super::RecordingHost;
    use super::TransitionQualifier;
    use super::truncate_url;
    use chrono::TimeDelta;
    use nr_core::ManualClock;
    use nr_core::RedirectKind;
    use nr_ipc::RuntimeMessage;
    use nr_ipc::RuntimeResponse;
    use nr_storage::KEY_ENABLED;
    use nr_storage::KeyValueStore;
    use nr_storage::MemoryStore;
    use nr_storage::PersistedState;
    use serde_json::Value;
    use std::sync::Arc;

    fn coordinator_with(store: MemoryStore) -> (Coordinator<RecordingHost>, ManualClock) {
        let clock = ManualClock::default();
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            Box::new(store),
            RecordingHost::listening(),
            Arc::new(clock.clone()),
        )
        .unwrap_or_else(|_| unreachable!());
        (coordinator, clock)
    }

    fn coordinator() -> (Coordinator<RecordingHost>, ManualClock) {
        coordinator_with(MemoryStore::default())
    }

    fn visit(coordinator: &mut Coordinator<RecordingHost>, tab: i64, url: &str) {
        coordinator.on_before_navigate(tab, 0, url);
        let committed = coordinator.on_committed(tab, 0, url, &[]);
        assert!(matches!(committed, Ok(None)));
    }

    #[test]
    fn server_redirect_to_foreign_origin_is_reverted() {
        let (mut coordinator, _) = coordinator();
        visit(&mut coordinator, 7, "https://site.test/a");

        let entry = coordinator
            .on_committed(
                7,
                0,
                "https://ads.example/b",
                &[TransitionQualifier::ServerRedirect],
            )
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());

        assert_eq!(entry.kind, RedirectKind::ServerRedirect);
        assert_eq!(entry.from, "site.test/a");
        assert_eq!(entry.to, "ads.example/b");
        assert_eq!(entry.tab_id, 7);
        assert!(coordinator.host().actions().contains(&HostAction::TabUpdated {
            tab: 7,
            url: "https://site.test/a".to_owned(),
        }));
        assert_eq!(
            coordinator.baselines().get(7).map(|origin| origin.url.as_str()),
            Some("https://site.test/a")
        );
        assert_eq!(coordinator.session_blocked(), 1);
    }

    #[test]
    fn server_qualifier_wins_over_client() {
        let (mut coordinator, _) = coordinator();
        visit(&mut coordinator, 1, "https://site.test/");
        let entry = coordinator
            .on_committed(
                1,
                0,
                "https://ads.example/",
                &[
                    TransitionQualifier::ClientRedirect,
                    TransitionQualifier::ServerRedirect,
                ],
            )
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(entry.map(|entry| entry.kind), Some(RedirectKind::ServerRedirect));
    }

    #[test]
    fn same_origin_redirect_moves_baseline() {
        let (mut coordinator, _) = coordinator();
        visit(&mut coordinator, 2, "https://site.test/a");
        let committed = coordinator.on_committed(
            2,
            0,
            "https://site.test/b",
            &[TransitionQualifier::ClientRedirect],
        );
        assert!(matches!(committed, Ok(None)));
        assert_eq!(
            coordinator.baselines().get(2).map(|origin| origin.url.as_str()),
            Some("https://site.test/b")
        );
    }

    #[test]
    fn plain_cross_origin_commit_is_user_navigation() {
        let (mut coordinator, _) = coordinator();
        visit(&mut coordinator, 3, "https://site.test/");
        let committed = coordinator.on_committed(
            3,
            0,
            "https://other.test/",
            &[TransitionQualifier::FromAddressBar],
        );
        assert!(matches!(committed, Ok(None)));
        assert_eq!(
            coordinator.baselines().get(3).map(|origin| origin.url.as_str()),
            Some("https://other.test/")
        );
    }

    #[test]
    fn subframe_events_are_ignored() {
        let (mut coordinator, _) = coordinator();
        coordinator.on_before_navigate(4, 3, "https://frame.test/");
        assert!(coordinator.baselines().is_empty());
    }

    #[test]
    fn foreign_popup_is_closed() {
        let (mut coordinator, _) = coordinator();
        visit(&mut coordinator, 5, "https://site.test/");

        let blank = coordinator.on_created_navigation_target(5, 6, "about:blank");
        assert!(matches!(blank, Ok(None)));

        let entry = coordinator
            .on_created_navigation_target(5, 8, "https://ads.example/pop")
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());
        assert_eq!(entry.kind, RedirectKind::PopupRedirect);
        assert_eq!(entry.tab_id, 5);
        assert!(
            coordinator
                .host()
                .actions()
                .contains(&HostAction::TabRemoved { tab: 8 })
        );
    }

    #[test]
    fn popup_from_untracked_tab_is_allowed() {
        let (mut coordinator, _) = coordinator();
        let result = coordinator.on_created_navigation_target(9, 10, "https://ads.example/");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn failed_revert_still_records() {
        let clock = ManualClock::default();
        let mut coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            Box::new(MemoryStore::default()),
            RecordingHost::listening().with_failing_tabs(),
            Arc::new(clock),
        )
        .unwrap_or_else(|_| unreachable!());
        visit(&mut coordinator, 7, "https://site.test/a");

        let entry = coordinator.on_committed(
            7,
            0,
            "https://ads.example/b",
            &[TransitionQualifier::ClientRedirect],
        );
        assert!(matches!(entry, Ok(Some(_))));
        assert_eq!(coordinator.session_blocked(), 1);
    }

    #[test]
    fn rule_match_uses_network_placeholder() {
        let (mut coordinator, _) = coordinator();
        let entry = coordinator
            .on_rule_matched(4, None, "https://track.example/pixel")
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());
        assert_eq!(entry.kind, RedirectKind::NetworkRule);
        assert_eq!(entry.from, "(network)");
        assert_eq!(entry.to, "track.example/pixel");
    }

    #[test]
    fn sparse_report_gets_placeholders() {
        let (mut coordinator, _) = coordinator();
        let response = coordinator.handle_message(
            RuntimeMessage::ContentScriptBlocked {
                from: None,
                to: None,
                kind: None,
            },
            None,
        );
        assert_eq!(response, Some(RuntimeResponse::Ack { ok: true }));

        let status = coordinator.status().unwrap_or_else(|_| unreachable!());
        let entry = &status.recent_blocks[0];
        assert_eq!(entry.from, "(current page)");
        assert_eq!(entry.to, "(unknown)");
        assert_eq!(entry.kind, RedirectKind::JsRedirect);
        assert_eq!(entry.tab_id, -1);
    }

    #[test]
    fn block_is_announced_and_badged() {
        let (mut coordinator, _) = coordinator();
        coordinator
            .report_block(Some("https://site.test/"), Some("https://x.test/"), None, Some(3))
            .unwrap_or_else(|_| unreachable!());

        let host = coordinator.host();
        assert_eq!(host.last_badge().map(|badge| badge.text.as_str()), Some("1"));
        let broadcasts = host.broadcasts();
        let Some(RuntimeMessage::BlockRecorded { data }) = broadcasts.last() else {
            unreachable!();
        };
        assert_eq!(data.session_blocked, 1);
        assert_eq!(data.total_blocked, 1);
        assert_eq!(data.entry.timestamp, "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn missing_listener_does_not_fail_recording() {
        let mut coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            Box::new(MemoryStore::default()),
            RecordingHost::default(),
            Arc::new(ManualClock::default()),
        )
        .unwrap_or_else(|_| unreachable!());
        assert!(coordinator.record_block(1, "a", "b", RedirectKind::MetaRefresh).is_ok());
        assert!(coordinator.host().broadcasts().is_empty());
    }

    #[test]
    fn clear_history_keeps_counters() {
        let (mut coordinator, _) = coordinator();
        for _ in 0..3 {
            coordinator
                .record_block(1, "https://a.test/", "https://b.test/", RedirectKind::WindowOpen)
                .unwrap_or_else(|_| unreachable!());
        }
        assert_eq!(
            coordinator.handle_message(RuntimeMessage::ClearHistory, None),
            Some(RuntimeResponse::Ack { ok: true })
        );

        let Some(RuntimeResponse::Status(status)) =
            coordinator.handle_message(RuntimeMessage::GetStatus, None)
        else {
            unreachable!();
        };
        assert!(status.recent_blocks.is_empty());
        assert_eq!(status.total_blocked, 3);
        assert_eq!(status.session_blocked, 3);
    }

    #[test]
    fn toggle_moves_ruleset_and_broadcasts() {
        let (mut coordinator, _) = coordinator();
        assert_eq!(
            coordinator.handle_message(RuntimeMessage::Toggle, Some(1)),
            Some(RuntimeResponse::Enabled { enabled: false })
        );

        let host = coordinator.host();
        assert!(host.actions().contains(&HostAction::RulesetToggled {
            ruleset: "redirect_blocker_rules".to_owned(),
            enabled: false,
        }));
        assert!(
            host.broadcasts()
                .contains(&RuntimeMessage::StateChanged { enabled: false })
        );
        assert_eq!(host.last_badge().map(|badge| badge.text.as_str()), Some("OFF"));
        assert_eq!(
            coordinator.handle_message(RuntimeMessage::IsEnabled, None),
            Some(RuntimeResponse::Enabled { enabled: false })
        );
    }

    #[test]
    fn disabled_coordinator_ignores_navigation() {
        let (mut coordinator, _) = coordinator();
        visit(&mut coordinator, 7, "https://site.test/a");
        coordinator.toggle().unwrap_or_else(|_| unreachable!());

        let committed = coordinator.on_committed(
            7,
            0,
            "https://ads.example/b",
            &[TransitionQualifier::ServerRedirect],
        );
        assert!(matches!(committed, Ok(None)));
        assert!(matches!(
            coordinator.on_rule_matched(7, None, "https://ads.example/"),
            Ok(None)
        ));

        coordinator.on_tab_removed(7);
        assert!(coordinator.baselines().is_empty());
    }

    #[test]
    fn new_coordinator_starts_a_fresh_session() {
        let mut store = MemoryStore::default();
        let state = PersistedState {
            enabled: false,
            total_blocked: 12,
            session_blocked: 4,
            recent_blocks: Vec::new(),
        };
        state.save(&mut store).unwrap_or_else(|_| unreachable!());

        let (mut coordinator, _) = coordinator_with(store);
        assert_eq!(coordinator.session_blocked(), 0);
        assert_eq!(coordinator.status().map(|status| status.session_blocked), Ok(0));
        coordinator.on_startup().unwrap_or_else(|_| unreachable!());

        assert!(!coordinator.is_enabled());
        assert_eq!(coordinator.session_blocked(), 0);
        let status = coordinator.status().unwrap_or_else(|_| unreachable!());
        assert_eq!(status.total_blocked, 12);
        assert_eq!(coordinator.host().last_badge().map(|badge| badge.text.as_str()), Some("OFF"));
    }

    #[test]
    fn install_resets_everything() {
        let mut store = MemoryStore::default();
        store
            .set(KEY_ENABLED, Value::Bool(false))
            .unwrap_or_else(|_| unreachable!());
        let (mut coordinator, _) = coordinator_with(store);
        coordinator
            .record_block(1, "a", "b", RedirectKind::FormSubmit)
            .unwrap_or_else(|_| unreachable!());

        coordinator.on_installed().unwrap_or_else(|_| unreachable!());
        let status = coordinator.status().unwrap_or_else(|_| unreachable!());
        assert!(status.enabled);
        assert_eq!(status.total_blocked, 0);
        assert!(status.recent_blocks.is_empty());
    }

    #[test]
    fn idle_baselines_are_swept_on_schedule() {
        let (mut coordinator, clock) = coordinator();
        visit(&mut coordinator, 1, "https://site.test/");

        clock.advance(TimeDelta::minutes(6));
        visit(&mut coordinator, 2, "https://other.test/");
        assert_eq!(coordinator.baselines().len(), 2);

        clock.advance(TimeDelta::minutes(6));
        assert_eq!(coordinator.tick(), 1);
        assert!(coordinator.baselines().get(1).is_none());
        assert!(coordinator.baselines().get(2).is_some());
    }

    #[test]
    fn replayed_events_drive_the_state_machine() {
        let (mut coordinator, _) = coordinator();
        let events = [
            NavigationEvent::BeforeNavigate {
                tab_id: 7,
                frame_id: 0,
                url: "https://ads.example/b".to_owned(),
                source_url: Some("https://site.test/a".to_owned()),
            },
            NavigationEvent::Committed {
                tab_id: 7,
                frame_id: 0,
                url: "https://ads.example/b".to_owned(),
                qualifiers: vec![TransitionQualifier::ServerRedirect],
            },
        ];

        let mut recorded = Vec::new();
        for event in &events {
            if let Some(entry) = coordinator.handle_event(event).unwrap_or_else(|_| unreachable!()) {
                recorded.push(entry);
            }
        }
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].from, "site.test/a");
    }

    #[test]
    fn truncation_rules() {
        assert_eq!(truncate_url("https://site.test:8443/a?q=1"), "site.test/a");
        assert_eq!(truncate_url(""), "(unknown)");
        assert_eq!(truncate_url("(setTimeout eval)"), "(setTimeout eval)");

        let long_path = format!("https://ads.example/{}", "x".repeat(40));
        assert_eq!(
            truncate_url(&long_path),
            format!("ads.example/{}...", "x".repeat(29))
        );

        let garbage = "g".repeat(70);
        assert_eq!(truncate_url(&garbage), format!("{}...", "g".repeat(60)));
    }
}
