//! Cross-realm scenarios: page realm, isolated bridge and coordinator wired
//! together the way the headless host wires them.

use chrono::TimeDelta;
use nr_classifier::PatternTable;
use nr_coordinator::Coordinator;
use nr_coordinator::CoordinatorConfig;
use nr_coordinator::HostAction;
use nr_coordinator::NavigationEvent;
use nr_coordinator::RecordingHost;
use nr_coordinator::TransitionQualifier;
use nr_core::ManualClock;
use nr_core::RedirectKind;
use nr_dom::Document;
use nr_html::HtmlParser;
use nr_ipc::ChannelConfig;
use nr_ipc::ChannelPort;
use nr_ipc::MemoryPort;
use nr_ipc::RealmRole;
use nr_ipc::RuntimeMessage;
use nr_ipc::RuntimeResponse;
use nr_ipc::WindowPayload;
use nr_ipc::local_channel_pair;
use nr_js::JsHostEnvironment;
use nr_js::JsRuntime;
use nr_js::JsRuntimeConfig;
use nr_js::ScriptSource;
use nr_observer::Bridge;
use nr_observer::ObserverConfig;
use nr_storage::FileStore;
use nr_storage::MemoryStore;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PAGE: &str = "https://site.test/article";
const REFRESH_PAGE: &str = r#"<html><head><meta http-equiv="refresh" content="5;url=https://track.example/x"></head><body></body></html>"#;

fn memory_coordinator(clock: &ManualClock) -> Coordinator<RecordingHost> {
    Coordinator::new(
        CoordinatorConfig::default(),
        Box::new(MemoryStore::default()),
        RecordingHost::listening(),
        Arc::new(clock.clone()),
    )
    .unwrap_or_else(|_| unreachable!())
}

fn run_page(enabled: bool, source: &str) -> nr_js::JsExecutionOutput {
    let host = JsHostEnvironment {
        shield_enabled: enabled,
        ..JsHostEnvironment::for_page(PAGE)
    };
    JsRuntime::new(JsRuntimeConfig::default())
        .execute_scripts_with_host(&host, &[ScriptSource::inline("inline:1", source)])
}

fn refresh_document() -> Document {
    HtmlParser.parse(REFRESH_PAGE, PAGE)
}

#[test]
fn committed_server_redirect_is_reverted_and_persisted() {
    let root = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let clock = ManualClock::default();
    let store = FileStore::open(root.path()).unwrap_or_else(|_| unreachable!());
    let mut coordinator = Coordinator::new(
        CoordinatorConfig::default(),
        Box::new(store),
        RecordingHost::listening(),
        Arc::new(clock.clone()),
    )
    .unwrap_or_else(|_| unreachable!());

    let events: Vec<NavigationEvent> = serde_json::from_str(
        r#"[
            {"event":"beforeNavigate","tabId":7,"url":"https://site.test/a"},
            {"event":"committed","tabId":7,"url":"https://site.test/a","qualifiers":["from_address_bar"]},
            {"event":"beforeNavigate","tabId":7,"url":"https://ads.example/b","sourceUrl":"https://site.test/a"},
            {"event":"committed","tabId":7,"url":"https://ads.example/b","qualifiers":["server_redirect"]}
        ]"#,
    )
    .unwrap_or_else(|_| unreachable!());

    let mut recorded = Vec::new();
    for event in &events {
        if let Some(entry) = coordinator
            .handle_event(event)
            .unwrap_or_else(|_| unreachable!())
        {
            recorded.push(entry);
        }
    }

    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind, RedirectKind::ServerRedirect);
    assert!(coordinator.host().actions().contains(&HostAction::TabUpdated {
        tab: 7,
        url: "https://site.test/a".to_owned(),
    }));

    let reopened = Coordinator::new(
        CoordinatorConfig::default(),
        Box::new(FileStore::open(root.path()).unwrap_or_else(|_| unreachable!())),
        RecordingHost::default(),
        Arc::new(clock),
    )
    .unwrap_or_else(|_| unreachable!());
    let status = reopened.status().unwrap_or_else(|_| unreachable!());
    assert_eq!(status.total_blocked, 1);
    assert_eq!(status.session_blocked, 0);
    assert_eq!(status.recent_blocks, recorded);
}

#[test]
fn shield_verdict_travels_through_bridge_to_coordinator() {
    let isolated = ChannelConfig::hardened(RealmRole::Isolated).unwrap_or_else(|_| unreachable!());
    let background =
        ChannelConfig::hardened(RealmRole::Background).unwrap_or_else(|_| unreachable!());
    let (near, far) = local_channel_pair(isolated, background).unwrap_or_else(|_| unreachable!());

    let clock = ManualClock::default();
    let coordinator = memory_coordinator(&clock);
    let server = thread::spawn(move || {
        let mut coordinator = coordinator;
        coordinator.serve(&far, Some(7), Duration::from_secs(5));
        coordinator
    });

    let mut bridge = Bridge::start(
        ChannelPort::new(near).with_request_timeout(Duration::from_secs(5)),
        ObserverConfig::default(),
        Arc::new(PatternTable::default()),
        Arc::new(clock.clone()),
    );
    assert!(bridge.is_enabled());

    let output = run_page(true, "window.open('https://ads.example/x');");
    assert!(output.opened_windows.is_empty());
    assert_eq!(output.messages.len(), 1);
    for message in &output.messages {
        bridge.on_window_message(message);
    }
    drop(bridge);

    let coordinator = server.join().unwrap_or_else(|_| unreachable!());
    let status = coordinator.status().unwrap_or_else(|_| unreachable!());
    assert_eq!(status.session_blocked, 1);
    let entry = &status.recent_blocks[0];
    assert_eq!(entry.kind, RedirectKind::WindowOpen);
    assert_eq!(entry.tab_id, 7);
    assert_eq!(entry.from, "site.test/article");
    assert_eq!(entry.to, "ads.example/x");
}

#[test]
fn toggle_halts_and_resumes_without_touching_counters() {
    let clock = ManualClock::default();
    let mut coordinator = memory_coordinator(&clock);
    let port = MemoryPort::answering(|message| match message {
        RuntimeMessage::IsEnabled => Some(RuntimeResponse::Enabled { enabled: true }),
        _ => None,
    });
    let mut bridge = Bridge::start(
        port,
        ObserverConfig::default(),
        Arc::new(PatternTable::default()),
        Arc::new(clock.clone()),
    );
    let mut shield_enabled = true;

    coordinator.on_before_navigate(7, 0, "https://site.test/a");
    coordinator
        .on_committed(7, 0, "https://site.test/a", &[])
        .unwrap_or_else(|_| unreachable!());
    coordinator
        .record_block(7, PAGE, "https://ads.example/", RedirectKind::LocationAssign)
        .unwrap_or_else(|_| unreachable!());

    // Off: every realm lets redirects through.
    assert_eq!(coordinator.toggle(), Ok(false));
    for message in coordinator.host_mut().take_actions() {
        if let HostAction::Broadcast(message) = message {
            bridge.on_runtime_message(&message);
        }
    }
    for message in bridge.take_page_messages() {
        if let WindowPayload::State { enabled } = message.payload {
            shield_enabled = enabled;
        }
    }
    assert!(!bridge.is_enabled());
    assert!(!shield_enabled);

    let mut document = refresh_document();
    assert!(bridge.on_load(&mut document).is_empty());
    let output = run_page(shield_enabled, "location.assign('https://ads.example/x');");
    assert_eq!(output.location_href.as_deref(), Some("https://ads.example/x"));
    assert!(output.messages.is_empty());
    let committed = coordinator.on_committed(
        7,
        0,
        "https://ads.example/b",
        &[TransitionQualifier::ClientRedirect],
    );
    assert!(matches!(committed, Ok(None)));

    let halted = coordinator.status().unwrap_or_else(|_| unreachable!());
    assert_eq!(halted.total_blocked, 1);
    assert_eq!(halted.session_blocked, 1);

    // On again: suppression resumes immediately, counts continue.
    assert_eq!(coordinator.toggle(), Ok(true));
    for message in coordinator.host_mut().take_actions() {
        if let HostAction::Broadcast(message) = message {
            bridge.on_runtime_message(&message);
        }
    }
    for message in bridge.take_page_messages() {
        if let WindowPayload::State { enabled } = message.payload {
            shield_enabled = enabled;
        }
    }
    assert!(bridge.is_enabled());

    let mut document = refresh_document();
    let report = bridge.on_load(&mut document);
    assert_eq!(report.removed_refreshes.len(), 1);
    let output = run_page(shield_enabled, "location.assign('https://ads.example/x');");
    assert_eq!(output.location_href.as_deref(), Some(PAGE));

    for message in bridge.port().take_posted() {
        coordinator.handle_message(message, Some(7));
    }
    for message in &output.messages {
        bridge.on_window_message(message);
    }
    for message in bridge.port().take_posted() {
        coordinator.handle_message(message, Some(7));
    }

    let resumed = coordinator.status().unwrap_or_else(|_| unreachable!());
    assert_eq!(resumed.total_blocked, 3);
    assert_eq!(resumed.session_blocked, 3);
    assert_eq!(resumed.recent_blocks[0].kind, RedirectKind::LocationAssign);
    assert_eq!(resumed.recent_blocks[1].kind, RedirectKind::MetaRefresh);
}

#[test]
fn history_keeps_the_fifty_newest() {
    let clock = ManualClock::default();
    let mut coordinator = memory_coordinator(&clock);

    for index in 0..60 {
        clock.advance(TimeDelta::seconds(1));
        let response = coordinator.handle_message(
            RuntimeMessage::ContentScriptBlocked {
                from: Some(PAGE.to_owned()),
                to: Some(format!("https://ads.example/{index}")),
                kind: Some(RedirectKind::WindowOpen),
            },
            Some(1),
        );
        assert_eq!(response, Some(RuntimeResponse::Ack { ok: true }));
    }

    let status = coordinator.status().unwrap_or_else(|_| unreachable!());
    assert_eq!(status.total_blocked, 60);
    assert_eq!(status.recent_blocks.len(), 50);
    assert_eq!(status.recent_blocks[0].to, "ads.example/59");
    assert_eq!(status.recent_blocks[49].to, "ads.example/10");
    assert!(
        status
            .recent_blocks
            .windows(2)
            .all(|pair| pair[0].id > pair[1].id)
    );
}
