//! Typed messages exchanged between realms.

use nr_core::BlockEntry;
use nr_core::RedirectKind;
use nr_core::RedirectVerdict;
use serde::Deserialize;
use serde::Serialize;

/// Runtime messages routed through the extension messaging layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuntimeMessage {
    /// Isolated → background: current enabled flag, answered with `Enabled`.
    IsEnabled,
    /// Background → isolated, broadcast after every toggle.
    StateChanged { enabled: bool },
    /// Isolated → background: a block detected inside a page.
    ContentScriptBlocked {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        kind: Option<RedirectKind>,
    },
    /// Presentation → background.
    Toggle,
    /// Presentation → background, answered with `Status`.
    GetStatus,
    /// Presentation → background. Counters are untouched.
    ClearHistory,
    /// Background → presentation push after every recorded block.
    BlockRecorded { data: BlockNotification },
}

impl RuntimeMessage {
    pub fn report(verdict: &RedirectVerdict) -> Self {
        Self::ContentScriptBlocked {
            from: Some(verdict.from.clone()),
            to: Some(verdict.to.clone()),
            kind: Some(verdict.kind),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::IsEnabled => "isEnabled",
            Self::StateChanged { .. } => "stateChanged",
            Self::ContentScriptBlocked { .. } => "contentScriptBlocked",
            Self::Toggle => "toggle",
            Self::GetStatus => "getStatus",
            Self::ClearHistory => "clearHistory",
            Self::BlockRecorded { .. } => "blockRecorded",
        }
    }
}

/// Payload of the `blockRecorded` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNotification {
    pub session_blocked: u64,
    pub total_blocked: u64,
    pub entry: BlockEntry,
}

/// Snapshot answered to `getStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub enabled: bool,
    pub session_blocked: u64,
    pub total_blocked: u64,
    pub recent_blocks: Vec<BlockEntry>,
}

/// Background answers. Every request gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuntimeResponse {
    Enabled { enabled: bool },
    Status(StatusSnapshot),
    Ack { ok: bool },
}

/// Frame body on a local channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "envelope", rename_all = "camelCase")]
pub enum Envelope {
    Post { message: RuntimeMessage },
    Request { id: u64, message: RuntimeMessage },
    Response { id: u64, response: RuntimeResponse },
}
