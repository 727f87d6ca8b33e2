//! Same-realm window messages between the page-context shield and the bridge.

use nr_core::RedirectKind;
use nr_core::RedirectVerdict;
use serde::Deserialize;
use serde::Serialize;

/// Private source tag marking messages as ours rather than the page's.
pub const PAGE_MESSAGE_SOURCE: &str = "no-redirect-extension";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WindowPayload {
    /// Shield → bridge.
    Blocked {
        from: String,
        to: String,
        kind: RedirectKind,
    },
    /// Bridge → shield mirror of the enabled flag.
    State { enabled: bool },
}

/// A `postMessage` payload exchanged inside one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMessage {
    pub source: String,
    #[serde(flatten)]
    pub payload: WindowPayload,
}

impl WindowMessage {
    pub fn blocked(verdict: &RedirectVerdict) -> Self {
        Self {
            source: PAGE_MESSAGE_SOURCE.to_owned(),
            payload: WindowPayload::Blocked {
                from: verdict.from.clone(),
                to: verdict.to.clone(),
                kind: verdict.kind,
            },
        }
    }

    pub fn state(enabled: bool) -> Self {
        Self {
            source: PAGE_MESSAGE_SOURCE.to_owned(),
            payload: WindowPayload::State { enabled },
        }
    }

    pub fn is_internal(&self) -> bool {
        self.source == PAGE_MESSAGE_SOURCE
    }

    /// Decodes a raw page message; anything malformed or foreign is `None`.
    pub fn from_page_json(raw: &str) -> Option<Self> {
        let message: Self = serde_json::from_str(raw).ok()?;
        message.is_internal().then_some(message)
    }
}
