//! Redirect verdicts: the unit of communication between realms.

use serde::Deserialize;
use serde::Serialize;

/// Why a navigation was judged an unwanted redirect.
///
/// The wire names are persisted in block history and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectKind {
    ServerRedirect,
    ClientRedirect,
    PopupRedirect,
    MetaRefresh,
    LocationAssign,
    LocationReplace,
    WindowOpen,
    WindowOpenBlank,
    #[serde(rename = "history_pushstate")]
    HistoryPushState,
    #[serde(rename = "history_replacestate")]
    HistoryReplaceState,
    #[serde(rename = "settimeout_eval")]
    SetTimeoutEval,
    LinkRedirect,
    PopupClickIntercept,
    FormSubmit,
    NetworkRule,
    NavigationApi,
    JsRedirect,
}

impl RedirectKind {
    pub const ALL: [Self; 17] = [
        Self::ServerRedirect,
        Self::ClientRedirect,
        Self::PopupRedirect,
        Self::MetaRefresh,
        Self::LocationAssign,
        Self::LocationReplace,
        Self::WindowOpen,
        Self::WindowOpenBlank,
        Self::HistoryPushState,
        Self::HistoryReplaceState,
        Self::SetTimeoutEval,
        Self::LinkRedirect,
        Self::PopupClickIntercept,
        Self::FormSubmit,
        Self::NetworkRule,
        Self::NavigationApi,
        Self::JsRedirect,
    ];

    /// Stable wire/storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerRedirect => "server_redirect",
            Self::ClientRedirect => "client_redirect",
            Self::PopupRedirect => "popup_redirect",
            Self::MetaRefresh => "meta_refresh",
            Self::LocationAssign => "location_assign",
            Self::LocationReplace => "location_replace",
            Self::WindowOpen => "window_open",
            Self::WindowOpenBlank => "window_open_blank",
            Self::HistoryPushState => "history_pushstate",
            Self::HistoryReplaceState => "history_replacestate",
            Self::SetTimeoutEval => "settimeout_eval",
            Self::LinkRedirect => "link_redirect",
            Self::PopupClickIntercept => "popup_click_intercept",
            Self::FormSubmit => "form_submit",
            Self::NetworkRule => "network_rule",
            Self::NavigationApi => "navigation_api",
            Self::JsRedirect => "js_redirect",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Short human-facing label, as shown in history lists.
    pub fn label(self) -> &'static str {
        match self {
            Self::ServerRedirect => "server redirect",
            Self::ClientRedirect => "client redirect",
            Self::PopupRedirect => "popup redirect",
            Self::MetaRefresh => "meta refresh",
            Self::LocationAssign => "location.assign",
            Self::LocationReplace => "location.replace",
            Self::WindowOpen => "window.open",
            Self::WindowOpenBlank => "window.open (blank popup)",
            Self::HistoryPushState => "history.pushState",
            Self::HistoryReplaceState => "history.replaceState",
            Self::SetTimeoutEval => "setTimeout eval",
            Self::LinkRedirect => "link redirect",
            Self::PopupClickIntercept => "popup click",
            Self::FormSubmit => "form submit",
            Self::NetworkRule => "network rule",
            Self::NavigationApi => "navigation API",
            Self::JsRedirect => "script redirect",
        }
    }
}

/// Realm that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentId {
    PageShield,
    Bridge,
    Coordinator,
}

impl ComponentId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageShield => "page_shield",
            Self::Bridge => "bridge",
            Self::Coordinator => "coordinator",
        }
    }
}

/// Immutable record of one suppression decision.
///
/// `from` and `to` are kept as text: some suppressed targets are pseudo
/// targets such as `(setTimeout eval)` rather than URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectVerdict {
    pub from: String,
    pub to: String,
    pub kind: RedirectKind,
    pub decided_by: ComponentId,
}

impl RedirectVerdict {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: RedirectKind,
        decided_by: ComponentId,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
            decided_by,
        }
    }
}
