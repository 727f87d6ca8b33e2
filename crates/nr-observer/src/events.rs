//! Capture-phase click and submit policies.
//!
//! Each handler inspects the event target and returns an [`EventOutcome`]
//! describing what the host must do with the event, plus the verdict to
//! report when one was produced.

use crate::config::ObserverConfig;
use crate::guards::is_invisible_click_trap;
use nr_classifier::OriginClassifier;
use nr_core::ComponentId;
use nr_core::RedirectKind;
use nr_core::RedirectVerdict;
use nr_dom::Document;
use nr_dom::NodeId;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static PAGINATION_CLASS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)page-link|pagination|next|prev").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub target: NodeId,
    /// False for script-dispatched clicks.
    pub trusted: bool,
}

impl ClickEvent {
    pub fn user(target: NodeId) -> Self {
        Self {
            target,
            trusted: true,
        }
    }

    pub fn synthetic(target: NodeId) -> Self {
        Self {
            target,
            trusted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitEvent {
    pub form: NodeId,
}

/// What the host does with a dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub stop_immediate_propagation: bool,
    pub stop_propagation: bool,
    pub prevent_default: bool,
    /// Navigate the page here instead.
    pub navigate_to: Option<String>,
    /// Element detached from the document while handling the event.
    pub removed: Option<NodeId>,
}

impl EventOutcome {
    pub fn cancelled() -> Self {
        Self {
            stop_propagation: true,
            prevent_default: true,
            ..Self::default()
        }
    }

    /// Page listeners are skipped but the native activation still happens.
    pub fn shielded() -> Self {
        Self {
            stop_immediate_propagation: true,
            stop_propagation: true,
            ..Self::default()
        }
    }

    pub fn is_untouched(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome plus the verdict to relay, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Intervention {
    pub outcome: EventOutcome,
    pub verdict: Option<RedirectVerdict>,
}

impl Intervention {
    fn quiet(outcome: EventOutcome) -> Self {
        Self {
            outcome,
            verdict: None,
        }
    }

    fn reported(outcome: EventOutcome, verdict: RedirectVerdict) -> Self {
        Self {
            outcome,
            verdict: Some(verdict),
        }
    }
}

/// Safe in-site navigation keeps its native activation but page listeners
/// never see the click.
/// Links that do not load a web page (`javascript:`, `mailto:`, fragments)
/// keep their page handlers.
pub fn enforce_clean_click(
    document: &Document,
    event: &ClickEvent,
    classifier: &OriginClassifier,
) -> EventOutcome {
    let Some(anchor) = document.closest(event.target, "a") else {
        return EventOutcome::default();
    };
    let Some(href) = document.attribute(anchor, "href").filter(|href| !href.is_empty()) else {
        return EventOutcome::default();
    };
    if href.starts_with('#') || !loads_web_page(classifier, href) {
        return EventOutcome::default();
    }

    let opens_new_tab = document.attribute(anchor, "target") == Some("_blank");
    let safe = is_pagination(document, anchor) || classifier.is_same_origin(href);
    if !safe || opens_new_tab {
        return EventOutcome::default();
    }

    tracing::debug!(href, "clean click");
    EventOutcome::shielded()
}

/// Invisible click traps, synthetic anchor clicks, suspicious new-tab links
/// and tracking hops carrying their real destination in the query.
pub fn intercept_suspicious_click(
    document: &mut Document,
    event: &ClickEvent,
    classifier: &OriginClassifier,
    config: &ObserverConfig,
) -> Intervention {
    if is_invisible_click_trap(document, event.target, config) {
        let mut outcome = EventOutcome::cancelled();
        if document.remove(event.target) {
            outcome.removed = Some(event.target);
        }
        tracing::debug!(node = event.target, "invisible click trap removed");
        return Intervention::quiet(outcome);
    }

    let Some(anchor) = document.closest(event.target, "a") else {
        return Intervention::default();
    };

    if !event.trusted {
        tracing::debug!(anchor, "synthetic anchor click cancelled");
        return Intervention::quiet(EventOutcome::cancelled());
    }

    let Some(href) = document
        .attribute(anchor, "href")
        .filter(|href| !href.is_empty())
        .map(str::to_owned)
    else {
        return Intervention::default();
    };
    if href == "#" || href.starts_with("javascript:") {
        return Intervention::default();
    }

    let page = classifier.page_url().to_string();

    if document.attribute(anchor, "target") == Some("_blank")
        && classifier.is_cross_origin(&href)
        && classifier.is_suspicious(&href)
    {
        let verdict = verdict(&page, &href, RedirectKind::PopupClickIntercept);
        return Intervention::reported(EventOutcome::cancelled(), verdict);
    }

    if let Some(destination) = embedded_destination(classifier, &href, config) {
        let verdict = verdict(&page, &href, RedirectKind::LinkRedirect);
        let outcome = EventOutcome {
            navigate_to: Some(destination),
            ..EventOutcome::cancelled()
        };
        return Intervention::reported(outcome, verdict);
    }

    Intervention::default()
}

/// Cross-origin suspicious form actions are cancelled.
pub fn guard_submit(
    document: &Document,
    event: &SubmitEvent,
    classifier: &OriginClassifier,
) -> Intervention {
    let Some(action) = document
        .attribute(event.form, "action")
        .filter(|action| !action.is_empty())
    else {
        return Intervention::default();
    };

    if classifier.is_cross_origin(action) && classifier.is_suspicious(action) {
        let page = classifier.page_url().to_string();
        return Intervention::reported(
            EventOutcome::cancelled(),
            verdict(&page, action, RedirectKind::FormSubmit),
        );
    }
    Intervention::default()
}

/// Absolute cross-origin http(s) URL carried in a redirect-style query key.
pub fn embedded_destination(
    classifier: &OriginClassifier,
    href: &str,
    config: &ObserverConfig,
) -> Option<String> {
    let resolved = classifier.resolve(href)?;
    resolved.query_pairs().find_map(|(key, value)| {
        if !config.is_redirect_param(&key) {
            return None;
        }
        let embedded = Url::parse(&value).ok()?;
        let navigable = matches!(embedded.scheme(), "http" | "https");
        (navigable && embedded.origin() != *classifier.origin()).then(|| value.into_owned())
    })
}

fn is_pagination(document: &Document, anchor: NodeId) -> bool {
    if document.has_class(anchor, "page-link") {
        return true;
    }
    let class_name = document.attribute(anchor, "class").unwrap_or_default();
    PAGINATION_CLASS
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(class_name))
}

fn loads_web_page(classifier: &OriginClassifier, href: &str) -> bool {
    classifier
        .resolve(href)
        .is_some_and(|target| matches!(target.scheme(), "http" | "https"))
}

fn verdict(page: &str, target: &str, kind: RedirectKind) -> RedirectVerdict {
    RedirectVerdict::new(page, target, kind, ComponentId::Bridge)
}
