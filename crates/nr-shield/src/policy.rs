//! Suppression decisions for every page-context navigation vector.
//!
//! Decisions are pure: given the page URL and the intercepted arguments they
//! return the verdict to report, or `None` to let the native call proceed.

use nr_classifier::OriginClassifier;
use nr_classifier::PatternTable;
use nr_classifier::is_blank_target;
use nr_core::ComponentId;
use nr_core::RedirectKind;
use nr_core::RedirectVerdict;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

/// Pseudo target reported for suppressed blank popups.
pub const BLANK_POPUP_TARGET: &str = "about:blank (popup)";
/// Pseudo target reported for suppressed string timers.
pub const TIMER_EVAL_TARGET: &str = "(setTimeout eval)";

const PLACEMENT_FEATURES: &[&str] = &[
    "width",
    "height",
    "innerwidth",
    "innerheight",
    "outerwidth",
    "outerheight",
    "left",
    "top",
    "screenx",
    "screeny",
    "popup",
];

static NAVIGATING_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)location\s*[.=]|window\.open|navigate").ok());

/// Pre-navigation event as exposed by the page's navigation API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateEvent {
    pub destination: String,
    pub download: bool,
    pub hash_change: bool,
    pub form_submission: bool,
}

impl NavigateEvent {
    pub fn to(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            download: false,
            hash_change: false,
            form_submission: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShieldPolicy {
    patterns: Arc<PatternTable>,
}

impl ShieldPolicy {
    pub fn new(patterns: Arc<PatternTable>) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &Arc<PatternTable> {
        &self.patterns
    }

    /// `location.assign`, `location.replace` and `location.href = ...`.
    pub fn check_location(
        &self,
        page: &str,
        target: &str,
        kind: RedirectKind,
    ) -> Option<RedirectVerdict> {
        let classifier = self.classifier(page)?;
        classifier
            .is_suspicious(target)
            .then(|| verdict(page, target, kind))
    }

    pub fn check_window_open(
        &self,
        page: &str,
        target: &str,
        features: &str,
    ) -> Option<RedirectVerdict> {
        let classifier = self.classifier(page)?;

        if is_blank_target(target) {
            return has_placement_features(features)
                .then(|| verdict(page, BLANK_POPUP_TARGET, RedirectKind::WindowOpenBlank));
        }

        (classifier.is_suspicious(target) || classifier.is_cross_origin(target))
            .then(|| verdict(page, target, RedirectKind::WindowOpen))
    }

    /// `history.pushState` / `history.replaceState`. Only cross-origin URLs
    /// are dropped; a missing URL never is.
    pub fn check_history(
        &self,
        page: &str,
        target: Option<&str>,
        kind: RedirectKind,
    ) -> Option<RedirectVerdict> {
        let target = target?;
        let classifier = self.classifier(page)?;
        classifier
            .is_cross_origin(target)
            .then(|| verdict(page, target, kind))
    }

    /// String-form timers whose code mentions navigation.
    pub fn check_timer_source(&self, page: &str, code: &str) -> Option<RedirectVerdict> {
        source_navigates(code).then(|| verdict(page, TIMER_EVAL_TARGET, RedirectKind::SetTimeoutEval))
    }

    pub fn check_navigate(&self, page: &str, event: &NavigateEvent) -> Option<RedirectVerdict> {
        if event.download || event.hash_change || event.form_submission {
            return None;
        }
        let classifier = self.classifier(page)?;
        classifier
            .is_suspicious(&event.destination)
            .then(|| verdict(page, &event.destination, RedirectKind::NavigationApi))
    }

    fn classifier(&self, page: &str) -> Option<OriginClassifier> {
        OriginClassifier::parse_page(page, Arc::clone(&self.patterns)).ok()
    }
}

/// True when code text references location mutation, `window.open` or navigation.
pub fn source_navigates(code: &str) -> bool {
    NAVIGATING_CODE
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(code))
}

/// True when a `window.open` feature string sizes or places a window.
pub fn has_placement_features(features: &str) -> bool {
    features
        .split([',', ' '])
        .filter_map(|item| item.split('=').next())
        .map(|name| name.trim().to_ascii_lowercase())
        .any(|name| PLACEMENT_FEATURES.contains(&name.as_str()))
}

fn verdict(page: &str, target: &str, kind: RedirectKind) -> RedirectVerdict {
    RedirectVerdict::new(page, target, kind, ComponentId::PageShield)
}
