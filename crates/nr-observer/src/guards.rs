//! Checks on individual elements: refresh metas, frames, overlays.

use crate::config::ObserverConfig;
use nr_classifier::OriginClassifier;
use nr_dom::Document;
use nr_dom::NodeId;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static REFRESH_TARGET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)url\s*=\s*['"]?(.+?)['"]?\s*$"#).ok());

/// Target URL of a refresh `content` value such as `5;url=https://x.test/`.
pub fn refresh_target(content: &str) -> Option<&str> {
    let pattern = REFRESH_TARGET.as_ref()?;
    let captures = pattern.captures(content)?;
    captures
        .get(1)
        .map(|target| target.as_str())
        .filter(|target| !target.is_empty())
}

/// Target of a `<meta http-equiv="refresh">` element, if `node` is one.
pub fn meta_refresh_url(document: &Document, node: NodeId) -> Option<String> {
    if !document.is_element(node, "meta") {
        return None;
    }
    let http_equiv = document.attribute(node, "http-equiv")?;
    if !http_equiv.eq_ignore_ascii_case("refresh") {
        return None;
    }
    let content = document.attribute(node, "content")?;
    refresh_target(content).map(str::to_owned)
}

/// Frame source is same-origin. A frame without `src` is; an unparsable one is not.
pub fn frame_is_same_origin(
    document: &Document,
    node: NodeId,
    classifier: &OriginClassifier,
) -> bool {
    match document.attribute(node, "src") {
        None => true,
        Some(src) if src.trim().is_empty() => true,
        Some(src) => classifier.is_same_origin(src),
    }
}

/// Sandbox already equals the safe token set, in any order.
pub fn has_safe_sandbox(document: &Document, node: NodeId, config: &ObserverConfig) -> bool {
    let Some(current) = document.attribute(node, "sandbox") else {
        return false;
    };
    let current: BTreeSet<&str> = current.split_ascii_whitespace().collect();
    let safe: BTreeSet<&str> = config.safe_sandbox.iter().map(String::as_str).collect();
    current == safe
}

/// Forces the safe sandbox onto a third-party frame. Returns true when the
/// attribute was changed.
pub fn contain_frame(
    document: &mut Document,
    node: NodeId,
    classifier: &OriginClassifier,
    config: &ObserverConfig,
) -> bool {
    if !document.is_element(node, "iframe")
        || frame_is_same_origin(document, node, classifier)
        || has_safe_sandbox(document, node, config)
    {
        return false;
    }

    match document.set_attribute(node, "sandbox", &config.safe_sandbox_value()) {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(%error, node, "frame sandbox not applied");
            false
        }
    }
}

/// Out-of-flow block with an extreme stacking order that is either empty or
/// declared to cover the viewport.
pub fn is_forced_overlay(document: &Document, node: NodeId, config: &ObserverConfig) -> bool {
    if !document.is_element(node, "div") {
        return false;
    }
    let style = document.inline_style(node);
    if !style.is_out_of_flow() {
        return false;
    }
    if !style
        .z_index()
        .is_some_and(|z_index| config.is_extreme_z_index(z_index))
    {
        return false;
    }

    let is_empty = document.element_children(node).is_empty()
        && document.text_content(node).trim().is_empty();
    is_empty || style.covers_viewport()
}

/// Clicked element is an invisible, stacked-on-top click catcher.
pub fn is_invisible_click_trap(
    document: &Document,
    node: NodeId,
    config: &ObserverConfig,
) -> bool {
    let style = document.inline_style(node);
    style.is_out_of_flow()
        && style
            .z_index()
            .is_some_and(|z_index| z_index > config.overlay_z_index_threshold)
        && style.is_visually_hidden()
}

#[cfg(test)]
mod tests {
    use super::contain_frame;
    use super::is_forced_overlay;
    use super::is_invisible_click_trap;
    use super::meta_refresh_url;
    use super::refresh_target;
    use crate::config::ObserverConfig;
    use nr_classifier::OriginClassifier;
    use nr_classifier::PatternTable;
    use nr_dom::Document;
    use std::sync::Arc;

    fn classifier() -> OriginClassifier {
        OriginClassifier::parse_page("https://site.test/", Arc::new(PatternTable::default()))
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn refresh_content_forms() {
        assert_eq!(refresh_target("5;url=https://track.example/x"), Some("https://track.example/x"));
        assert_eq!(refresh_target("0; URL='/next'"), Some("/next"));
        assert_eq!(refresh_target("3"), None);
    }

    #[test]
    fn meta_refresh_requires_http_equiv() {
        let mut document = Document::new("https://site.test/");
        let refresh = document.create_element_with(
            "meta",
            &[("http-equiv", "Refresh"), ("content", "1;url=/x")],
        );
        let plain = document.create_element_with("meta", &[("content", "1;url=/x")]);
        assert_eq!(meta_refresh_url(&document, refresh).as_deref(), Some("/x"));
        assert_eq!(meta_refresh_url(&document, plain), None);
    }

    #[test]
    fn third_party_frames_get_safe_sandbox_once() {
        let config = ObserverConfig::default();
        let classifier = classifier();
        let mut document = Document::new("https://site.test/");
        let foreign = document.create_element_with(
            "iframe",
            &[("src", "https://ads.example/frame"), ("sandbox", "allow-popups allow-scripts")],
        );
        let local = document.create_element_with("iframe", &[("src", "/embed")]);
        let blank = document.create_element("iframe");

        assert!(contain_frame(&mut document, foreign, &classifier, &config));
        assert_eq!(
            document.attribute(foreign, "sandbox"),
            Some("allow-scripts allow-forms allow-same-origin")
        );
        assert!(!contain_frame(&mut document, foreign, &classifier, &config));
        assert!(!contain_frame(&mut document, local, &classifier, &config));
        assert!(!contain_frame(&mut document, blank, &classifier, &config));
    }

    #[test]
    fn unparsable_frame_source_is_contained() {
        let config = ObserverConfig::default();
        let classifier = classifier();
        let mut document = Document::new("https://site.test/");
        let frame = document.create_element_with("iframe", &[("src", "http://[broken")]);
        assert!(contain_frame(&mut document, frame, &classifier, &config));
    }

    #[test]
    fn overlay_needs_position_stacking_and_emptiness() {
        let config = ObserverConfig::default();
        let mut document = Document::new("https://site.test/");
        let overlay = document.create_element_with(
            "div",
            &[("style", "position: fixed; z-index: 2147483647")],
        );
        let covering = document.create_element_with(
            "div",
            &[("style", "position:absolute;z-index:200000;inset:0")],
        );
        let content = document.create_text("Subscribe");
        assert!(document.append_child(covering, content).is_ok());
        let modest = document.create_element_with("div", &[("style", "position: fixed; z-index: 10")]);
        let with_text = document.create_element_with(
            "div",
            &[("style", "position: fixed; z-index: 999999")],
        );
        let text = document.create_text("cookie banner");
        assert!(document.append_child(with_text, text).is_ok());

        assert!(is_forced_overlay(&document, overlay, &config));
        assert!(is_forced_overlay(&document, covering, &config));
        assert!(!is_forced_overlay(&document, modest, &config));
        assert!(!is_forced_overlay(&document, with_text, &config));
    }

    #[test]
    fn click_trap_must_be_invisible() {
        let config = ObserverConfig::default();
        let mut document = Document::new("https://site.test/");
        let trap = document.create_element_with(
            "a",
            &[("style", "position:absolute; z-index:999999; opacity: 0")],
        );
        let visible = document.create_element_with(
            "a",
            &[("style", "position:absolute; z-index:999999")],
        );
        assert!(is_invisible_click_trap(&document, trap, &config));
        assert!(!is_invisible_click_trap(&document, visible, &config));
    }
}
