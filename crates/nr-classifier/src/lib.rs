//! Origin-change classification shared by every realm.
//!
//! Each realm links its own copy of these functions; nothing here performs
//! I/O or keeps state beyond the configured pattern table. Unparsable input
//! is never cross-origin and never suspicious.

use nr_core::GuardError;
use nr_core::GuardResult;
use regex::RegexSet;
use regex::RegexSetBuilder;
use serde::Deserialize;
use std::sync::Arc;
use url::Origin;
use url::Url;

/// Lexical markers of tracking and redirect infrastructure.
pub const DEFAULT_SUSPICIOUS_PATTERNS: &[&str] = &[
    "redirect",
    "redir",
    "clicktrack",
    r"go\.php",
    "track",
    r"out\.",
    "leave",
    "exit",
    "away",
    r"ad\.",
    r"ads\.",
    "banner",
];

/// Compiled, case-insensitive suspicious-pattern table.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct PatternTable {
    sources: Vec<String>,
    compiled: RegexSet,
}

impl PatternTable {
    pub fn new<I, S>(patterns: I) -> GuardResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let compiled = RegexSetBuilder::new(&sources)
            .case_insensitive(true)
            .build()
            .map_err(|error| {
                GuardError::new(
                    "classifier.pattern_invalid",
                    format!("suspicious pattern table does not compile: {error}"),
                )
            })?;

        Ok(Self { sources, compiled })
    }

    /// A table that matches nothing.
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            compiled: RegexSet::empty(),
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::new(DEFAULT_SUSPICIOUS_PATTERNS.iter().copied()).unwrap_or_else(|_| Self::empty())
    }
}

impl TryFrom<Vec<String>> for PatternTable {
    type Error = GuardError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Resolves `candidate` against `base`, the way a document resolves hrefs.
pub fn resolve(candidate: &str, base: &Url) -> Option<Url> {
    base.join(candidate.trim()).ok()
}

/// True when the resolved candidate's origin differs from `reference`.
pub fn is_cross_origin(candidate: &str, base: &Url, reference: &Origin) -> bool {
    match resolve(candidate, base) {
        Some(target) => target.origin() != *reference,
        None => false,
    }
}

/// True when the candidate is cross-origin or matches a suspicious pattern.
///
/// Pattern matching applies to same-origin targets as well.
pub fn is_suspicious(
    candidate: &str,
    base: &Url,
    reference: &Origin,
    patterns: &PatternTable,
) -> bool {
    if candidate.trim().is_empty() {
        return false;
    }

    let Some(target) = resolve(candidate, base) else {
        return false;
    };

    target.origin() != *reference || patterns.matches(target.as_str())
}

/// Compares two absolute URLs by origin. Either failing to parse means "same".
pub fn origins_differ(left: &str, right: &str) -> bool {
    match (Url::parse(left), Url::parse(right)) {
        (Ok(left), Ok(right)) => left.origin() != right.origin(),
        _ => false,
    }
}

/// True for empty targets and `about:blank` placeholders.
pub fn is_blank_target(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("about:blank")
}

/// Classifier bound to one document: its base URL and origin.
#[derive(Debug, Clone)]
pub struct OriginClassifier {
    page: Url,
    origin: Origin,
    patterns: Arc<PatternTable>,
}

impl OriginClassifier {
    pub fn for_page(page: Url, patterns: Arc<PatternTable>) -> Self {
        let origin = page.origin();
        Self {
            page,
            origin,
            patterns,
        }
    }

    pub fn parse_page(page: &str, patterns: Arc<PatternTable>) -> GuardResult<Self> {
        let parsed = Url::parse(page).map_err(|error| {
            GuardError::new(
                "classifier.page_url_invalid",
                format!("failed to parse page URL `{page}`: {error}"),
            )
        })?;
        Ok(Self::for_page(parsed, patterns))
    }

    pub fn page_url(&self) -> &Url {
        &self.page
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    pub fn resolve(&self, candidate: &str) -> Option<Url> {
        resolve(candidate, &self.page)
    }

    pub fn is_cross_origin(&self, candidate: &str) -> bool {
        is_cross_origin(candidate, &self.page, &self.origin)
    }

    pub fn is_suspicious(&self, candidate: &str) -> bool {
        is_suspicious(candidate, &self.page, &self.origin, &self.patterns)
    }

    /// Same-origin after resolution. Unparsable input is not same-origin.
    pub fn is_same_origin(&self, candidate: &str) -> bool {
        self.resolve(candidate)
            .is_some_and(|target| target.origin() == self.origin)
    }

    /// Re-targets the classifier after a same-document URL change.
    pub fn navigate_to(&mut self, page: Url) {
        self.origin = page.origin();
        self.page = page;
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_SUSPICIOUS_PATTERNS;
    use super::OriginClassifier;
    use super::PatternTable;
    use super::is_blank_target;
    use super::origins_differ;
    use std::sync::Arc;

    fn classifier(page: &str) -> OriginClassifier {
        OriginClassifier::parse_page(page, Arc::new(PatternTable::default()))
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn default_table_compiles_every_pattern() {
        let table = PatternTable::default();
        assert_eq!(table.len(), DEFAULT_SUSPICIOUS_PATTERNS.len());
    }

    #[test]
    fn same_origin_relative_targets_are_not_cross_origin() {
        let page = classifier("https://site.test/a/b");
        assert!(!page.is_cross_origin("/next"));
        assert!(!page.is_cross_origin("c?d=1"));
        assert!(!page.is_cross_origin("https://site.test:443/x"));
    }

    #[test]
    fn scheme_host_and_port_each_split_origins() {
        let page = classifier("https://site.test/");
        assert!(page.is_cross_origin("http://site.test/"));
        assert!(page.is_cross_origin("https://cdn.site.test/"));
        assert!(page.is_cross_origin("https://site.test:8443/"));
        assert!(page.is_cross_origin("//ads.example/x"));
    }

    #[test]
    fn unparsable_targets_fail_open() {
        let page = classifier("https://site.test/");
        assert!(!page.is_cross_origin("http://[::1"));
        assert!(!page.is_suspicious("http://[::1"));
        assert!(!page.is_suspicious(""));
        assert!(!page.is_suspicious("   "));
    }

    #[test]
    fn every_default_token_flags_same_origin_urls() {
        let page = classifier("https://site.test/");
        for token in [
            "redirect", "redir", "clicktrack", "go.php", "track", "out.", "leave", "exit",
            "away", "ad.", "ads.", "banner",
        ] {
            let candidate = format!("/path/{token}/x");
            assert!(page.is_suspicious(&candidate), "token `{token}` not flagged");
        }
    }

    #[test]
    fn pattern_match_is_case_insensitive() {
        let page = classifier("https://site.test/");
        assert!(page.is_suspicious("/ReDiReCt?to=home"));
        assert!(!page.is_suspicious("/chapter/2"));
    }

    #[test]
    fn cross_origin_targets_are_suspicious_without_patterns() {
        let page = OriginClassifier::parse_page("https://site.test/", Arc::new(PatternTable::empty()))
            .unwrap_or_else(|_| unreachable!());
        assert!(page.is_suspicious("https://ads.example/x"));
        assert!(!page.is_suspicious("/redirect"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let table = PatternTable::new(["(unclosed"]);
        assert!(table.is_err());
        if let Err(error) = table {
            assert_eq!(error.code, "classifier.pattern_invalid");
        }
    }

    #[test]
    fn pattern_table_deserializes_from_list() {
        let table: Result<PatternTable, _> = serde_json::from_str(r#"["promo", "sponsor"]"#);
        let table = table.unwrap_or_else(|_| unreachable!());
        assert!(table.matches("https://x.test/SPONSOR"));
        assert!(!table.matches("https://x.test/track"));
    }

    #[test]
    fn absolute_origin_comparison_fails_open() {
        assert!(origins_differ("https://site.test/a", "https://ads.example/b"));
        assert!(!origins_differ("https://site.test/a", "https://site.test/b"));
        assert!(!origins_differ("not a url", "https://ads.example/b"));
    }

    #[test]
    fn blank_targets_are_recognized() {
        assert!(is_blank_target(""));
        assert!(is_blank_target("About:Blank"));
        assert!(!is_blank_target("/blank"));
    }
}
