//! Navigation-lifecycle events and the per-tab baseline table.

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use nr_core::TabId;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Frame id of a tab's top-level document.
pub const TOP_LEVEL_FRAME: i64 = 0;

/// Why a committed navigation happened, as far as redirects are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionQualifier {
    ClientRedirect,
    ServerRedirect,
    ForwardBack,
    FromAddressBar,
    #[serde(other)]
    Other,
}

/// Events delivered by the browser's navigation-lifecycle source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NavigationEvent {
    BeforeNavigate {
        tab_id: TabId,
        #[serde(default)]
        frame_id: i64,
        url: String,
        /// Document the tab shows while the navigation starts.
        #[serde(default)]
        source_url: Option<String>,
    },
    Committed {
        tab_id: TabId,
        #[serde(default)]
        frame_id: i64,
        url: String,
        #[serde(default)]
        qualifiers: Vec<TransitionQualifier>,
    },
    CreatedNavigationTarget {
        source_tab_id: TabId,
        tab_id: TabId,
        url: String,
    },
    TabRemoved {
        tab_id: TabId,
    },
    /// Declarative rule-match feedback.
    RuleMatched {
        tab_id: TabId,
        #[serde(default)]
        initiator: Option<String>,
        url: String,
    },
}

/// Last known legitimate URL of a tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOrigin {
    pub url: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineTable {
    entries: BTreeMap<TabId, NavigationOrigin>,
}

impl BaselineTable {
    pub fn get(&self, tab: TabId) -> Option<&NavigationOrigin> {
        self.entries.get(&tab)
    }

    pub fn set(&mut self, tab: TabId, url: &str, now: DateTime<Utc>) {
        self.entries.insert(
            tab,
            NavigationOrigin {
                url: url.to_owned(),
                observed_at: now,
            },
        );
    }

    /// Records `url` only for tabs without a baseline.
    pub fn set_if_absent(&mut self, tab: TabId, url: &str, now: DateTime<Utc>) -> bool {
        if self.entries.contains_key(&tab) {
            return false;
        }
        self.set(tab, url, now);
        true
    }

    pub fn remove(&mut self, tab: TabId) -> bool {
        self.entries.remove(&tab).is_some()
    }

    /// Evicts baselines idle for longer than `max_idle`. Returns how many went.
    pub fn sweep(&mut self, now: DateTime<Utc>, max_idle: TimeDelta) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, origin| now - origin.observed_at <= max_idle);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::BaselineTable;
    use super::NavigationEvent;
    use super::TransitionQualifier;
    use chrono::DateTime;
    use chrono::TimeDelta;
    use chrono::Utc;

    #[test]
    fn sweep_evicts_idle_tabs_only() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let mut table = BaselineTable::default();
        table.set(1, "https://a.test/", start);
        table.set(2, "https://b.test/", start + TimeDelta::minutes(8));

        assert_eq!(table.sweep(start + TimeDelta::minutes(11), TimeDelta::minutes(10)), 1);
        assert!(table.get(1).is_none());
        assert!(table.get(2).is_some());
    }

    #[test]
    fn first_baseline_wins() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let mut table = BaselineTable::default();
        assert!(table.set_if_absent(3, "https://a.test/", now));
        assert!(!table.set_if_absent(3, "https://b.test/", now));
        assert_eq!(table.get(3).map(|origin| origin.url.as_str()), Some("https://a.test/"));
    }

    #[test]
    fn replay_json_shape() {
        let raw = r#"{"event":"committed","tabId":7,"url":"https://ads.example/b","qualifiers":["server_redirect","something_new"]}"#;
        let event: NavigationEvent = serde_json::from_str(raw).unwrap_or_else(|_| unreachable!());
        assert_eq!(
            event,
            NavigationEvent::Committed {
                tab_id: 7,
                frame_id: 0,
                url: "https://ads.example/b".to_owned(),
                qualifiers: vec![TransitionQualifier::ServerRedirect, TransitionQualifier::Other],
            }
        );
    }
}
