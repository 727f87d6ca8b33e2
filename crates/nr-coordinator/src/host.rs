//! Browser surfaces the coordinator drives: tabs, the badge, the declarative
//! rule engine and the presentation broadcast.

use nr_core::GuardError;
use nr_core::GuardResult;
use nr_core::TabId;
use nr_ipc::RuntimeMessage;

pub const BADGE_COLOR_ON: &str = "#10B981";
pub const BADGE_COLOR_OFF: &str = "#EF4444";

/// Toolbar activity indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub color: &'static str,
    pub title: String,
}

impl Badge {
    pub fn for_state(enabled: bool, session_blocked: u64) -> Self {
        if !enabled {
            return Self {
                text: "OFF".to_owned(),
                color: BADGE_COLOR_OFF,
                title: "No Redirect — OFF".to_owned(),
            };
        }

        let text = if session_blocked > 0 {
            session_blocked.to_string()
        } else {
            "ON".to_owned()
        };
        Self {
            text,
            color: BADGE_COLOR_ON,
            title: format!("No Redirect — ON ({session_blocked} blocked)"),
        }
    }
}

/// Everything the coordinator asks of the browser.
///
/// Tab and rule-engine failures are reported back so the coordinator can log
/// them; none of them are retried.
pub trait BrowserHost {
    fn update_tab(&mut self, tab: TabId, url: &str) -> GuardResult<()>;
    fn remove_tab(&mut self, tab: TabId) -> GuardResult<()>;
    fn set_badge(&mut self, badge: &Badge);
    fn set_ruleset_enabled(&mut self, ruleset: &str, enabled: bool) -> GuardResult<()>;
    /// Push to presentation surfaces and isolated realms. Failing means nobody listens.
    fn broadcast(&mut self, message: &RuntimeMessage) -> GuardResult<()>;
}

/// One call made against a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    TabUpdated { tab: TabId, url: String },
    TabRemoved { tab: TabId },
    Badge(Badge),
    RulesetToggled { ruleset: String, enabled: bool },
    Broadcast(RuntimeMessage),
}

/// Host that remembers every action, used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    actions: Vec<HostAction>,
    listeners: bool,
    tabs_fail: bool,
}

impl RecordingHost {
    /// Host with a listening presentation surface.
    pub fn listening() -> Self {
        Self {
            listeners: true,
            ..Self::default()
        }
    }

    /// Tab updates and removals fail, as for tabs closed in the meantime.
    pub fn with_failing_tabs(mut self) -> Self {
        self.tabs_fail = true;
        self
    }

    pub fn actions(&self) -> &[HostAction] {
        &self.actions
    }

    pub fn take_actions(&mut self) -> Vec<HostAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn last_badge(&self) -> Option<&Badge> {
        self.actions.iter().rev().find_map(|action| match action {
            HostAction::Badge(badge) => Some(badge),
            _ => None,
        })
    }

    pub fn broadcasts(&self) -> Vec<RuntimeMessage> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                HostAction::Broadcast(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn tab_result(&self, tab: TabId) -> GuardResult<()> {
        if self.tabs_fail {
            return Err(GuardError::new(
                "host.tab_missing",
                format!("no tab with id {tab}"),
            ));
        }
        Ok(())
    }
}

impl BrowserHost for RecordingHost {
    fn update_tab(&mut self, tab: TabId, url: &str) -> GuardResult<()> {
        self.tab_result(tab)?;
        self.actions.push(HostAction::TabUpdated {
            tab,
            url: url.to_owned(),
        });
        Ok(())
    }

    fn remove_tab(&mut self, tab: TabId) -> GuardResult<()> {
        self.tab_result(tab)?;
        self.actions.push(HostAction::TabRemoved { tab });
        Ok(())
    }

    fn set_badge(&mut self, badge: &Badge) {
        self.actions.push(HostAction::Badge(badge.clone()));
    }

    fn set_ruleset_enabled(&mut self, ruleset: &str, enabled: bool) -> GuardResult<()> {
        self.actions.push(HostAction::RulesetToggled {
            ruleset: ruleset.to_owned(),
            enabled,
        });
        Ok(())
    }

    fn broadcast(&mut self, message: &RuntimeMessage) -> GuardResult<()> {
        if !self.listeners {
            return Err(GuardError::new(
                "host.no_listener",
                "could not establish connection, receiving end does not exist",
            ));
        }
        self.actions.push(HostAction::Broadcast(message.clone()));
        Ok(())
    }
}
