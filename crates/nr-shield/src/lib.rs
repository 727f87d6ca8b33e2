//! Page-context shield: decides every intercepted navigation entry point.
//!
//! A page realm wraps its native navigation primitives and routes each call
//! through [`PageShield`] before the native behavior runs. Suppressed calls
//! never reach the native realm; they are reported with a same-realm
//! [`WindowMessage`] queued for the bridge to relay, and script gets a
//! [`ZombieWindow`] or an inert timer handle in place of the real result.

pub mod policy;
pub mod zombie;

pub use policy::NavigateEvent;
pub use policy::ShieldPolicy;
pub use zombie::ZombieMember;
pub use zombie::ZombieScope;
pub use zombie::ZombieWindow;

use nr_core::RedirectKind;
use nr_core::RedirectVerdict;
use nr_ipc::WindowMessage;
use nr_ipc::WindowPayload;

/// Interceptable entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vector {
    LocationAssign,
    LocationReplace,
    WindowOpen,
    HistoryPushState,
    HistoryReplaceState,
    SetTimeout,
    NavigateEvent,
}

impl Vector {
    pub const ALL: [Self; 7] = [
        Self::LocationAssign,
        Self::LocationReplace,
        Self::WindowOpen,
        Self::HistoryPushState,
        Self::HistoryReplaceState,
        Self::SetTimeout,
        Self::NavigateEvent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocationAssign => "location.assign",
            Self::LocationReplace => "location.replace",
            Self::WindowOpen => "window.open",
            Self::HistoryPushState => "history.pushState",
            Self::HistoryReplaceState => "history.replaceState",
            Self::SetTimeout => "setTimeout",
            Self::NavigateEvent => "navigation.navigate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|vector| vector.as_str() == name)
    }
}

/// One intercepted call with the arguments the decision needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception<'a> {
    LocationAssign(&'a str),
    LocationReplace(&'a str),
    WindowOpen { url: &'a str, features: &'a str },
    PushState(Option<&'a str>),
    ReplaceState(Option<&'a str>),
    /// String-form timer code. Callable timers are never intercepted.
    StringTimer(&'a str),
    Navigate(&'a NavigateEvent),
}

impl Interception<'_> {
    pub fn vector(&self) -> Vector {
        match self {
            Self::LocationAssign(_) => Vector::LocationAssign,
            Self::LocationReplace(_) => Vector::LocationReplace,
            Self::WindowOpen { .. } => Vector::WindowOpen,
            Self::PushState(_) => Vector::HistoryPushState,
            Self::ReplaceState(_) => Vector::HistoryReplaceState,
            Self::StringTimer(_) => Vector::SetTimeout,
            Self::Navigate(_) => Vector::NavigateEvent,
        }
    }
}

/// Outcome of a pre-navigation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigateDecision {
    Proceed,
    Cancel,
}

/// Interposition state of one page realm.
#[derive(Debug, Clone)]
pub struct PageShield {
    policy: ShieldPolicy,
    skipped: Vec<Vector>,
    enabled: bool,
    suppressed: u64,
    outbox: Vec<WindowMessage>,
}

impl PageShield {
    /// Starts enabled; the bridge corrects it with a `state` message.
    pub fn new(policy: ShieldPolicy) -> Self {
        Self {
            policy,
            skipped: Vec::new(),
            enabled: true,
            suppressed: 0,
            outbox: Vec::new(),
        }
    }

    /// Records an entry point the realm could not wrap. It stays native.
    pub fn mark_skipped(&mut self, vector: Vector) {
        tracing::debug!(vector = vector.as_str(), "entry point not configurable, left native");
        if !self.skipped.contains(&vector) {
            self.skipped.push(vector);
        }
    }

    pub fn is_installed(&self, vector: Vector) -> bool {
        !self.skipped.contains(&vector)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    /// Applies a bridge-to-page message. Foreign messages are ignored.
    pub fn on_window_message(&mut self, message: &WindowMessage) {
        if !message.is_internal() {
            return;
        }
        if let WindowPayload::State { enabled } = message.payload {
            self.enabled = enabled;
        }
    }

    /// Decides one wrapped call made from `page`. `true` means the realm must
    /// not run the native behavior.
    pub fn intercept(&mut self, page: &str, call: Interception<'_>) -> bool {
        if !self.enabled || !self.is_installed(call.vector()) {
            return false;
        }

        let Some(verdict) = self.evaluate(page, call) else {
            return false;
        };
        self.report(verdict);
        true
    }

    /// Pre-navigation event hook.
    pub fn handle_navigate(&mut self, page: &str, event: &NavigateEvent) -> NavigateDecision {
        if self.intercept(page, Interception::Navigate(event)) {
            NavigateDecision::Cancel
        } else {
            NavigateDecision::Proceed
        }
    }

    /// Drains the blocked notifications queued for the bridge.
    pub fn take_outbox(&mut self) -> Vec<WindowMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn evaluate(&self, page: &str, call: Interception<'_>) -> Option<RedirectVerdict> {
        let policy = &self.policy;
        match call {
            Interception::LocationAssign(url) => {
                policy.check_location(page, url, RedirectKind::LocationAssign)
            }
            Interception::LocationReplace(url) => {
                policy.check_location(page, url, RedirectKind::LocationReplace)
            }
            Interception::WindowOpen { url, features } => {
                policy.check_window_open(page, url, features)
            }
            Interception::PushState(url) => {
                policy.check_history(page, url, RedirectKind::HistoryPushState)
            }
            Interception::ReplaceState(url) => {
                policy.check_history(page, url, RedirectKind::HistoryReplaceState)
            }
            Interception::StringTimer(code) => policy.check_timer_source(page, code),
            Interception::Navigate(event) => policy.check_navigate(page, event),
        }
    }

    fn report(&mut self, verdict: RedirectVerdict) {
        tracing::debug!(kind = verdict.kind.as_str(), to = %verdict.to, "page-context navigation suppressed");
        self.suppressed = self.suppressed.saturating_add(1);
        self.outbox.push(WindowMessage::blocked(&verdict));
    }
}

impl Default for PageShield {
    fn default() -> Self {
        Self::new(ShieldPolicy::default())
    }
}
