//! Native half of the script shield.
//!
//! Page script calls the `__nr_shield_*` natives from the wrapped entry
//! points. The [`PageShield`] behind them lives in a per-thread session that
//! exists only while a runtime is executing.

use boa_engine::Context;
use boa_engine::JsResult;
use boa_engine::JsString;
use boa_engine::JsValue;
use nr_ipc::WindowMessage;
use nr_shield::Interception;
use nr_shield::NavigateDecision;
use nr_shield::NavigateEvent;
use nr_shield::PageShield;
use nr_shield::Vector;
use nr_shield::ZombieMember;
use nr_shield::ZombieScope;
use nr_shield::ZombieWindow;
use std::cell::RefCell;
use url::Url;

thread_local! {
    static ACTIVE: RefCell<Option<PageShield>> = const { RefCell::new(None) };
}

/// Keeps a shield installed for the current thread until dropped.
pub(crate) struct SessionGuard(());

impl SessionGuard {
    pub(crate) fn activate(shield: PageShield) -> Self {
        ACTIVE.with(|slot| *slot.borrow_mut() = Some(shield));
        Self(())
    }

    pub(crate) fn finish(self) -> Vec<WindowMessage> {
        ACTIVE
            .with(|slot| slot.borrow_mut().take())
            .map(|mut shield| shield.take_outbox())
            .unwrap_or_default()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        ACTIVE.with(|slot| slot.borrow_mut().take());
    }
}

fn with_shield<T>(fallback: T, action: impl FnOnce(&mut PageShield) -> T) -> T {
    ACTIVE.with(|slot| slot.borrow_mut().as_mut().map(action).unwrap_or(fallback))
}

fn interception<'a>(vector: Vector, target: Option<&'a str>, extra: &'a str) -> Option<Interception<'a>> {
    let call = match vector {
        Vector::LocationAssign => Interception::LocationAssign(target?),
        Vector::LocationReplace => Interception::LocationReplace(target?),
        Vector::WindowOpen => Interception::WindowOpen {
            url: target.unwrap_or(""),
            features: extra,
        },
        Vector::HistoryPushState => Interception::PushState(target),
        Vector::HistoryReplaceState => Interception::ReplaceState(target),
        Vector::SetTimeout => Interception::StringTimer(extra),
        Vector::NavigateEvent => return None,
    };
    Some(call)
}

/// `__nr_shield_decide(vector, page, target, extra) -> bool`
pub(crate) fn shield_decide(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let vector = arg_string(args, 0, context)?;
    let page = arg_string(args, 1, context)?.unwrap_or_default();
    let target = arg_string(args, 2, context)?;
    let extra = arg_string(args, 3, context)?.unwrap_or_default();

    let Some(call) = vector
        .as_deref()
        .and_then(Vector::from_name)
        .and_then(|vector| interception(vector, target.as_deref(), &extra))
    else {
        return Ok(JsValue::from(false));
    };

    let suppressed = with_shield(false, |shield| shield.intercept(&page, call));
    Ok(JsValue::from(suppressed))
}

/// `__nr_shield_navigate(page, destination, download, hashChange, formSubmission) -> bool`,
/// `true` when the navigate event must be cancelled.
pub(crate) fn shield_navigate(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let page = arg_string(args, 0, context)?.unwrap_or_default();
    let destination = arg_string(args, 1, context)?.unwrap_or_default();
    let event = NavigateEvent {
        destination,
        download: arg_flag(args, 2),
        hash_change: arg_flag(args, 3),
        form_submission: arg_flag(args, 4),
    };

    let decision = with_shield(NavigateDecision::Proceed, |shield| {
        shield.handle_navigate(&page, &event)
    });
    Ok(JsValue::from(decision == NavigateDecision::Cancel))
}

/// `__nr_shield_skip(vector)`: the realm could not wrap this entry point.
pub(crate) fn shield_skip(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    if let Some(vector) = arg_string(args, 0, context)?.as_deref().and_then(Vector::from_name) {
        with_shield((), |shield| shield.mark_skipped(vector));
    }
    Ok(JsValue::undefined())
}

/// `__nr_shield_state(enabled)`: a bridge `state` message reached the page.
pub(crate) fn shield_state(
    _this: &JsValue,
    args: &[JsValue],
    _context: &mut Context,
) -> JsResult<JsValue> {
    let message = WindowMessage::state(arg_flag(args, 0));
    with_shield((), |shield| shield.on_window_message(&message));
    Ok(JsValue::undefined())
}

/// `__nr_zombie_member(scope, property) -> string` naming how a zombie read resolves.
pub(crate) fn zombie_member(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let scope = arg_string(args, 0, context)?;
    let property = arg_string(args, 1, context)?.unwrap_or_default();
    let member = scope
        .as_deref()
        .and_then(ZombieScope::from_name)
        .map_or(ZombieMember::Absent, |scope| ZombieWindow::member(scope, &property));
    Ok(JsValue::from(JsString::from(member.as_str())))
}

/// `__nr_resolve_url(base, next) -> string`; unresolvable input comes back as-is.
pub(crate) fn resolve_url(
    _this: &JsValue,
    args: &[JsValue],
    context: &mut Context,
) -> JsResult<JsValue> {
    let base = arg_string(args, 0, context)?.unwrap_or_default();
    let next = arg_string(args, 1, context)?.unwrap_or_default();

    let resolved = Url::parse(&base)
        .ok()
        .and_then(|base| nr_classifier::resolve(&next, &base))
        .map(String::from)
        .unwrap_or(next);
    Ok(JsValue::from(JsString::from(resolved.as_str())))
}

fn arg_string(args: &[JsValue], index: usize, context: &mut Context) -> JsResult<Option<String>> {
    match args.get(index) {
        Some(value) if !value.is_null_or_undefined() => {
            Ok(Some(value.to_string(context)?.to_std_string_escaped()))
        }
        _ => Ok(None),
    }
}

fn arg_flag(args: &[JsValue], index: usize) -> bool {
    args.get(index).is_some_and(JsValue::to_boolean)
}
