//! Page script realm with the navigation shield installed.
//!
//! Page script runs in a boa context whose `location`, `open`, `history`,
//! `setTimeout` and `navigation` are wrapped before any page code executes.
//! Every wrapped call is decided by a [`PageShield`]; suppressed calls leave
//! the page where it is and queue a blocked [`WindowMessage`] for the bridge.

mod bootstrap;
mod session;

use bootstrap::BOOTSTRAP_ENV;
use bootstrap::BOOTSTRAP_SHIELD;
use boa_engine::Context;
use boa_engine::JsString;
use boa_engine::NativeFunction;
use boa_engine::Source;
use boa_engine::js_string;
use nr_ipc::WindowMessage;
use nr_shield::PageShield;
use nr_shield::ShieldPolicy;
use serde::Deserialize;
use serde::Serialize;
use session::SessionGuard;

/// Script payload to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub origin: String,
    pub source: String,
}

impl ScriptSource {
    pub fn inline(origin: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            source: source.into(),
        }
    }
}

/// Host-side page state the realm starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsHostEnvironment {
    pub page_url: String,
    pub document_title: String,
    /// Mirrors the extension-wide enabled flag.
    pub shield_enabled: bool,
    /// Bridge messages posted into the page before its scripts run.
    pub page_messages: Vec<WindowMessage>,
}

impl JsHostEnvironment {
    pub fn for_page(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            ..Self::default()
        }
    }
}

impl Default for JsHostEnvironment {
    fn default() -> Self {
        Self {
            page_url: "about:blank".to_owned(),
            document_title: String::new(),
            shield_enabled: true,
            page_messages: Vec::new(),
        }
    }
}

/// Runtime hardening knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsRuntimeConfig {
    /// Soft limit: when exceeded, execution continues but a runtime warning is recorded.
    pub max_scripts: usize,
    /// Preferred script-size budget in bytes.
    pub max_script_bytes: usize,
    pub max_error_messages: usize,
    pub recursion_limit: usize,
    pub stack_size_limit: usize,
    pub loop_iteration_limit: u64,
    /// Timer callbacks run after each script.
    pub timer_flush_limit: u32,
}

impl Default for JsRuntimeConfig {
    fn default() -> Self {
        Self {
            max_scripts: 128,
            max_script_bytes: 2 * 1024 * 1024,
            max_error_messages: 24,
            recursion_limit: 64,
            stack_size_limit: 1024,
            loop_iteration_limit: 100_000,
            timer_flush_limit: 128,
        }
    }
}

/// Per-script execution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub origin: String,
    pub message: String,
}

/// Runtime outcome summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsExecutionReport {
    pub scripts_seen: usize,
    pub scripts_executed: usize,
    pub scripts_failed: usize,
    pub scripts_skipped: usize,
    pub errors: Vec<ScriptError>,
}

/// Runtime execution output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsExecutionOutput {
    pub report: JsExecutionReport,
    pub document_title: Option<String>,
    /// Where the page ended up after every permitted navigation.
    pub location_href: Option<String>,
    /// Windows actually opened, resolved.
    pub opened_windows: Vec<String>,
    /// URLs committed through the history API.
    pub history_urls: Vec<String>,
    /// Blocked notifications posted by the shield, in order.
    pub messages: Vec<WindowMessage>,
}

/// Script engine facade.
#[derive(Debug, Clone, Default)]
pub struct JsRuntime {
    config: JsRuntimeConfig,
    policy: ShieldPolicy,
}

impl JsRuntime {
    pub fn new(config: JsRuntimeConfig) -> Self {
        Self {
            config,
            policy: ShieldPolicy::default(),
        }
    }

    pub fn with_policy(config: JsRuntimeConfig, policy: ShieldPolicy) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &JsRuntimeConfig {
        &self.config
    }

    pub fn execute_scripts(&self, scripts: &[ScriptSource]) -> JsExecutionReport {
        self.execute_scripts_with_host(&JsHostEnvironment::default(), scripts)
            .report
    }

    pub fn execute_scripts_with_host(
        &self,
        host: &JsHostEnvironment,
        scripts: &[ScriptSource],
    ) -> JsExecutionOutput {
        if scripts.is_empty() {
            return JsExecutionOutput {
                document_title: Some(host.document_title.clone()),
                location_href: Some(host.page_url.clone()),
                ..JsExecutionOutput::default()
            };
        }

        let mut report = JsExecutionReport {
            scripts_seen: scripts.len(),
            ..JsExecutionReport::default()
        };

        let mut shield = PageShield::new(self.policy.clone());
        shield.on_window_message(&WindowMessage::state(host.shield_enabled));
        let guard = SessionGuard::activate(shield);

        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_recursion_limit(self.config.recursion_limit);
        context
            .runtime_limits_mut()
            .set_stack_size_limit(self.config.stack_size_limit);
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.config.loop_iteration_limit);

        if let Err(message) = install(&mut context, host) {
            tracing::warn!(%message, "page realm bootstrap failed");
            report.scripts_failed = 1;
            report.errors.push(ScriptError {
                origin: "bootstrap".to_owned(),
                message,
            });
            report.scripts_skipped = scripts.len();
            return JsExecutionOutput {
                report,
                ..JsExecutionOutput::default()
            };
        }

        if scripts.len() > self.config.max_scripts
            && report.errors.len() < self.config.max_error_messages
        {
            report.errors.push(ScriptError {
                origin: "runtime".to_owned(),
                message: format!(
                    "script count {} exceeded soft limit {}; continuing",
                    scripts.len(),
                    self.config.max_scripts
                ),
            });
        }

        let flush = format!(
            "(typeof __nr_flush_timers === 'function') ? __nr_flush_timers({}) : 0;",
            self.config.timer_flush_limit
        );
        let hard_cap = hard_script_byte_cap(self.config.max_script_bytes);
        for script in scripts {
            let source_bytes = script.source.as_bytes();
            let source_len = source_bytes.len();
            if source_len > hard_cap {
                tracing::debug!(origin = %script.origin, source_len, "script over hard cap skipped");
                report.scripts_skipped = report.scripts_skipped.saturating_add(1);
                continue;
            }

            match context.eval(Source::from_bytes(source_bytes)) {
                Ok(_) => {
                    report.scripts_executed = report.scripts_executed.saturating_add(1);
                    if let Err(error) = context.eval(Source::from_bytes(flush.as_bytes())) {
                        tracing::debug!(origin = %script.origin, %error, "timer callback threw");
                    }
                }
                Err(error) => {
                    tracing::debug!(origin = %script.origin, %error, "page script threw");
                    report.scripts_failed = report.scripts_failed.saturating_add(1);
                    if report.errors.len() < self.config.max_error_messages {
                        report.errors.push(ScriptError {
                            origin: script.origin.clone(),
                            message: if source_len > self.config.max_script_bytes {
                                format!(
                                    "oversized script ({} bytes, preferred <= {}) failed: {error}",
                                    source_len, self.config.max_script_bytes
                                )
                            } else {
                                error.to_string()
                            },
                        });
                    }
                }
            }
        }

        let document_title = read_string(
            &mut context,
            "(typeof document === 'object' && document !== null) ? String(document.title) : ''",
        );
        let location_href = read_string(&mut context, "String(location.href)");
        let opened_windows = read_string_list(&mut context, "__nr_opened");
        let history_urls = read_string_list(&mut context, "__nr_history");

        JsExecutionOutput {
            report,
            document_title,
            location_href,
            opened_windows,
            history_urls,
            messages: guard.finish(),
        }
    }
}

fn install(context: &mut Context, host: &JsHostEnvironment) -> Result<(), String> {
    let natives: [(JsString, usize, NativeFunction); 6] = [
        (
            js_string!("__nr_shield_decide"),
            4,
            NativeFunction::from_fn_ptr(session::shield_decide),
        ),
        (
            js_string!("__nr_shield_navigate"),
            5,
            NativeFunction::from_fn_ptr(session::shield_navigate),
        ),
        (
            js_string!("__nr_shield_skip"),
            1,
            NativeFunction::from_fn_ptr(session::shield_skip),
        ),
        (
            js_string!("__nr_shield_state"),
            1,
            NativeFunction::from_fn_ptr(session::shield_state),
        ),
        (
            js_string!("__nr_zombie_member"),
            2,
            NativeFunction::from_fn_ptr(session::zombie_member),
        ),
        (
            js_string!("__nr_resolve_url"),
            2,
            NativeFunction::from_fn_ptr(session::resolve_url),
        ),
    ];
    for (name, length, function) in natives {
        context
            .register_global_callable(name, length, function)
            .map_err(|error| error.to_string())?;
    }

    let prelude = bootstrap::host_prelude(&host.page_url, &host.document_title);
    for source in [BOOTSTRAP_ENV, prelude.as_str(), BOOTSTRAP_SHIELD] {
        context
            .eval(Source::from_bytes(source.as_bytes()))
            .map_err(|error| error.to_string())?;
    }

    for message in &host.page_messages {
        let json = serde_json::to_string(message).map_err(|error| error.to_string())?;
        let post = format!("postMessage({json}, '*');");
        context
            .eval(Source::from_bytes(post.as_bytes()))
            .map_err(|error| error.to_string())?;
    }
    Ok(())
}

fn read_string(context: &mut Context, expression: &str) -> Option<String> {
    let value = context.eval(Source::from_bytes(expression.as_bytes())).ok()?;
    let js_string = value.to_string(context).ok()?;
    Some(js_string.to_std_string_escaped())
}

fn read_string_list(context: &mut Context, global: &str) -> Vec<String> {
    let expression = format!("JSON.stringify(globalThis.{global} || [])");
    read_string(context, &expression)
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

fn hard_script_byte_cap(preferred: usize) -> usize {
    let scaled = preferred.saturating_mul(4);
    let bounded = scaled.min(16 * 1024 * 1024);
    bounded.max(preferred)
}
