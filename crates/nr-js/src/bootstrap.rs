//! Script installed into every page realm before page script runs.

/// Ambient globals page script commonly touches. Timers are queued and
/// flushed by the host after each script.
pub(crate) const BOOTSTRAP_ENV: &str = r#"
globalThis.window = globalThis;
globalThis.self = globalThis;
globalThis.top = globalThis;
globalThis.parent = globalThis;
globalThis.opener = null;
globalThis.console = {
  log: function () {},
  warn: function () {},
  error: function () {}
};
globalThis.__nr_timer_queue = [];
globalThis.__nr_timer_cancelled = {};
globalThis.__nr_next_timer_id = 1;
globalThis.setTimeout = function (callback, _delay) {
  var cb = callback;
  if (typeof cb !== "function") {
    var src = String(callback);
    cb = function () { (0, eval)(src); };
  }
  var id = globalThis.__nr_next_timer_id++;
  globalThis.__nr_timer_queue.push({ id: id, cb: cb });
  return id;
};
globalThis.clearTimeout = function (id) {
  globalThis.__nr_timer_cancelled[String(id)] = true;
};
globalThis.__nr_flush_timers = function (limit) {
  var maxRuns = Number(limit) || 0;
  if (maxRuns < 1) {
    maxRuns = 1;
  }
  var runs = 0;
  while (globalThis.__nr_timer_queue.length > 0 && runs < maxRuns) {
    var task = globalThis.__nr_timer_queue.shift();
    if (!task) {
      continue;
    }
    var cancelled = !!globalThis.__nr_timer_cancelled[String(task.id)];
    delete globalThis.__nr_timer_cancelled[String(task.id)];
    if (!cancelled) {
      task.cb();
    }
    runs++;
  }
  return runs;
};
"#;

/// Navigation surface of the page with the shield wrapped around it.
/// Expects `__nr_initial_href`, `__nr_initial_title`, the `__nr_shield_*`
/// natives, `__nr_zombie_member` and `__nr_resolve_url` to be defined.
pub(crate) const BOOTSTRAP_SHIELD: &str = r##"
(function () {
  var nativeHref = String(globalThis.__nr_initial_href || "about:blank");
  var opened = [];
  var historyUrls = [];
  var navigateListeners = [];
  globalThis.__nr_opened = opened;
  globalThis.__nr_history = historyUrls;

  function suppressed(vector, target, extra) {
    return __nr_shield_decide(vector, nativeHref, target, extra) === true;
  }

  function wrap(vector, install) {
    try {
      install();
    } catch (_error) {
      __nr_shield_skip(vector);
    }
  }

  function noop() {}

  function withoutHash(href) {
    var at = href.indexOf("#");
    return at < 0 ? href : href.slice(0, at);
  }

  function dispatchNavigate(destination, info) {
    var event = {
      type: "navigate",
      cancelable: true,
      canIntercept: true,
      destination: { url: destination },
      downloadRequest: info.download ? "" : null,
      hashChange: withoutHash(destination) === withoutHash(nativeHref) && destination.indexOf("#") >= 0,
      formData: info.formData || null,
      defaultPrevented: false,
      preventDefault: function () { this.defaultPrevented = true; }
    };
    var listeners = navigateListeners.slice();
    for (var i = 0; i < listeners.length; i++) {
      listeners[i].call(globalThis.navigation, event);
    }
    return !event.defaultPrevented;
  }

  function navigate(next, info) {
    var resolved = __nr_resolve_url(nativeHref, String(next));
    if (dispatchNavigate(resolved, info || {})) {
      nativeHref = resolved;
    }
  }

  function zombieObject(scope) {
    return new Proxy({}, {
      get: function (_target, prop) {
        if (typeof prop !== "string") {
          return undefined;
        }
        switch (__nr_zombie_member(scope, prop)) {
          case "not_closed": return false;
          case "location": return zombieObject("location");
          case "document": return zombieObject("document");
          case "blank_url": return "about:blank";
          case "blank_url_method": return function () { return "about:blank"; };
          case "noop": return noop;
          default: return undefined;
        }
      },
      set: function () { return true; }
    });
  }

  var location = {
    assign: function (next) {
      if (suppressed("location.assign", next, "")) {
        return;
      }
      navigate(next);
    },
    replace: function (next) {
      if (suppressed("location.replace", next, "")) {
        return;
      }
      navigate(next);
    },
    reload: noop,
    toString: function () { return nativeHref; }
  };
  Object.defineProperty(location, "href", {
    configurable: true,
    enumerable: true,
    get: function () { return nativeHref; },
    set: function (next) { location.assign(next); }
  });
  wrap("location.assign", function () {
    Object.defineProperty(globalThis, "location", {
      configurable: true,
      get: function () { return location; },
      set: function (next) { location.assign(next); }
    });
  });

  wrap("window.open", function () {
    globalThis.open = function (url, _target, features) {
      var href = url == null ? "" : String(url);
      var spec = features == null ? "" : String(features);
      if (suppressed("window.open", href, spec)) {
        return zombieObject("window");
      }
      var resolved = href === "" ? "about:blank" : __nr_resolve_url(nativeHref, href);
      opened.push(resolved);
      return {
        closed: false,
        location: { href: resolved },
        focus: noop,
        blur: noop,
        close: function () { this.closed = true; },
        postMessage: noop,
        document: { write: noop, close: noop }
      };
    };
  });

  globalThis.history = {
    length: 1,
    state: null,
    pushState: function (state, _title, url) {
      if (url != null && suppressed("history.pushState", String(url), "")) {
        return;
      }
      this.state = state;
      this.length += 1;
      if (url != null) {
        nativeHref = __nr_resolve_url(nativeHref, String(url));
        historyUrls.push(nativeHref);
      }
    },
    replaceState: function (state, _title, url) {
      if (url != null && suppressed("history.replaceState", String(url), "")) {
        return;
      }
      this.state = state;
      if (url != null) {
        nativeHref = __nr_resolve_url(nativeHref, String(url));
        historyUrls.push(nativeHref);
      }
    }
  };

  var nativeSetTimeout = globalThis.setTimeout;
  wrap("setTimeout", function () {
    globalThis.setTimeout = function (callback, delay) {
      if (typeof callback === "string" && suppressed("setTimeout", null, callback)) {
        return 0;
      }
      return nativeSetTimeout(callback, delay);
    };
  });
  globalThis.setInterval = function (callback, delay) {
    return globalThis.setTimeout(callback, delay);
  };
  globalThis.clearInterval = globalThis.clearTimeout;

  wrap("navigation.navigate", function () {
    navigateListeners.push(function (event) {
      var cancel = __nr_shield_navigate(
        nativeHref,
        event.destination.url,
        event.downloadRequest !== null,
        event.hashChange,
        event.formData !== null
      );
      if (cancel === true) {
        event.preventDefault();
      }
    });
    globalThis.navigation = {
      get currentEntry() { return { url: nativeHref }; },
      addEventListener: function (type, listener) {
        if (type === "navigate" && typeof listener === "function") {
          navigateListeners.push(listener);
        }
      },
      removeEventListener: function (type, listener) {
        var at = type === "navigate" ? navigateListeners.indexOf(listener) : -1;
        if (at >= 0) {
          navigateListeners.splice(at, 1);
        }
      },
      navigate: function (url, options) {
        var info = { formData: options && options.formData };
        navigate(url, info);
        return { committed: Promise.resolve(), finished: Promise.resolve() };
      },
      back: noop,
      forward: noop,
      reload: noop
    };
  });

  globalThis.addEventListener = function (type, listener) {
    if (type !== "message" || typeof listener !== "function") {
      return;
    }
    globalThis.__nr_message_listeners = (globalThis.__nr_message_listeners || []).concat([listener]);
  };
  globalThis.postMessage = function (data, _targetOrigin) {
    if (data && data.source === "no-redirect-extension" && data.action === "state") {
      __nr_shield_state(data.enabled === true);
    }
    var listeners = globalThis.__nr_message_listeners || [];
    for (var i = 0; i < listeners.length; i++) {
      listeners[i].call(globalThis, { data: data, source: globalThis });
    }
  };

  globalThis.document = {
    title: String(globalThis.__nr_initial_title || ""),
    readyState: "complete",
    get URL() { return nativeHref; },
    get location() { return location; },
    set location(next) { location.assign(next); }
  };
})();
"##;

/// Host values the shield bootstrap reads.
pub(crate) fn host_prelude(page_url: &str, title: &str) -> String {
    format!(
        "globalThis.__nr_initial_href = {};\nglobalThis.__nr_initial_title = {};\n",
        js_string_literal(page_url),
        js_string_literal(title)
    )
}

/// Debug formatting yields a double-quoted literal JS accepts for the
/// printable input pages supply.
fn js_string_literal(input: &str) -> String {
    format!("{input:?}")
}
