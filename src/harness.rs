use std::fmt;

use crate::clock::{self, AsyncClock, DueTimer, PendingTimer, TimerHandle, TimerHost, TimerState};
use crate::config::HarnessConfig;
use crate::core_dom_utils::{normalize_text, truncate_chars};
use crate::dom::Dom;
use crate::element::ElementHandle;
use crate::events::ListenerStore;
use crate::network::{Backend, FetchRequest, FetchResponse, ProductBackend};
use crate::runtime_state::{PlatformMockState, TraceState};
use crate::{Error, Result};

/// A one-shot continuation queued on the harness clock.
pub type TimerCallback = Box<dyn FnOnce(&mut Harness) -> Result<()>>;

const SNIPPET_CHARS: usize = 200;

pub struct Harness {
    pub(crate) dom: Dom,
    pub(crate) listeners: ListenerStore,
    pub(crate) clock: AsyncClock<TimerCallback>,
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) network_latency_ms: u64,
    pub(crate) platform_mocks: PlatformMockState,
    pub(crate) trace_state: TraceState,
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("dom", &self.dom)
            .field("listeners", &self.listeners)
            .field("clock", &self.clock)
            .field("backend", &self.backend)
            .field("network_latency_ms", &self.network_latency_ms)
            .field("platform_mocks", &self.platform_mocks)
            .field("trace_state", &self.trace_state)
            .finish()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// An empty document with default settings.
    pub fn new() -> Self {
        Self::assemble(Dom::new(), &HarnessConfig::default())
    }

    pub fn with_config(config: HarnessConfig) -> Result<Self> {
        Self::from_dom_with_config(Dom::new(), config)
    }

    /// The product page fixture with default settings.
    pub fn with_fixture() -> Result<Self> {
        Ok(Self::from_dom(Dom::build_fixture()?))
    }

    pub fn with_fixture_and_config(config: HarnessConfig) -> Result<Self> {
        Self::from_dom_with_config(Dom::build_fixture()?, config)
    }

    pub fn from_dom(dom: Dom) -> Self {
        Self::assemble(dom, &HarnessConfig::default())
    }

    pub fn from_dom_with_config(dom: Dom, config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(dom, &config))
    }

    fn assemble(dom: Dom, config: &HarnessConfig) -> Self {
        Self {
            dom,
            listeners: ListenerStore::default(),
            clock: AsyncClock::with_step_limit(config.timer_step_limit),
            backend: Box::new(ProductBackend::new()),
            network_latency_ms: config.network_latency_ms,
            platform_mocks: PlatformMockState::default(),
            trace_state: TraceState::from_config(config),
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.dom
    }

    pub fn select_one(&self, selector: &str) -> Result<ElementHandle> {
        self.dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    /// Replaces the field value and fires `input`, the way typing would.
    pub fn type_text(&mut self, selector: &str, text: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dom.set_value(target, text)?;
        self.dispatch_event(target, "input")?;
        Ok(())
    }

    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.click_element(target)?;
        Ok(())
    }

    pub fn dispatch(&mut self, selector: &str, event_type: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dispatch_event(target, event_type)?;
        Ok(())
    }

    pub fn value(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        self.dom.value(target)
    }

    pub fn text(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        self.dom.text_content(target)
    }

    /// Text currently shown in the message area.
    pub fn message(&self) -> Result<String> {
        self.dom.message()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn set_timeout<F>(&mut self, delay_ms: u64, callback: F) -> TimerHandle
    where
        F: FnOnce(&mut Harness) -> Result<()> + 'static,
    {
        let handle = self.clock.schedule_after(delay_ms, Box::new(callback));
        let due_at = self.clock.now_ms().saturating_add(delay_ms);
        self.trace_timer_line(format!(
            "[timer] schedule id={} due_at={due_at} delay_ms={delay_ms}",
            handle.id()
        ));
        handle
    }

    pub fn clear_timeout(&mut self, handle: TimerHandle) -> bool {
        let cancelled = self.clock.cancel(handle);
        if cancelled {
            self.trace_timer_line(format!("[timer] cancel id={}", handle.id()));
        }
        cancelled
    }

    /// Moves logical time forward by `delta_ms`, running every timer that
    /// comes due. Returns the number of timers fired.
    pub fn advance(&mut self, delta_ms: u64) -> Result<usize> {
        let from = self.clock.now_ms();
        let ran = clock::advance(self, delta_ms)?;
        self.trace_timer_line(format!(
            "[timer] advance delta_ms={delta_ms} from={from} to={} ran={ran}",
            self.clock.now_ms()
        ));
        Ok(ran)
    }

    pub fn advance_to(&mut self, target_ms: u64) -> Result<usize> {
        let from = self.clock.now_ms();
        let ran = clock::advance_to(self, target_ms)?;
        self.trace_timer_line(format!(
            "[timer] advance_to from={from} to={target_ms} ran={ran}"
        ));
        Ok(ran)
    }

    /// Runs timers until none remain, failing with
    /// [`Error::ClockStarvation`] after `max_steps` firings.
    pub fn drain_all(&mut self, max_steps: usize) -> Result<usize> {
        let from = self.clock.now_ms();
        let ran = clock::drain_all(self, max_steps)?;
        self.trace_timer_line(format!(
            "[timer] drain from={from} to={} ran={ran}",
            self.clock.now_ms()
        ));
        Ok(ran)
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        self.clock.pending_timers()
    }

    pub fn timer_state(&self, handle: TimerHandle) -> Option<TimerState> {
        self.clock.state(handle)
    }

    pub fn clear_all_timers(&mut self) -> usize {
        let cancelled = self.clock.cancel_all();
        self.trace_timer_line(format!("[timer] clear_all cancelled={cancelled}"));
        cancelled
    }

    pub fn set_timer_step_limit(&mut self, max_steps: usize) -> Result<()> {
        self.clock.set_step_limit(max_steps)
    }

    /// Sends `request` to the backend and queues `on_response` to run with
    /// its answer after the configured network latency.
    pub fn fetch<F>(&mut self, request: FetchRequest, on_response: F) -> TimerHandle
    where
        F: FnOnce(&mut Harness, FetchResponse) -> Result<()> + 'static,
    {
        let response = self.backend.handle(&request);
        self.trace_line(format!("[fetch] {request} status={}", response.status));
        self.platform_mocks.fetch_calls.push(request);
        let latency = self.network_latency_ms;
        self.set_timeout(latency, move |h| on_response(h, response))
    }

    pub fn take_fetch_calls(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.platform_mocks.fetch_calls)
    }

    pub fn set_backend<B: Backend + 'static>(&mut self, backend: B) {
        self.backend = Box::new(backend);
    }

    pub fn network_latency_ms(&self) -> u64 {
        self.network_latency_ms
    }

    pub fn set_network_latency_ms(&mut self, latency_ms: u64) {
        self.network_latency_ms = latency_ms;
    }

    /// Answers a confirmation prompt from the queued responses, falling back to
    /// the default (initially `false`).
    pub fn confirm(&mut self, message: &str) -> bool {
        let answer = self.platform_mocks.next_confirm_response(message);
        self.trace_line(format!("[confirm] {message:?} -> {answer}"));
        answer
    }

    pub fn enqueue_confirm_response(&mut self, accepted: bool) {
        self.platform_mocks.confirm_responses.push_back(accepted);
    }

    pub fn set_default_confirm_response(&mut self, accepted: bool) {
        self.platform_mocks.default_confirm_response = accepted;
    }

    pub fn take_confirm_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.platform_mocks.confirm_messages)
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.trace_state.enabled = enabled;
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.trace_state.to_stderr = enabled;
    }

    pub fn set_trace_events(&mut self, enabled: bool) {
        self.trace_state.events = enabled;
    }

    pub fn set_trace_timers(&mut self, enabled: bool) {
        self.trace_state.timers = enabled;
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace_state.log_limit = max_entries;
        self.trace_state.shrink_to_limit();
        Ok(())
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.trace_state.logs.drain(..).collect()
    }

    pub(crate) fn trace_event_line(&mut self, line: String) {
        if self.trace_state.enabled && self.trace_state.events {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_timer_line(&mut self, line: String) {
        if self.trace_state.enabled && self.trace_state.timers {
            self.trace_line(line);
        }
    }

    pub(crate) fn trace_line(&mut self, line: String) {
        if self.trace_state.enabled {
            log::debug!(target: "form_harness::trace", "{line}");
            if self.trace_state.to_stderr {
                eprintln!("{line}");
            }
            self.trace_state.push(line);
        }
    }

    /// Compares NFC-normalized text content.
    pub fn assert_text(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.text_content(target)?;
        if normalize_text(&actual) != normalize_text(expected) {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_value(&self, selector: &str, expected: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.dom.value(target)?;
        if normalize_text(&actual) != normalize_text(expected) {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn assert_exists(&self, selector: &str) -> Result<()> {
        let _ = self.select_one(selector)?;
        Ok(())
    }

    pub fn assert_row_count(&self, selector: &str, expected: usize) -> Result<()> {
        let matches = self.dom.query_selector_all(selector)?;
        if matches.len() != expected {
            let context = matches
                .first()
                .and_then(|first| self.dom.parent(*first).ok().flatten())
                .unwrap_or_else(|| self.dom.body());
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: expected.to_string(),
                actual: matches.len().to_string(),
                dom_snippet: self.node_snippet(context),
            });
        }
        Ok(())
    }

    /// Matches the text content against a regular expression.
    pub fn assert_text_matches(&self, selector: &str, pattern: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        let regex = fancy_regex::Regex::new(pattern)
            .map_err(|err| Error::InvalidOperation(format!("invalid pattern {pattern:?}: {err}")))?;
        let actual = normalize_text(&self.dom.text_content(target)?);
        let matched = regex
            .is_match(&actual)
            .map_err(|err| Error::InvalidOperation(format!("pattern {pattern:?} failed: {err}")))?;
        if !matched {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: format!("/{pattern}/"),
                actual,
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        self.dom.dump(target)
    }

    fn node_snippet(&self, target: ElementHandle) -> String {
        self.dom
            .dump(target)
            .map(|markup| truncate_chars(&markup, SNIPPET_CHARS))
            .unwrap_or_else(|_| self.dom.label(target))
    }
}

impl TimerHost for Harness {
    type Callback = TimerCallback;

    fn clock(&self) -> &AsyncClock<TimerCallback> {
        &self.clock
    }

    fn clock_mut(&mut self) -> &mut AsyncClock<TimerCallback> {
        &mut self.clock
    }

    fn fire_timer(&mut self, timer: DueTimer<TimerCallback>) -> Result<()> {
        self.trace_timer_line(format!(
            "[timer] fire id={} due_at={} now_ms={}",
            timer.handle.id(),
            timer.due_at,
            self.clock.now_ms()
        ));
        let outcome = (timer.callback)(self);
        self.reap_listeners();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Method;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fetch_records_request_and_delivers_after_latency() -> Result<()> {
        let mut h = Harness::with_fixture()?;
        let status = Rc::new(RefCell::new(None));
        let seen = Rc::clone(&status);
        h.fetch(FetchRequest::get("/productos"), move |_, response| {
            *seen.borrow_mut() = Some(response.status);
            Ok(())
        });

        let calls = h.take_fetch_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Get);
        assert_eq!(*status.borrow(), None);

        h.advance(99)?;
        assert_eq!(*status.borrow(), None);
        h.advance(1)?;
        assert_eq!(*status.borrow(), Some(200));
        Ok(())
    }

    #[test]
    fn timer_callbacks_observe_their_due_time() -> Result<()> {
        let mut h = Harness::new();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let outer = Rc::clone(&observed);
        h.set_timeout(800, move |h| {
            outer.borrow_mut().push(h.now_ms());
            let inner = Rc::clone(&outer);
            h.set_timeout(100, move |h| {
                inner.borrow_mut().push(h.now_ms());
                Ok(())
            });
            Ok(())
        });
        assert_eq!(h.advance(1000)?, 2);
        assert_eq!(*observed.borrow(), vec![800, 900]);
        assert_eq!(h.now_ms(), 1000);
        Ok(())
    }

    #[test]
    fn trace_records_events_and_timers_when_enabled() -> Result<()> {
        let mut h = Harness::with_fixture()?;
        h.click("#guardar")?;
        assert!(h.take_trace_logs().is_empty());

        h.enable_trace(true);
        h.click("#guardar")?;
        h.set_timeout(5, |_| Ok(()));
        h.advance(5)?;
        let logs = h.take_trace_logs();
        assert_eq!(logs[0], "[event] click target=button#guardar listeners=0");
        assert!(logs.iter().any(|line| line == "[timer] fire id=1 due_at=5 now_ms=5"));

        h.set_trace_timers(false);
        h.set_timeout(1, |_| Ok(()));
        assert!(h.take_trace_logs().is_empty());
        assert!(h.set_trace_log_limit(0).is_err());
        Ok(())
    }

    #[test]
    fn stderr_echo_follows_config_and_setter() -> Result<()> {
        let mut h = Harness::with_config(HarnessConfig {
            trace: true,
            trace_to_stderr: true,
            ..HarnessConfig::default()
        })?;
        assert!(h.trace_state.to_stderr);
        h.dispatch("body", "input")?;
        assert_eq!(h.take_trace_logs(), vec!["[event] input target=body listeners=0"]);

        h.set_trace_stderr(false);
        assert!(!h.trace_state.to_stderr);
        h.dispatch("body", "input")?;
        assert_eq!(h.take_trace_logs().len(), 1);
        Ok(())
    }

    #[test]
    fn assertion_failures_carry_a_snippet() -> Result<()> {
        let mut h = Harness::with_fixture()?;
        h.type_text("#nombre", "Mazda 3")?;
        h.assert_value("#nombre", "Mazda 3")?;
        h.assert_text("h1", "Añadir Producto")?;
        h.assert_text("h1", "An\u{303}adir Producto")?;
        h.assert_text_matches("h1", r"^Añadir\s+\w+$")?;
        h.assert_row_count("#tabla-productos tbody tr", 0)?;

        match h.assert_text("#message", "Producto guardado") {
            Err(Error::AssertionFailed {
                selector,
                actual,
                dom_snippet,
                ..
            }) => {
                assert_eq!(selector, "#message");
                assert_eq!(actual, "");
                assert_eq!(dom_snippet, "<div id=\"message\"></div>");
            }
            other => panic!("expected assertion failure, got {other:?}"),
        }
        assert!(matches!(
            h.assert_exists("#missing"),
            Err(Error::SelectorNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn confirm_uses_queue_then_default() {
        let mut h = Harness::new();
        h.enqueue_confirm_response(true);
        assert!(h.confirm("one"));
        assert!(!h.confirm("two"));
        h.set_default_confirm_response(true);
        assert!(h.confirm("three"));
        assert_eq!(h.take_confirm_messages(), vec!["one", "two", "three"]);
    }

    #[test]
    fn with_config_rejects_zero_limits() {
        let config = HarnessConfig {
            timer_step_limit: 0,
            ..HarnessConfig::default()
        };
        assert!(matches!(
            Harness::with_config(config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
