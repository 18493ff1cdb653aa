use std::collections::VecDeque;

use crate::config::HarnessConfig;
use crate::network::FetchRequest;

#[derive(Debug, Default)]
pub(crate) struct PlatformMockState {
    pub(crate) fetch_calls: Vec<FetchRequest>,
    pub(crate) confirm_messages: Vec<String>,
    pub(crate) confirm_responses: VecDeque<bool>,
    pub(crate) default_confirm_response: bool,
}

impl PlatformMockState {
    /// Queued answers are used first, then the default.
    pub(crate) fn next_confirm_response(&mut self, message: &str) -> bool {
        self.confirm_messages.push(message.to_string());
        self.confirm_responses
            .pop_front()
            .unwrap_or(self.default_confirm_response)
    }
}

#[derive(Debug)]
pub(crate) struct TraceState {
    pub(crate) enabled: bool,
    pub(crate) events: bool,
    pub(crate) timers: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) log_limit: usize,
    pub(crate) to_stderr: bool,
}

impl Default for TraceState {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl TraceState {
    pub(crate) fn from_config(config: &HarnessConfig) -> Self {
        Self {
            enabled: config.trace,
            events: config.trace_events,
            timers: config.trace_timers,
            logs: VecDeque::new(),
            log_limit: config.trace_log_limit.max(1),
            to_stderr: config.trace_to_stderr,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        while self.logs.len() >= self.log_limit {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    pub(crate) fn shrink_to_limit(&mut self) {
        while self.logs.len() > self.log_limit {
            self.logs.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ring_buffer_drops_oldest_lines() {
        let mut trace = TraceState::default();
        trace.log_limit = 2;
        for line in ["a", "b", "c"] {
            trace.push(line.to_string());
        }
        assert_eq!(trace.logs, VecDeque::from(vec!["b".to_string(), "c".into()]));
        trace.log_limit = 1;
        trace.shrink_to_limit();
        assert_eq!(trace.logs, VecDeque::from(vec!["c".to_string()]));
    }

    #[test]
    fn confirm_answers_drain_queue_before_default() {
        let mut mocks = PlatformMockState::default();
        mocks.confirm_responses.push_back(true);
        assert!(mocks.next_confirm_response("first?"));
        assert!(!mocks.next_confirm_response("second?"));
        assert_eq!(mocks.confirm_messages, vec!["first?", "second?"]);
    }
}
