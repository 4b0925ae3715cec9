//! Stall and hang detection over the agent event stream.
//!
//! One monitor lives per supervised invocation; nothing is shared between
//! agents.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::events::AgentEvent;
use super::types::{StallKind, StallReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallThresholds {
    pub soft_identical_calls: u32,
    pub hard_identical_calls: u32,
    pub soft_consecutive_errors: u32,
    pub hard_consecutive_errors: u32,
}

impl Default for StallThresholds {
    fn default() -> Self {
        Self {
            soft_identical_calls: 5,
            hard_identical_calls: 10,
            soft_consecutive_errors: 8,
            hard_consecutive_errors: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intervention {
    /// Tell the agent to change approach; sent at most once per kind.
    Soft { kind: StallKind, reason: String },
    /// Terminate the agent.
    Hard(StallReport),
}

#[derive(Debug)]
pub struct StallMonitor {
    thresholds: StallThresholds,
    call_counts: HashMap<(String, String), u32>,
    consecutive_errors: u32,
    soft_identical_sent: bool,
    soft_errors_sent: bool,
}

impl StallMonitor {
    pub fn new(thresholds: StallThresholds) -> Self {
        Self {
            thresholds,
            call_counts: HashMap::new(),
            consecutive_errors: 0,
            soft_identical_sent: false,
            soft_errors_sent: false,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn observe(&mut self, event: &AgentEvent) -> Option<Intervention> {
        match event {
            AgentEvent::ActionStart { name, args } => self.on_call(name, args),
            AgentEvent::ActionEnd { is_error } => self.on_result(*is_error),
            AgentEvent::Output { .. } => None,
        }
    }

    fn on_call(&mut self, name: &str, args: &serde_json::Value) -> Option<Intervention> {
        let key = (name.to_string(), args.to_string());
        let count = self.call_counts.entry(key).or_insert(0);
        *count += 1;
        let count = *count;

        if count >= self.thresholds.hard_identical_calls {
            return Some(Intervention::Hard(StallReport {
                kind: StallKind::IdenticalCalls,
                action: Some(name.to_string()),
                count,
                reason: format!("'{name}' called {count} times with identical arguments"),
            }));
        }
        if count >= self.thresholds.soft_identical_calls && !self.soft_identical_sent {
            self.soft_identical_sent = true;
            return Some(Intervention::Soft {
                kind: StallKind::IdenticalCalls,
                reason: format!(
                    "'{name}' has been called {count} times with identical arguments; \
                     try a different approach"
                ),
            });
        }
        None
    }

    fn on_result(&mut self, is_error: bool) -> Option<Intervention> {
        if !is_error {
            self.consecutive_errors = 0;
            return None;
        }

        self.consecutive_errors += 1;
        let count = self.consecutive_errors;

        if count >= self.thresholds.hard_consecutive_errors {
            return Some(Intervention::Hard(StallReport {
                kind: StallKind::ConsecutiveErrors,
                action: None,
                count,
                reason: format!("{count} consecutive actions failed"),
            }));
        }
        if count >= self.thresholds.soft_consecutive_errors && !self.soft_errors_sent {
            self.soft_errors_sent = true;
            return Some(Intervention::Soft {
                kind: StallKind::ConsecutiveErrors,
                reason: format!("{count} consecutive actions failed; step back and rethink"),
            });
        }
        None
    }
}

/// Tracks the in-flight action to detect sub-actions that stop producing
/// events.
#[derive(Debug)]
pub struct HangWatch {
    in_flight: Option<String>,
    last_event: Instant,
    fired: bool,
}

impl HangWatch {
    pub fn new(now: Instant) -> Self {
        Self {
            in_flight: None,
            last_event: now,
            fired: false,
        }
    }

    pub fn observe(&mut self, event: &AgentEvent, now: Instant) {
        self.last_event = now;
        match event {
            AgentEvent::ActionStart { name, .. } => {
                self.in_flight = Some(name.clone());
                self.fired = false;
            }
            AgentEvent::ActionEnd { .. } => self.in_flight = None,
            AgentEvent::Output { .. } => {}
        }
    }

    /// Name and idle time of the in-flight action once it exceeds `window`.
    /// Fires once per action.
    pub fn check(&mut self, now: Instant, window: Duration) -> Option<(String, Duration)> {
        let action = self.in_flight.as_ref()?;
        let idle = now.saturating_duration_since(self.last_event);
        if self.fired || idle < window {
            return None;
        }
        self.fired = true;
        Some((action.clone(), idle))
    }
}
