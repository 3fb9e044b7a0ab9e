//! Opt-in traces of binding and reduction.
//!
//! Recording is enabled through [`crate::EngineConfig::trace`]; when it is
//! off nothing is allocated.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A retry of one call with different traits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebindStep {
    pub oper: String,
    /// 1-based retry count within the call.
    pub attempt: usize,
    pub from: TraitsSummary,
    pub to: TraitsSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraitsSummary {
    pub shape: &'static str,
    pub owner_key: usize,
}

/// One rewrite performed by the reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReduceStep {
    pub oper: String,
    pub depth: usize,
    pub before: String,
    pub after: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Rebind(RebindStep),
    Reduce(ReduceStep),
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Trace {
    enabled: bool,
    events: Vec<TraceEvent>,
}

impl Trace {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the event built by `event`, if tracing is on.
    pub fn record(&mut self, event: impl FnOnce() -> TraceEvent) {
        if self.enabled {
            self.events.push(event());
        }
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn take(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}
