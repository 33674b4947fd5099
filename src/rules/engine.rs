// src/rules/engine.rs
//
// Runs registered rules whenever the store reports a change.
//
// The engine subscribes to every dispatch, diffs the new state against the
// last one it saw and evaluates only the rules watching a changed slice, in
// priority order. Actions a rule dispatches carry a cascade depth; once that
// reaches `max_cascades` the engine stops evaluating and logs a warning.

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::StateRule;
use crate::state::{changed_slices, AppState, Dispatcher, SliceSet, Subscriber};

pub const DEFAULT_MAX_CASCADES: usize = 10;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RulesEngineStats {
    pub evaluations: u64,
    pub actions_triggered: u64,
    pub errors: u64,
    pub cascade_limit_hits: u64,
}

struct RuleEntry {
    rule: Box<dyn StateRule>,
    enabled: bool,
}

impl RuleEntry {
    fn active(&self) -> bool {
        self.enabled && self.rule.enabled()
    }
}

pub struct RulesEngine {
    rules: Vec<RuleEntry>,
    prev_state: Option<Arc<AppState>>,
    max_cascades: usize,
    stats: RulesEngineStats,
    debug: bool,
}

impl Default for RulesEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CASCADES)
    }
}

impl RulesEngine {
    pub fn new(max_cascades: usize) -> Self {
        Self {
            rules: Vec::new(),
            prev_state: None,
            max_cascades,
            stats: RulesEngineStats::default(),
            debug: false,
        }
    }

    pub fn max_cascades(&self) -> usize {
        self.max_cascades
    }

    pub fn stats(&self) -> &RulesEngineStats {
        &self.stats
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Add a rule, keeping the list ordered by priority. Rules of equal
    /// priority run in registration order.
    pub fn register(&mut self, rule: impl StateRule + 'static) {
        let rule: Box<dyn StateRule> = Box::new(rule);
        tlog!(
            "[rules] Registered rule: {} (priority={:?})",
            rule.name(),
            rule.priority()
        );
        let priority = rule.priority();
        let at = self
            .rules
            .iter()
            .position(|e| e.rule.priority() > priority)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, RuleEntry { rule, enabled: true });
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        match self.rules.iter().position(|e| e.rule.name() == name) {
            Some(i) => {
                self.rules.remove(i);
                tlog!("[rules] Unregistered rule: {}", name);
                true
            }
            None => false,
        }
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|e| e.rule.name().to_string()).collect()
    }

    /// Enable or disable a rule by name. Returns false if no such rule.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|e| e.rule.name() == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Evaluate every enabled rule against `state` regardless of what changed.
    /// Rules still see the last observed state as `old`.
    pub fn evaluate_all(&mut self, state: &Arc<AppState>, dispatcher: &mut Dispatcher) {
        let prev = self.prev_state.clone();
        for i in 0..self.rules.len() {
            if self.rules[i].active() {
                self.evaluate_rule(i, prev.as_deref(), state, dispatcher);
            }
        }
        self.prev_state = Some(Arc::clone(state));
    }

    fn evaluate_rule(
        &mut self,
        index: usize,
        old: Option<&AppState>,
        new: &AppState,
        dispatcher: &mut Dispatcher,
    ) {
        self.stats.evaluations += 1;
        let before = dispatcher.pending();
        let rule = &mut self.rules[index].rule;

        let result = catch_unwind(AssertUnwindSafe(|| rule.evaluate(old, new, dispatcher)));
        let dispatched = dispatcher.pending().saturating_sub(before) as u64;
        self.stats.actions_triggered += dispatched;

        match result {
            Ok(Ok(())) => {
                if self.debug && dispatched > 0 {
                    tlog!("[rules] Rule '{}' dispatched {} action(s)", rule.name(), dispatched);
                }
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                tlog!("[rules] Rule '{}' error: {}", rule.name(), e);
            }
            Err(_) => {
                self.stats.errors += 1;
                tlog!("[rules] Rule '{}' panicked", rule.name());
            }
        }
    }

    fn watched_by(&self, index: usize, changed: &SliceSet) -> bool {
        !self.rules[index].rule.watches().is_disjoint(changed)
    }
}

impl Subscriber for RulesEngine {
    fn on_state_change(&mut self, state: &Arc<AppState>, dispatcher: &mut Dispatcher) -> Result<(), String> {
        if dispatcher.depth() >= self.max_cascades {
            self.stats.cascade_limit_hits += 1;
            tlog!(
                "[rules] Maximum cascade depth ({}) reached, skipping rule evaluation",
                self.max_cascades
            );
            return Ok(());
        }

        let prev = self.prev_state.take();
        let changed = changed_slices(prev.as_deref(), state);

        for i in 0..self.rules.len() {
            if self.rules[i].active() && self.watched_by(i, &changed) {
                self.evaluate_rule(i, prev.as_deref(), state, dispatcher);
            }
        }

        self.prev_state = Some(Arc::clone(state));
        Ok(())
    }

    fn name(&self) -> String {
        "RulesEngine".to_string()
    }
}
