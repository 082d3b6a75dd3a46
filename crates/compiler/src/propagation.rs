//! Propagation event log
//!
//! Records what the inter-procedural fixed point actually did: which
//! types flowed from arguments into parameters and back, per
//! iteration, and which conflicts were merged into variants. Summaries
//! surface under `--verbose`; the conflict list feeds debugging when a
//! binding unexpectedly degrades to the boxed value.

use crate::types::Type;

/// Direction of one propagation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ArgsToParams,
    ParamsToArgs,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ArgsToParams => write!(f, "arg->param"),
            Direction::ParamsToArgs => write!(f, "param->arg"),
        }
    }
}

/// One type flow event.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationEvent {
    pub from_symbol: String,
    pub to_symbol: String,
    pub propagated: Type,
    pub direction: Direction,
    pub iteration: usize,
}

impl PropagationEvent {
    pub fn format(&self) -> String {
        format!(
            "  {} (iter {}): {} -> {}: {}",
            self.direction, self.iteration, self.from_symbol, self.to_symbol, self.propagated
        )
    }
}

/// A merge that produced a variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictEvent {
    pub symbol: String,
    pub existing: Type,
    pub incoming: Type,
    pub resolved: Type,
}

impl ConflictEvent {
    pub fn format(&self) -> String {
        format!(
            "  Conflict: '{}': {} vs {} -> {}",
            self.symbol,
            self.existing,
            self.incoming,
            self.resolved.cpp_type()
        )
    }
}

/// Collected log of one pass-3 run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationLog {
    events: Vec<PropagationEvent>,
    conflicts: Vec<ConflictEvent>,
    iteration: usize,
}

impl PropagationLog {
    pub fn new() -> Self {
        PropagationLog::default()
    }

    pub fn start_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    pub fn log_flow(
        &mut self,
        from_symbol: &str,
        to_symbol: &str,
        propagated: &Type,
        direction: Direction,
    ) {
        self.events.push(PropagationEvent {
            from_symbol: from_symbol.to_string(),
            to_symbol: to_symbol.to_string(),
            propagated: propagated.clone(),
            direction,
            iteration: self.iteration,
        });
    }

    pub fn log_conflict(&mut self, symbol: &str, existing: &Type, incoming: &Type, resolved: &Type) {
        self.conflicts.push(ConflictEvent {
            symbol: symbol.to_string(),
            existing: existing.clone(),
            incoming: incoming.clone(),
            resolved: resolved.clone(),
        });
    }

    pub fn events(&self) -> &[PropagationEvent] {
        &self.events
    }

    pub fn conflicts(&self) -> &[ConflictEvent] {
        &self.conflicts
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.conflicts.is_empty()
    }

    /// Formatted summary block for `--verbose` output.
    pub fn format_summary(&self) -> String {
        let forward = self
            .events
            .iter()
            .filter(|e| e.direction == Direction::ArgsToParams)
            .count();
        let backward = self.events.len() - forward;

        let mut lines = vec![
            "=== Type Propagation ===".to_string(),
            format!("Total propagations: {}", self.events.len()),
            format!("  arg->param: {}", forward),
            format!("  param->arg: {}", backward),
            format!("Conflicts resolved: {}", self.conflicts.len()),
        ];
        if !self.conflicts.is_empty() {
            lines.push("Conflicts:".to_string());
            for conflict in &self.conflicts {
                lines.push(conflict.format());
            }
        }
        lines.join("\n")
    }

    /// Full event trace, one line per propagation.
    pub fn format_trace(&self) -> String {
        let mut lines = vec!["=== Propagation Trace ===".to_string()];
        for event in &self.events {
            lines.push(event.format());
        }
        lines.join("\n")
    }
}
