//! Session-scoped formatter invocation counters.
//!
//! Every [`crate::InspectionSession`] owns one [`FormatterDiagnostics`], so
//! sessions never see each other's counts. Counters increment once per actual
//! call, whether the call succeeds, fails or times out.

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvocationCounts {
    pub size_calls: usize,
    pub materialize_calls: usize,
    /// Calls abandoned at the timeout. Their helper threads may still run.
    pub timed_out: usize,
}

#[derive(Debug, Default)]
pub struct FormatterDiagnostics {
    counts: BTreeMap<String, InvocationCounts>,
    /// Type names whose size was queried, in call order.
    size_log: Vec<String>,
}

impl FormatterDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_size(&mut self, formatter: &str, type_name: &str) {
        self.counts.entry(formatter.to_string()).or_default().size_calls += 1;
        self.size_log.push(type_name.to_string());
    }

    pub fn record_materialize(&mut self, formatter: &str) {
        self.counts
            .entry(formatter.to_string())
            .or_default()
            .materialize_calls += 1;
    }

    pub fn record_timeout(&mut self, formatter: &str) {
        self.counts.entry(formatter.to_string()).or_default().timed_out += 1;
    }

    pub fn counts(&self, formatter: &str) -> InvocationCounts {
        self.counts.get(formatter).copied().unwrap_or_default()
    }

    pub fn size_calls(&self, formatter: &str) -> usize {
        self.counts(formatter).size_calls
    }

    pub fn materialize_calls(&self, formatter: &str) -> usize {
        self.counts(formatter).materialize_calls
    }

    pub fn timed_out(&self, formatter: &str) -> usize {
        self.counts(formatter).timed_out
    }

    pub fn size_log(&self) -> &[String] {
        &self.size_log
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InvocationCounts)> {
        self.counts.iter().map(|(name, counts)| (name.as_str(), counts))
    }

    /// The size log as a list literal: `['Indexed', 'Vec<int>']`.
    pub fn render_size_log(&self) -> String {
        let items: Vec<String> = self.size_log.iter().map(|t| format!("'{}'", t)).collect();
        format!("[{}]", items.join(", "))
    }

    pub fn reset(&mut self) {
        self.counts.clear();
        self.size_log.clear();
    }
}
