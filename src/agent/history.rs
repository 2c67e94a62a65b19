use crate::reasoner::Decision;
use serde::Serialize;
use std::fmt;

/// One completed step: what was decided and what came of it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub step: usize,
    /// `None` when the reasoner's reply could not be read as a decision
    pub decision: Option<Decision>,
    pub success: bool,
    pub trace: String,
}

impl HistoryEntry {
    pub fn new(step: usize, decision: Decision, success: bool, trace: impl Into<String>) -> Self {
        Self {
            step,
            decision: Some(decision),
            success,
            trace: trace.into(),
        }
    }

    /// Entry for a step whose decision was unreadable
    pub fn malformed(step: usize, trace: impl Into<String>) -> Self {
        Self {
            step,
            decision: None,
            success: false,
            trace: trace.into(),
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.step)?;
        match &self.decision {
            Some(decision) => write!(f, "{}", decision)?,
            None => f.write_str("(no decision)")?,
        }
        write!(f, " -> {}{}", if self.success { "" } else { "FAILED: " }, self.trace)
    }
}

/// Conversation history of a run.
///
/// Append-only and in step order. Only the most recent `window` entries are
/// kept; older ones are counted but dropped.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    window: usize,
    dropped: usize,
}

impl History {
    pub fn new(window: usize) -> Self {
        Self {
            entries: Vec::new(),
            window: window.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        debug_assert!(self.entries.last().is_none_or(|last| last.step <= entry.step));
        self.entries.push(entry);
        if self.entries.len() > self.window {
            let excess = self.entries.len() - self.window;
            self.entries.drain(..excess);
            self.dropped += excess;
        }
    }

    /// Entries currently in the window, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// The last `n` entries, oldest first
    pub fn last(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Entries that fell out of the window
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Total number of entries ever pushed
    pub fn total(&self) -> usize {
        self.dropped + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }
}
