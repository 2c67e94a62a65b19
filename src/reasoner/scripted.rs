use crate::error::ReasonerError;
use crate::reasoner::{Decision, Reasoner, ReasonerRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reasoner that replays a fixed list of decisions.
///
/// Useful for deterministic replays of a recorded run and for exercising the
/// loop without a model. Once the script runs out it either starts over
/// (`cycle`) or reports [`ReasonerError::Exhausted`].
pub struct ScriptedReasoner {
    script: Vec<Decision>,
    pending: Mutex<VecDeque<Decision>>,
    cycle: bool,
    calls: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new(script: Vec<Decision>) -> Self {
        Self {
            pending: Mutex::new(script.iter().cloned().collect()),
            script,
            cycle: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Replay the script forever
    pub fn cycle(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Number of decisions requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decide(&self, request: ReasonerRequest<'_>) -> Result<Decision, ReasonerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut pending = self
            .pending
            .lock()
            .map_err(|_| ReasonerError::Transport("script lock poisoned".to_string()))?;
        if pending.is_empty() && self.cycle {
            pending.extend(self.script.iter().cloned());
        }

        let decision = pending.pop_front().ok_or(ReasonerError::Exhausted)?;
        log::debug!("Step {}: scripted decision {}", request.step, decision);
        Ok(decision)
    }
}
