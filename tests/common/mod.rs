//! Shared reasoner double for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use browser_agent::error::ReasonerError;
use browser_agent::reasoner::ReasonerRequest;
use browser_agent::{Decision, Reasoner};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply of a [`ReplyReasoner`]
pub enum Reply {
    Decide(Decision),
    Fail(ReasonerError),
    /// Sleep, then decide
    Slow(Duration, Decision),
}

/// Reasoner that replays replies and records the history length it was shown
#[derive(Default)]
pub struct ReplyReasoner {
    replies: Mutex<VecDeque<Reply>>,
    seen_history: Mutex<Vec<usize>>,
}

impl ReplyReasoner {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen_history: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_history(&self) -> Vec<usize> {
        self.seen_history.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen_history.lock().unwrap().len()
    }
}

#[async_trait]
impl Reasoner for ReplyReasoner {
    async fn decide(&self, request: ReasonerRequest<'_>) -> Result<Decision, ReasonerError> {
        self.seen_history.lock().unwrap().push(request.history.len());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Decide(decision)) => Ok(decision),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Slow(delay, decision)) => {
                tokio::time::sleep(delay).await;
                Ok(decision)
            }
            None => Err(ReasonerError::Exhausted),
        }
    }
}
