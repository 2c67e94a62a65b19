//! Decision source for the agent loop
//!
//! A [`Reasoner`] is asked for exactly one [`Decision`] per step. Everything it
//! needs is in the [`ReasonerRequest`]; it keeps no conversation state of its
//! own between calls.

pub mod anthropic;
pub mod scripted;

pub use anthropic::{AnthropicConfig, AnthropicReasoner};
pub use scripted::ScriptedReasoner;

use crate::actions::ActionSpec;
use crate::agent::history::HistoryEntry;
use crate::error::ReasonerError;
use crate::output::OutputSchema;
use crate::page::PageSummary;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What the reasoner chose to do next.
///
/// Serialized as `{"invoke": "<action>", "params": {...}}` or
/// `{"done": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    Invoke {
        invoke: String,
        #[serde(default)]
        params: Value,
    },
    Done {
        done: Value,
    },
}

impl Decision {
    pub fn invoke(action: impl Into<String>, params: Value) -> Self {
        Decision::Invoke {
            invoke: action.into(),
            params,
        }
    }

    pub fn done(payload: Value) -> Self {
        Decision::Done { done: payload }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Decision::Done { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Invoke { invoke, params } => write!(f, "invoke {} {}", invoke, params),
            Decision::Done { done } => write!(f, "done {}", done),
        }
    }
}

/// Observation of the page at the start of a step
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub summary: PageSummary,
    /// PNG capture, present on vision steps
    pub screenshot: Option<Vec<u8>>,
}

/// Input for a single decision
#[derive(Debug, Clone, Copy)]
pub struct ReasonerRequest<'a> {
    pub task: &'a str,
    pub catalog: &'a [ActionSpec],
    pub page: &'a PageState,
    pub history: &'a [HistoryEntry],
    pub output_schema: &'a OutputSchema,
    /// 1-based step number
    pub step: usize,
    pub max_steps: usize,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn decide(&self, request: ReasonerRequest<'_>) -> Result<Decision, ReasonerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_wire_format() {
        let invoke: Decision = serde_json::from_value(json!({"invoke": "fill_input", "params": {"text": "10"}})).unwrap();
        assert_eq!(invoke, Decision::invoke("fill_input", json!({"text": "10"})));

        let bare: Decision = serde_json::from_value(json!({"invoke": "switch_tokens"})).unwrap();
        assert_eq!(bare, Decision::invoke("switch_tokens", Value::Null));

        let done: Decision = serde_json::from_value(json!({"done": {"swap_rate_visible": true}})).unwrap();
        assert!(done.is_done());
        assert_eq!(serde_json::to_value(&done).unwrap(), json!({"done": {"swap_rate_visible": true}}));
    }

    #[test]
    fn test_unrecognised_decision() {
        assert!(serde_json::from_value::<Decision>(json!({"action": "click"})).is_err());
    }
}
