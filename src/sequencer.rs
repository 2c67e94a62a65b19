//! Deterministic setup before the reasoning loop starts

use crate::actions::{ActionRegistry, ActionResult};
use crate::error::ActionError;
use crate::page::PageDriver;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// One `{action, params}` pair of a setup sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialAction {
    pub action: String,

    #[serde(default)]
    pub params: Value,
}

impl InitialAction {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    pub fn open_url(url: impl Into<String>) -> Self {
        Self::new("open_url", json!({ "url": url.into() }))
    }

    pub fn dismiss_modal(button_text: impl Into<String>) -> Self {
        Self::new("dismiss_modal", json!({ "button_text": button_text.into() }))
    }
}

/// Why a setup action did not go through
#[derive(Debug, Error)]
pub enum SetupCause {
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The action ran but reported failure
    #[error("{0}")]
    Failed(String),
}

impl SetupCause {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SetupCause::Action(e) if e.is_fatal())
    }
}

#[derive(Debug, Error)]
#[error("Initial action {index} ('{action}') failed: {cause}")]
pub struct SetupFailed {
    pub index: usize,
    pub action: String,
    #[source]
    pub cause: SetupCause,
}

/// Run `actions` in order, stopping at the first failure.
///
/// All-or-nothing: on failure the results of the earlier actions are dropped
/// and nothing after the failing index is invoked.
pub async fn run_initial_actions(
    actions: &[InitialAction],
    registry: &ActionRegistry,
    driver: &dyn PageDriver,
) -> Result<Vec<ActionResult>, SetupFailed> {
    let mut results = Vec::with_capacity(actions.len());

    for (index, step) in actions.iter().enumerate() {
        let fail = |cause: SetupCause| SetupFailed {
            index,
            action: step.action.clone(),
            cause,
        };

        let result = registry
            .invoke(&step.action, &step.params, driver)
            .await
            .map_err(|e| fail(e.into()))?;
        if !result.success {
            return Err(fail(SetupCause::Failed(result.trace)));
        }

        log::info!("Setup {}/{}: {}", index + 1, actions.len(), result.trace);
        results.push(result);
    }

    Ok(results)
}
