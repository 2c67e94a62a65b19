//! Named, parameterised page actions
//!
//! An action is described by an [`ActionDescriptor`]: a unique name, a
//! description the reasoner reads when choosing, an ordered parameter schema
//! and a handler. Handlers receive the page driver and the parameters after
//! validation and coercion, and return an [`ActionResult`].
//!
//! Most actions are written as an [`Action`] with a typed `Params` struct, the
//! same way the built-in ones in this module are. The parameter schema is
//! derived from the struct:
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use browser_agent::actions::{Action, ActionDescriptor, ActionResult};
//! use browser_agent::error::HandlerError;
//! use browser_agent::page::{PageDriver, Selector};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct SwitchParams {}
//!
//! struct SwitchTokens;
//!
//! #[async_trait]
//! impl Action for SwitchTokens {
//!     type Params = SwitchParams;
//!
//!     fn name(&self) -> &str {
//!         "switch_tokens"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Switch the You Pay and You Get tokens"
//!     }
//!
//!     async fn execute_typed(&self, _: SwitchParams, driver: &dyn PageDriver) -> Result<ActionResult, HandlerError> {
//!         let page = driver.current_page().await?;
//!         page.click(&Selector::css("[data-testid=\"switchTokens\"]")).await?;
//!         Ok(ActionResult::success("Switched tokens").with_output("tokens_switched", true))
//!     }
//! }
//!
//! let descriptor = ActionDescriptor::from_action(SwitchTokens);
//! assert_eq!(descriptor.name(), "switch_tokens");
//! ```

pub mod click;
pub mod input;
pub mod inspect;
pub mod navigate;
pub mod params;
pub mod registry;
pub mod utils;
pub mod wait;

pub use params::{ActionParams, ParamSpec, ParamType};
pub use registry::ActionRegistry;

use crate::error::{HandlerError, ParamIssue};
use crate::page::PageDriver;
use async_trait::async_trait;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Uniform result of an action invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Whether the action did what it was asked to do
    pub success: bool,

    /// Short human-readable summary, fed back to the reasoner
    pub trace: String,

    /// Structured fragments toward the final answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<IndexMap<String, Value>>,
}

impl ActionResult {
    pub fn success(trace: impl Into<String>) -> Self {
        Self {
            success: true,
            trace: trace.into(),
            output: None,
        }
    }

    pub fn failure(trace: impl Into<String>) -> Self {
        Self {
            success: false,
            trace: trace.into(),
            output: None,
        }
    }

    /// Add a scalar output fragment
    pub fn with_output(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.get_or_insert_with(IndexMap::new).insert(field.into(), value.into());
        self
    }
}

/// Type-erased action body stored in a descriptor
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn call(&self, driver: &dyn PageDriver, params: ActionParams) -> Result<ActionResult, HandlerError>;
}

/// An action with typed parameters
#[async_trait]
pub trait Action: Send + Sync {
    type Params: DeserializeOwned + JsonSchema + Send;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Numeric parameters that pass non-numeric strings through instead of rejecting them
    fn lenient_params(&self) -> &[&str] {
        &[]
    }

    /// Parameter schema advertised to the reasoner and enforced before the call
    fn params(&self) -> Vec<ParamSpec> {
        let lenient = self.lenient_params();
        ParamSpec::for_type::<Self::Params>()
            .into_iter()
            .map(|spec| if lenient.contains(&spec.name.as_str()) { spec.lenient() } else { spec })
            .collect()
    }

    async fn execute_typed(&self, params: Self::Params, driver: &dyn PageDriver)
    -> Result<ActionResult, HandlerError>;
}

struct TypedHandler<A>(A);

#[async_trait]
impl<A> ActionHandler for TypedHandler<A>
where
    A: Action + 'static,
{
    async fn call(&self, driver: &dyn PageDriver, params: ActionParams) -> Result<ActionResult, HandlerError> {
        let typed: A::Params = params.parse().map_err(|e| {
            HandlerError::InvalidParameter(vec![ParamIssue {
                field: "params".to_string(),
                reason: e.to_string(),
            }])
        })?;
        self.0.execute_typed(typed, driver).await
    }
}

/// Registered action: identity, documentation, parameter schema and handler
#[derive(Clone)]
pub struct ActionDescriptor {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    handler: Arc<dyn ActionHandler>,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn from_action<A: Action + 'static>(action: A) -> Self {
        Self {
            name: action.name().to_string(),
            description: action.description().to_string(),
            params: action.params(),
            handler: Arc::new(TypedHandler(action)),
        }
    }

    /// Builder method: append a parameter
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn handler(&self) -> &Arc<dyn ActionHandler> {
        &self.handler
    }

    /// Catalog entry for this action
    pub fn spec(&self) -> ActionSpec {
        ActionSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.params.clone(),
        }
    }
}

impl fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// One entry of the action catalog shown to the reasoner
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
}

/// Built-in generic page actions
pub fn builtin_actions() -> Vec<ActionDescriptor> {
    vec![
        ActionDescriptor::from_action(navigate::OpenUrlAction),
        ActionDescriptor::from_action(click::DismissModalAction),
        ActionDescriptor::from_action(click::ClickAction),
        ActionDescriptor::from_action(click::HoverAction),
        ActionDescriptor::from_action(input::FillInputAction),
        ActionDescriptor::from_action(wait::WaitForElementAction),
        ActionDescriptor::from_action(wait::ScrollIntoViewAction),
        ActionDescriptor::from_action(inspect::ReadTextAction),
        ActionDescriptor::from_action(inspect::CheckVisibleAction),
    ]
}
