//! # browser-agent
//!
//! An LLM-driven browser agent for exercising web UIs. A run has three
//! parts:
//!
//! - an **action registry** of named, typed page operations the reasoner can
//!   choose from, each returning a trace line and optional output fragments;
//! - an **initial action sequence** that puts the browser in a known state
//!   (open a page, dismiss a welcome modal) before any reasoning happens;
//! - the **agent loop**, which asks a [`Reasoner`] for one decision per step,
//!   runs it against the page, and ends with a final answer that is checked
//!   against the caller's [`OutputSchema`].
//!
//! ## Running a scenario
//!
//! ```rust,no_run
//! use browser_agent::{
//!     ActionRegistry, AgentConfig, AnthropicConfig, AnthropicReasoner, ChromeDriver, FieldType,
//!     LaunchOptions, OutputSchema, run_scenario,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AgentConfig::from_env()?;
//! let driver = ChromeDriver::launch(LaunchOptions::new().headless(config.headless))?;
//! let reasoner = AnthropicReasoner::new(AnthropicConfig::from_env()?)?;
//! let registry = ActionRegistry::with_defaults();
//!
//! let expected = OutputSchema::new()
//!     .required("metamask_wallet_connector_visible", FieldType::Boolean)
//!     .required("binance_wallet_connector_visible", FieldType::Boolean);
//!
//! let output = run_scenario(
//!     "Open the connect wallet modal and report which wallet connectors are listed",
//!     &config.initial_actions("swap")?,
//!     &registry,
//!     &driver,
//!     &reasoner,
//!     &expected,
//!     config.run_config(),
//! )
//! .await?;
//!
//! println!("{}", output.to_json());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`actions`]: action descriptors, parameter coercion, the registry and the built-in actions
//! - [`sequencer`]: all-or-nothing setup sequence
//! - [`agent`]: the control loop, run configuration, history and failure reports
//! - [`reasoner`]: decision sources (Anthropic Messages API, scripted replay)
//! - [`output`]: output accumulation and schema validation
//! - [`page`]: page driver interface and its `headless_chrome` implementation
//! - [`config`]: environment configuration and scenario files
//! - [`error`]: error types and result aliases

pub mod actions;
pub mod agent;
pub mod config;
pub mod error;
pub mod output;
pub mod page;
pub mod reasoner;
pub mod sequencer;

#[doc(hidden)]
pub mod testing;

pub use actions::{Action, ActionDescriptor, ActionRegistry, ActionResult, ParamSpec, ParamType};
pub use agent::{Agent, FailureCause, HistoryEntry, RunConfig, RunFailure, RunState, RunSuccess, run_scenario};
pub use config::{AgentConfig, Scenario};
pub use error::{ActionError, DriverError, HandlerError, ReasonerError, Result};
pub use output::{FieldType, OutputSchema, SchemaValidationError, ValidatedOutput};
pub use page::{ChromeDriver, LaunchOptions, Page, PageDriver, Selector};
pub use reasoner::{AnthropicConfig, AnthropicReasoner, Decision, Reasoner, ScriptedReasoner};
pub use sequencer::{InitialAction, SetupFailed, run_initial_actions};
