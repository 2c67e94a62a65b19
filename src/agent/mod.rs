//! The agent control loop
//!
//! A run goes `INIT → RUNNING → {DONE, FAILED, BUDGET_EXCEEDED}`:
//!
//! * `INIT` runs the setup sequence. Any failure there ends the run as `FAILED`.
//! * `RUNNING` repeats observe → decide → act until the reasoner declares a
//!   final answer or the step or time budget runs out. Failed actions, unknown
//!   actions, bad parameters and unreadable decisions are written to the
//!   history as failures and the loop carries on, so the reasoner can correct
//!   itself. A lost browser session or a reasoner that cannot be reached ends
//!   the run as `FAILED` straight away.
//! * `DONE` validates the accumulated output against the expected schema; a
//!   mismatch turns the run into `FAILED`.
//!
//! The time budget is checked between steps only. A step that is waiting on
//! the page or the reasoner runs to completion first.

pub mod history;
pub mod recording;

pub use history::{History, HistoryEntry};
pub use recording::GifRecorder;

use crate::actions::ActionRegistry;
use crate::error::{ActionError, DriverError, ReasonerError};
use crate::output::{OutputAccumulator, OutputSchema, SchemaIssue, SchemaValidationError, ValidatedOutput, validate};
use crate::page::{PageDriver, PageSummary};
use crate::reasoner::{Decision, PageState, Reasoner, ReasonerRequest};
use crate::sequencer::{InitialAction, SetupFailed, run_initial_actions};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Limits and observation settings for a run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of reasoner decisions
    pub max_steps: usize,

    /// Wall-clock ceiling, checked before each step
    pub max_duration: Duration,

    /// History entries kept and shown to the reasoner
    pub history_window: usize,

    /// History entries included in a failure report
    pub failure_history: usize,

    /// Attach a screenshot to every observation
    pub use_vision: bool,

    /// Characters of page content shown to the reasoner
    pub page_content_limit: usize,

    /// Write an animated GIF of the run here
    pub record_gif: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: 25,
            max_duration: Duration::from_secs(300),
            history_window: 20,
            failure_history: 5,
            use_vision: false,
            page_content_limit: 8000,
            record_gif: None,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn failure_history(mut self, entries: usize) -> Self {
        self.failure_history = entries;
        self
    }

    pub fn use_vision(mut self, use_vision: bool) -> Self {
        self.use_vision = use_vision;
        self
    }

    pub fn page_content_limit(mut self, limit: usize) -> Self {
        self.page_content_limit = limit;
        self
    }

    pub fn record_gif(mut self, path: impl Into<PathBuf>) -> Self {
        self.record_gif = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Running,
    Done,
    Failed,
    BudgetExceeded,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Init => "INIT",
            RunState::Running => "RUNNING",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
            RunState::BudgetExceeded => "BUDGET_EXCEEDED",
        })
    }
}

/// Why a run did not produce a validated answer
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Setup(#[from] SetupFailed),

    #[error("Browser session lost at step {step}: {source}")]
    Protocol {
        step: usize,
        #[source]
        source: DriverError,
    },

    #[error("Reasoner failed at step {step}: {source}")]
    Reasoner {
        step: usize,
        #[source]
        source: ReasonerError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error("No final answer within {max_steps} steps")]
    StepBudget { max_steps: usize },

    #[error("No final answer within {limit:?} (ran for {elapsed:?})")]
    TimeBudget { elapsed: Duration, limit: Duration },
}

/// Terminal failure of a run: its kind, its cause and the tail of its history
#[derive(Debug, Error)]
#[error("Run ended {state} after {steps_taken} step(s): {cause}")]
pub struct RunFailure {
    /// `Failed` or `BudgetExceeded`
    pub state: RunState,
    #[source]
    pub cause: FailureCause,
    pub steps_taken: usize,
    pub recent_history: Vec<HistoryEntry>,
}

impl RunFailure {
    pub fn is_budget_exceeded(&self) -> bool {
        self.state == RunState::BudgetExceeded
    }

    pub fn schema_error(&self) -> Option<&SchemaValidationError> {
        match &self.cause {
            FailureCause::Schema(e) => Some(e),
            _ => None,
        }
    }

    /// Multi-line diagnostic for humans
    pub fn report(&self) -> String {
        let mut out = format!("{}\n", self);

        if let Some(schema) = self.schema_error() {
            for issue in &schema.issues {
                out.push_str(&format!("  - {}\n", issue));
            }
        }

        if self.recent_history.is_empty() {
            out.push_str("No steps recorded.\n");
        } else {
            out.push_str(&format!("Last {} step(s):\n", self.recent_history.len()));
            for entry in &self.recent_history {
                out.push_str(&format!("  {}\n", entry));
            }
        }
        out
    }
}

/// Successful run
#[derive(Debug, Clone)]
pub struct RunSuccess {
    pub output: ValidatedOutput,
    pub steps_taken: usize,
    pub history: Vec<HistoryEntry>,
}

/// Drives one task to completion against one page session
pub struct Agent<'a> {
    registry: &'a ActionRegistry,
    driver: &'a dyn PageDriver,
    reasoner: &'a dyn Reasoner,
    config: RunConfig,
}

impl<'a> Agent<'a> {
    pub fn new(registry: &'a ActionRegistry, driver: &'a dyn PageDriver, reasoner: &'a dyn Reasoner) -> Self {
        Self {
            registry,
            driver,
            reasoner,
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `task` from setup to a validated answer
    pub async fn run(
        &self,
        task: &str,
        initial_actions: &[InitialAction],
        expected: &OutputSchema,
    ) -> Result<RunSuccess, RunFailure> {
        let mut recorder = self.config.record_gif.clone().map(GifRecorder::new);
        let outcome = self.drive(task, initial_actions, expected, recorder.as_mut()).await;
        if let Some(recorder) = recorder {
            recorder.finish();
        }

        match &outcome {
            Ok(success) => log::info!("Run DONE after {} step(s)", success.steps_taken),
            Err(failure) => log::warn!("{}", failure),
        }
        outcome
    }

    async fn drive(
        &self,
        task: &str,
        initial_actions: &[InitialAction],
        expected: &OutputSchema,
        mut recorder: Option<&mut GifRecorder>,
    ) -> Result<RunSuccess, RunFailure> {
        let started = Instant::now();
        let mut run = RunContext::new(&self.config);

        log::info!("Run {}: {} setup action(s)", RunState::Init, initial_actions.len());
        run_initial_actions(initial_actions, self.registry, self.driver)
            .await
            .map_err(|e| run.fail(RunState::Failed, e.into()))?;

        log::info!(
            "Run {}: step budget {}, time budget {:?}",
            RunState::Running,
            self.config.max_steps,
            self.config.max_duration
        );
        let catalog = self.registry.catalog();

        for step in 1..=self.config.max_steps {
            let elapsed = started.elapsed();
            if elapsed >= self.config.max_duration {
                return Err(run.fail(
                    RunState::BudgetExceeded,
                    FailureCause::TimeBudget {
                        elapsed,
                        limit: self.config.max_duration,
                    },
                ));
            }

            let page = self
                .observe(recorder.as_deref_mut())
                .await
                .map_err(|source| run.fail(RunState::Failed, FailureCause::Protocol { step, source }))?;

            let request = ReasonerRequest {
                task,
                catalog: &catalog,
                page: &page,
                history: run.history.entries(),
                output_schema: expected,
                step,
                max_steps: self.config.max_steps,
            };
            let decision = match self.reasoner.decide(request).await {
                Ok(decision) => decision,
                Err(e) if e.is_recoverable() => {
                    log::warn!("Step {}: {}", step, e);
                    run.record(HistoryEntry::malformed(step, e.to_string()));
                    continue;
                }
                Err(source) => {
                    return Err(run.fail(RunState::Failed, FailureCause::Reasoner { step, source }));
                }
            };
            log::info!("Step {}/{}: {}", step, self.config.max_steps, decision);

            match decision {
                Decision::Invoke { invoke, params } => match self.registry.invoke(&invoke, &params, self.driver).await {
                    Ok(result) => {
                        log::info!("Step {}: {}", step, result.trace);
                        if let Some(fragment) = &result.output {
                            run.output.merge_fragment(step, fragment);
                        }
                        run.record(HistoryEntry::new(
                            step,
                            Decision::Invoke { invoke, params },
                            result.success,
                            result.trace,
                        ));
                    }
                    Err(ActionError::Fatal { source, .. }) => {
                        return Err(run.fail(RunState::Failed, FailureCause::Protocol { step, source }));
                    }
                    Err(e) => {
                        log::warn!("Step {}: {}", step, e);
                        run.record(HistoryEntry::new(step, Decision::Invoke { invoke, params }, false, e.to_string()));
                    }
                },
                Decision::Done { done } => {
                    run.record(HistoryEntry::new(
                        step,
                        Decision::Done { done: done.clone() },
                        true,
                        "Final answer declared",
                    ));
                    log::info!("Run {} at step {}, validating output", RunState::Done, step);
                    return run.finish(done, expected);
                }
            }
        }

        Err(run.fail(
            RunState::BudgetExceeded,
            FailureCause::StepBudget {
                max_steps: self.config.max_steps,
            },
        ))
    }

    /// Summarise the current page. Only a lost session is an error here.
    async fn observe(&self, recorder: Option<&mut GifRecorder>) -> Result<PageState, DriverError> {
        let page = self.driver.current_page().await?;

        let summary = match page.summary().await {
            Ok(summary) => summary.truncated(self.config.page_content_limit),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("Could not read the page: {}", e);
                PageSummary {
                    content: format!("(page content unavailable: {})", e),
                    ..PageSummary::default()
                }
            }
        };

        let mut screenshot = None;
        if self.config.use_vision || recorder.is_some() {
            match page.snapshot().await {
                Ok(png) => screenshot = Some(png),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::warn!("Could not capture the page: {}", e),
            }
        }
        if let (Some(recorder), Some(png)) = (recorder, &screenshot) {
            recorder.push_png(png);
        }
        if !self.config.use_vision {
            screenshot = None;
        }

        Ok(PageState { summary, screenshot })
    }
}

/// Per-run mutable state, owned by a single `drive` call
struct RunContext {
    history: History,
    output: OutputAccumulator,
    steps_taken: usize,
    failure_history: usize,
}

impl RunContext {
    fn new(config: &RunConfig) -> Self {
        Self {
            history: History::new(config.history_window),
            output: OutputAccumulator::new(),
            steps_taken: 0,
            failure_history: config.failure_history,
        }
    }

    fn record(&mut self, entry: HistoryEntry) {
        self.steps_taken = entry.step;
        self.history.push(entry);
    }

    fn fail(&self, state: RunState, cause: FailureCause) -> RunFailure {
        RunFailure {
            state,
            cause,
            steps_taken: self.steps_taken,
            recent_history: self.history.last(self.failure_history).to_vec(),
        }
    }

    fn finish(mut self, payload: Value, expected: &OutputSchema) -> Result<RunSuccess, RunFailure> {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let err = SchemaValidationError {
                    issues: vec![SchemaIssue::NotAnObject(other)],
                };
                return Err(self.fail(RunState::Failed, err.into()));
            }
        };
        self.output.merge_payload(&payload);

        match validate(&self.output, expected) {
            Ok(output) => Ok(RunSuccess {
                output,
                steps_taken: self.steps_taken,
                history: self.history.into_entries(),
            }),
            Err(e) => {
                log::warn!("{}", e);
                Err(self.fail(RunState::Failed, e.into()))
            }
        }
    }
}

/// Run a task end to end and return only the validated answer
pub async fn run_scenario(
    task: &str,
    initial_actions: &[InitialAction],
    registry: &ActionRegistry,
    driver: &dyn PageDriver,
    reasoner: &dyn Reasoner,
    expected: &OutputSchema,
    config: RunConfig,
) -> Result<ValidatedOutput, RunFailure> {
    Agent::new(registry, driver, reasoner)
        .with_config(config)
        .run(task, initial_actions, expected)
        .await
        .map(|success| success.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::FieldType;
    use crate::reasoner::ScriptedReasoner;
    use crate::testing::MockDriver;
    use serde_json::json;

    fn schema() -> OutputSchema {
        OutputSchema::new().required("modal_dismissed", FieldType::Boolean)
    }

    #[tokio::test]
    async fn test_fragment_satisfies_schema() {
        let driver = MockDriver::default();
        let registry = ActionRegistry::with_defaults();
        let reasoner = ScriptedReasoner::new(vec![
            Decision::invoke("dismiss_modal", json!({})),
            Decision::done(json!({})),
        ]);

        let success = Agent::new(&registry, &driver, &reasoner)
            .run("Dismiss the welcome modal", &[], &schema())
            .await
            .unwrap();

        assert_eq!(success.output.bool("modal_dismissed"), Some(true));
        assert_eq!(success.steps_taken, 2);
        assert_eq!(success.history.len(), 2);
    }

    #[tokio::test]
    async fn test_non_object_payload() {
        let driver = MockDriver::default();
        let registry = ActionRegistry::with_defaults();
        let reasoner = ScriptedReasoner::new(vec![Decision::done(json!("looks fine"))]);

        let failure = Agent::new(&registry, &driver, &reasoner)
            .run("t", &[], &schema())
            .await
            .unwrap_err();

        assert_eq!(failure.state, RunState::Failed);
        assert!(matches!(
            failure.schema_error().unwrap().issues[0],
            SchemaIssue::NotAnObject(_)
        ));
    }

    #[tokio::test]
    async fn test_report_lists_issues_and_history() {
        let driver = MockDriver::default();
        let registry = ActionRegistry::with_defaults();
        let reasoner = ScriptedReasoner::new(vec![
            Decision::invoke("click_element", json!({"selector": "#missing"})),
            Decision::done(json!({"extra_field": 1})),
        ]);
        driver.page.fail_next(DriverError::ElementNotFound("#missing".into()));

        let failure = Agent::new(&registry, &driver, &reasoner)
            .with_config(RunConfig::new().failure_history(1))
            .run("t", &[], &schema())
            .await
            .unwrap_err();

        let report = failure.report();
        assert!(report.starts_with("Run ended FAILED after 2 step(s)"));
        assert!(report.contains("missing required field 'modal_dismissed'"));
        assert!(report.contains("unexpected field 'extra_field'"));
        assert_eq!(failure.recent_history.len(), 1);
        assert!(report.contains("[2] done"));
        assert!(!report.contains("#missing"));
    }

    #[tokio::test]
    async fn test_vision_attaches_screenshot_only_when_enabled() {
        let driver = MockDriver::default();
        let registry = ActionRegistry::new();
        let reasoner = ScriptedReasoner::new(vec![]);

        let agent = Agent::new(&registry, &driver, &reasoner);
        assert!(agent.observe(None).await.unwrap().screenshot.is_none());

        let agent = agent.with_config(RunConfig::new().use_vision(true));
        assert!(agent.observe(None).await.unwrap().screenshot.is_some());
    }

    #[tokio::test]
    async fn test_setup_failure_is_failed_without_steps() {
        let driver = MockDriver::default();
        let registry = ActionRegistry::with_defaults();
        let reasoner = ScriptedReasoner::new(vec![Decision::done(json!({"modal_dismissed": true}))]);

        let failure = Agent::new(&registry, &driver, &reasoner)
            .run("t", &[InitialAction::new("nope", json!({}))], &schema())
            .await
            .unwrap_err();

        assert_eq!(failure.state, RunState::Failed);
        assert!(matches!(failure.cause, FailureCause::Setup(ref e) if e.index == 0));
        assert_eq!(failure.steps_taken, 0);
        assert_eq!(reasoner.calls(), 0);
    }
}
