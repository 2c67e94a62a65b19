mod common;

use async_trait::async_trait;
use browser_agent::actions::ActionParams;
use browser_agent::agent::FailureCause;
use browser_agent::error::{ActionError, DriverError, HandlerError, ReasonerError};
use browser_agent::sequencer::SetupCause;
use browser_agent::{
    ActionDescriptor, ActionRegistry, ActionResult, Agent, Decision, FieldType, InitialAction, OutputSchema,
    PageDriver, ParamSpec, RunConfig, RunState, ScriptedReasoner, run_scenario,
};
use browser_agent::testing::MockDriver;
use common::{Reply, ReplyReasoner};
use serde_json::{Value, json};
use std::time::Duration;

struct Noop;

#[async_trait]
impl browser_agent::actions::ActionHandler for Noop {
    async fn call(&self, _driver: &dyn PageDriver, _params: ActionParams) -> Result<ActionResult, HandlerError> {
        Ok(ActionResult::success("Nothing happened"))
    }
}

struct SetField;

#[async_trait]
impl browser_agent::actions::ActionHandler for SetField {
    async fn call(&self, _driver: &dyn PageDriver, params: ActionParams) -> Result<ActionResult, HandlerError> {
        let name = params.str("name").unwrap_or_default().to_string();
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        Ok(ActionResult::success(format!("{} = {}", name, value)).with_output(name, value))
    }
}

fn registry() -> ActionRegistry {
    let mut registry = ActionRegistry::with_defaults();
    registry
        .register(ActionDescriptor::new("noop", "Do nothing", Noop))
        .unwrap();
    registry
        .register(
            ActionDescriptor::new("set_field", "Record an output field", SetField)
                .param(ParamSpec::string("name"))
                .param(ParamSpec::number("value")),
        )
        .unwrap();
    registry
}

fn swap_schema() -> OutputSchema {
    OutputSchema::new()
        .required("you_pay_amount", FieldType::Number)
        .required("swap_rate_visible", FieldType::Boolean)
}

#[tokio::test]
async fn test_budget_exceeded_after_exactly_max_steps() {
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![Decision::invoke("noop", json!({}))]).cycle();

    let failure = Agent::new(&registry, &driver, &reasoner)
        .with_config(RunConfig::new().max_steps(4))
        .run("Never finish", &[], &swap_schema())
        .await
        .unwrap_err();

    assert_eq!(failure.state, RunState::BudgetExceeded);
    assert!(failure.is_budget_exceeded());
    assert!(matches!(failure.cause, FailureCause::StepBudget { max_steps: 4 }));
    assert_eq!(failure.steps_taken, 4);
    assert_eq!(reasoner.calls(), 4);
}

#[tokio::test]
async fn test_recovers_from_locate_timeout() {
    let driver = MockDriver::default();
    driver.page.fail(
        "#submitSwap",
        DriverError::Timeout {
            selector: "#submitSwap".into(),
            timeout_ms: 5000,
        },
    );
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("click_element", json!({"selector": "#submitSwap"})),
        Decision::invoke("click_element", json!({"selector": "#submitSwap"})),
        Decision::done(json!({"you_pay_amount": 12.5, "swap_rate_visible": true})),
    ]);

    let success = Agent::new(&registry, &driver, &reasoner)
        .run("Submit the swap", &[], &swap_schema())
        .await
        .unwrap();

    assert_eq!(success.steps_taken, 3);
    assert!(!success.history[0].success);
    assert!(success.history[0].trace.contains("Timed out"));
    assert!(success.history[1].success);
    assert_eq!(success.output.f64("you_pay_amount"), Some(12.5));
    assert_eq!(success.output.bool("swap_rate_visible"), Some(true));
}

#[tokio::test]
async fn test_final_payload_wins_over_fragment() {
    let schema = OutputSchema::new().required("x", FieldType::Integer);
    let driver = MockDriver::default();
    let registry = registry();

    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("noop", json!({})),
        Decision::invoke("set_field", json!({"name": "x", "value": "5"})),
        Decision::done(json!({"x": 7})),
    ]);
    let output = run_scenario("t", &[], &registry, &driver, &reasoner, &schema, RunConfig::new())
        .await
        .unwrap();
    assert_eq!(output.i64("x"), Some(7));

    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("noop", json!({})),
        Decision::invoke("set_field", json!({"name": "x", "value": 5})),
        Decision::done(json!({})),
    ]);
    let output = run_scenario("t", &[], &registry, &driver, &reasoner, &schema, RunConfig::new())
        .await
        .unwrap();
    assert_eq!(output.i64("x"), Some(5));
}

#[tokio::test]
async fn test_later_fragment_overwrites_earlier() {
    let schema = OutputSchema::new().required("pay_amount", FieldType::Number);
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("set_field", json!({"name": "pay_amount", "value": 1})),
        Decision::invoke("set_field", json!({"name": "pay_amount", "value": 2.5})),
        Decision::done(json!({})),
    ]);

    let output = run_scenario("t", &[], &registry, &driver, &reasoner, &schema, RunConfig::new())
        .await
        .unwrap();
    assert_eq!(output.f64("pay_amount"), Some(2.5));
}

#[tokio::test]
async fn test_schema_strictness() {
    let driver = MockDriver::default();
    let registry = registry();

    let reasoner = ScriptedReasoner::new(vec![Decision::done(
        json!({"you_pay_amount": 12.5, "swap_rate_visible": true, "extra_field": "x"}),
    )]);
    let failure = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap_err();
    assert_eq!(failure.state, RunState::Failed);
    assert_eq!(failure.schema_error().unwrap().unexpected_fields(), vec!["extra_field"]);

    let reasoner = ScriptedReasoner::new(vec![Decision::done(json!({"you_pay_amount": 12.5}))]);
    let failure = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap_err();
    assert_eq!(failure.schema_error().unwrap().missing_fields(), vec!["swap_rate_visible"]);
    assert!(failure.report().contains("missing required field 'swap_rate_visible'"));
}

#[tokio::test]
async fn test_fragment_outside_schema_is_ignored() {
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("dismiss_modal", json!({})),
        Decision::done(json!({"you_pay_amount": "12.5", "swap_rate_visible": true})),
    ]);

    let success = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap();
    assert!(success.output.get("modal_dismissed").is_none());
    assert_eq!(success.output.f64("you_pay_amount"), Some(12.5));
}

#[tokio::test]
async fn test_session_lost_during_action_is_fatal() {
    let driver = MockDriver::default();
    driver
        .page
        .fail("#connectWallet", DriverError::SessionLost("connection is closed".into()));
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("noop", json!({})),
        Decision::invoke("click_element", json!({"selector": "#connectWallet"})),
        Decision::done(json!({"you_pay_amount": 1, "swap_rate_visible": true})),
    ]);

    let failure = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap_err();

    assert_eq!(failure.state, RunState::Failed);
    assert!(matches!(failure.cause, FailureCause::Protocol { step: 2, .. }));
    assert_eq!(reasoner.calls(), 2);
    // The failing step leaves no trace
    assert_eq!(failure.recent_history.len(), 1);
    assert_eq!(failure.steps_taken, 1);
}

#[tokio::test]
async fn test_session_lost_while_observing_is_fatal() {
    let driver = MockDriver::default();
    driver.page.fail_summary(DriverError::SessionLost("browser closed".into()));
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![Decision::invoke("noop", json!({}))]);

    let failure = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap_err();

    assert!(matches!(failure.cause, FailureCause::Protocol { step: 1, .. }));
    assert_eq!(reasoner.calls(), 0);
}

#[tokio::test]
async fn test_unreadable_page_is_not_fatal() {
    let driver = MockDriver::default();
    driver
        .page
        .fail_summary(DriverError::OperationFailed("no body".into()));
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![Decision::done(
        json!({"you_pay_amount": 1, "swap_rate_visible": false}),
    )]);

    let success = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap();
    assert_eq!(success.output.bool("swap_rate_visible"), Some(false));
}

#[tokio::test]
async fn test_setup_failure_is_all_or_nothing() {
    let driver = MockDriver::default();
    driver
        .page
        .fail("//button[contains(., \"Start trading\")]", DriverError::ElementNotFound("modal".into()));
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![Decision::done(json!({}))]);

    let failure = Agent::new(&registry, &driver, &reasoner)
        .run(
            "t",
            &[
                InitialAction::open_url("http://localhost:3000/swap"),
                InitialAction::dismiss_modal("Start trading"),
                InitialAction::new("click_element", json!({"selector": "#third"})),
            ],
            &swap_schema(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.state, RunState::Failed);
    match &failure.cause {
        FailureCause::Setup(setup) => {
            assert_eq!(setup.index, 1);
            assert!(matches!(setup.cause, SetupCause::Failed(_)));
        }
        other => panic!("unexpected cause: {other}"),
    }
    assert!(!driver.page.calls().iter().any(|op| op.contains("#third")));
    assert_eq!(reasoner.calls(), 0);
    assert!(failure.recent_history.is_empty());
}

#[tokio::test]
async fn test_setup_with_fatal_error() {
    let driver = MockDriver::default();
    driver.page.fail(
        "http://localhost:3000/swap",
        DriverError::SessionLost("connection is closed".into()),
    );
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![]);

    let failure = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[InitialAction::open_url("http://localhost:3000/swap")], &swap_schema())
        .await
        .unwrap_err();

    match &failure.cause {
        FailureCause::Setup(setup) => {
            assert_eq!(setup.index, 0);
            assert!(setup.cause.is_fatal());
            assert!(matches!(setup.cause, SetupCause::Action(ActionError::Fatal { .. })));
        }
        other => panic!("unexpected cause: {other}"),
    }
}

#[tokio::test]
async fn test_bad_decisions_are_fed_back() {
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke("switch_tokens", json!({})),
        Decision::invoke("set_field", json!({"name": "you_pay_amount", "value": "10.5.3"})),
        Decision::invoke("set_field", json!({"name": "you_pay_amount", "value": "10"})),
        Decision::done(json!({"swap_rate_visible": true})),
    ]);

    let success = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap();

    assert_eq!(success.steps_taken, 4);
    assert!(success.history[0].trace.contains("Unknown action 'switch_tokens'"));
    assert!(!success.history[0].success);
    assert!(success.history[1].trace.contains("value"));
    assert!(!success.history[1].success);
    assert_eq!(success.output.get("you_pay_amount"), Some(&json!(10)));
}

#[tokio::test]
async fn test_malformed_decision_consumes_a_step() {
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ReplyReasoner::new(vec![
        Reply::Fail(ReasonerError::Malformed("no tool call in reply".into())),
        Reply::Decide(Decision::done(json!({"you_pay_amount": 3, "swap_rate_visible": true}))),
    ]);

    let success = Agent::new(&registry, &driver, &reasoner)
        .with_config(RunConfig::new().max_steps(2))
        .run("t", &[], &swap_schema())
        .await
        .unwrap();

    assert_eq!(success.steps_taken, 2);
    assert!(success.history[0].decision.is_none());
    assert_eq!(reasoner.seen_history(), vec![0, 1]);
}

#[tokio::test]
async fn test_reasoner_transport_error_is_fatal() {
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ReplyReasoner::new(vec![
        Reply::Decide(Decision::invoke("noop", json!({}))),
        Reply::Fail(ReasonerError::Transport("connection refused".into())),
    ]);

    let failure = Agent::new(&registry, &driver, &reasoner)
        .run("t", &[], &swap_schema())
        .await
        .unwrap_err();

    assert_eq!(failure.state, RunState::Failed);
    assert!(matches!(failure.cause, FailureCause::Reasoner { step: 2, .. }));
    assert_eq!(failure.steps_taken, 1);
}

#[tokio::test]
async fn test_time_budget() {
    let driver = MockDriver::default();
    let registry = registry();
    let reasoner = ReplyReasoner::new(vec![
        Reply::Slow(Duration::from_millis(50), Decision::invoke("noop", json!({}))),
        Reply::Decide(Decision::done(json!({"you_pay_amount": 3, "swap_rate_visible": true}))),
    ]);

    let failure = Agent::new(&registry, &driver, &reasoner)
        .with_config(RunConfig::new().max_duration(Duration::from_millis(20)))
        .run("t", &[], &swap_schema())
        .await
        .unwrap_err();

    assert_eq!(failure.state, RunState::BudgetExceeded);
    assert!(matches!(failure.cause, FailureCause::TimeBudget { .. }));
    // The slow step completes before the budget is checked again
    assert_eq!(failure.steps_taken, 1);
    assert_eq!(reasoner.calls(), 1);
}

#[tokio::test]
async fn test_history_window_bounds_reasoner_input() {
    let driver = MockDriver::default();
    let registry = registry();
    let mut replies: Vec<Reply> = (0..5).map(|_| Reply::Decide(Decision::invoke("noop", json!({})))).collect();
    replies.push(Reply::Decide(Decision::done(
        json!({"you_pay_amount": 3, "swap_rate_visible": true}),
    )));
    let reasoner = ReplyReasoner::new(replies);

    let success = Agent::new(&registry, &driver, &reasoner)
        .with_config(RunConfig::new().history_window(2))
        .run("t", &[], &swap_schema())
        .await
        .unwrap();

    assert_eq!(reasoner.seen_history(), vec![0, 1, 2, 2, 2, 2]);
    assert_eq!(success.steps_taken, 6);
    let steps: Vec<usize> = success.history.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![5, 6]);
}

#[tokio::test]
async fn test_read_text_feeds_output() {
    let driver = MockDriver::default();
    driver.page.set_text("[data-testid=\"firstToken-input\"]", "12.5");
    let registry = registry();
    let reasoner = ScriptedReasoner::new(vec![
        Decision::invoke(
            "read_text",
            json!({"selector": "[data-testid=\"firstToken-input\"]", "field": "you_pay_amount"}),
        ),
        Decision::invoke(
            "check_visible",
            json!({"selector": "[data-testid=\"firstToken-input\"]", "field": "swap_rate_visible"}),
        ),
        Decision::done(json!({})),
    ]);

    let output = run_scenario("t", &[], &registry, &driver, &reasoner, &swap_schema(), RunConfig::new())
        .await
        .unwrap();
    assert_eq!(output.f64("you_pay_amount"), Some(12.5));
    assert_eq!(output.bool("swap_rate_visible"), Some(true));
}
