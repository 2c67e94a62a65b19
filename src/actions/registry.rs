use crate::actions::params::bind_params;
use crate::actions::{Action, ActionDescriptor, ActionResult, ActionSpec, builtin_actions};
use crate::error::{ActionError, HandlerError, Result};
use crate::page::PageDriver;
use indexmap::IndexMap;
use serde_json::Value;

/// Registry of named actions, resolved by exact name.
///
/// Built once before a run and read-only afterwards, so a single registry can
/// be shared between concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: IndexMap<String, ActionDescriptor>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in page actions
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_actions() {
            registry.actions.insert(descriptor.name().to_string(), descriptor);
        }
        registry
    }

    /// Register an action. Names are unique.
    pub fn register(&mut self, descriptor: ActionDescriptor) -> Result<()> {
        if self.actions.contains_key(descriptor.name()) {
            return Err(ActionError::DuplicateAction(descriptor.name().to_string()));
        }
        log::debug!("Registered action '{}'", descriptor.name());
        self.actions.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Register a typed action
    pub fn register_action<A: Action + 'static>(&mut self, action: A) -> Result<()> {
        self.register(ActionDescriptor::from_action(action))
    }

    /// Look up an action by name
    pub fn resolve(&self, name: &str) -> Result<&ActionDescriptor> {
        self.actions
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Catalog of every action in registration order
    pub fn catalog(&self) -> Vec<ActionSpec> {
        self.actions.values().map(ActionDescriptor::spec).collect()
    }

    /// Validate parameters and run an action.
    ///
    /// Handler failures come back as a failed [`ActionResult`] so the caller
    /// can carry on. A lost browser session is returned as an error, together
    /// with unknown names and parameters the action cannot accept.
    pub async fn invoke(&self, name: &str, raw_params: &Value, driver: &dyn PageDriver) -> Result<ActionResult> {
        let descriptor = self.resolve(name)?;
        let params = bind_params(name, descriptor.params(), raw_params)?;

        log::debug!("Invoking action '{}' with {:?}", name, params);

        match descriptor.handler().call(driver, params).await {
            Ok(result) => Ok(result),
            Err(HandlerError::Driver(source)) if source.is_fatal() => Err(ActionError::Fatal {
                action: name.to_string(),
                source,
            }),
            Err(HandlerError::InvalidParameter(issues)) => Err(ActionError::InvalidParameter {
                action: name.to_string(),
                issues,
            }),
            Err(e) => {
                log::warn!("Action '{}' failed: {}", name, e);
                Ok(ActionResult::failure(format!("Action '{}' failed: {}", name, e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionHandler, ActionParams, ParamSpec};
    use crate::error::DriverError;
    use crate::testing::MockDriver;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn call(
            &self,
            _driver: &dyn PageDriver,
            params: ActionParams,
        ) -> std::result::Result<ActionResult, HandlerError> {
            let amount = params.get("amount").cloned().unwrap_or(Value::Null);
            Ok(ActionResult::success(format!("amount={}", amount)).with_output("pay_amount", amount))
        }
    }

    struct Failing(DriverError);

    #[async_trait]
    impl ActionHandler for Failing {
        async fn call(
            &self,
            _driver: &dyn PageDriver,
            _params: ActionParams,
        ) -> std::result::Result<ActionResult, HandlerError> {
            Err(self.0.clone().into())
        }
    }

    fn echo() -> ActionDescriptor {
        ActionDescriptor::new("set_pay_amount", "Set You Pay amount", Echo).param(ParamSpec::number("amount"))
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = ActionRegistry::new();
        registry.register(echo()).unwrap();

        let descriptor = registry.resolve("set_pay_amount").unwrap();
        assert_eq!(descriptor.name(), "set_pay_amount");
        assert_eq!(descriptor.description(), "Set You Pay amount");
        assert_eq!(descriptor.params().len(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ActionRegistry::new();
        registry.register(echo()).unwrap();

        let err = registry.register(echo()).unwrap_err();
        assert!(matches!(err, ActionError::DuplicateAction(ref name) if name == "set_pay_amount"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_action() {
        let registry = ActionRegistry::new();
        assert!(matches!(registry.resolve("nope"), Err(ActionError::UnknownAction(_))));
    }

    #[test]
    fn test_catalog_keeps_registration_order() {
        let mut registry = ActionRegistry::new();
        registry.register(echo()).unwrap();
        registry
            .register(ActionDescriptor::new("switch_tokens", "Switch tokens", Echo))
            .unwrap();

        let catalog = registry.catalog();
        let names: Vec<&str> = catalog.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["set_pay_amount", "switch_tokens"]);
        assert_eq!(
            serde_json::to_value(&catalog[0]).unwrap(),
            json!({
                "name": "set_pay_amount",
                "description": "Set You Pay amount",
                "parameters": [{"name": "amount", "type": "number", "required": true, "default": null}]
            })
        );
    }

    #[test]
    fn test_with_defaults() {
        let registry = ActionRegistry::with_defaults();
        for name in ["open_url", "dismiss_modal", "click_element", "fill_input", "check_visible"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_invoke_coerces_params() {
        let mut registry = ActionRegistry::new();
        registry.register(echo()).unwrap();

        let result = registry
            .invoke("set_pay_amount", &json!({"amount": "10"}), &MockDriver::default())
            .await
            .unwrap();
        assert_eq!(result.trace, "amount=10");
        assert_eq!(result.output.unwrap().get("pay_amount"), Some(&json!(10)));
    }

    #[tokio::test]
    async fn test_invoke_rejects_invalid_params() {
        let mut registry = ActionRegistry::new();
        registry.register(echo()).unwrap();

        let err = registry
            .invoke("set_pay_amount", &json!({"amount": "10.5.3"}), &MockDriver::default())
            .await
            .unwrap_err();
        assert_eq!(err.invalid_fields(), vec!["amount"]);
    }

    #[tokio::test]
    async fn test_handler_errors_become_failed_results() {
        let mut registry = ActionRegistry::new();
        registry
            .register(ActionDescriptor::new(
                "click_swap",
                "Click swap",
                Failing(DriverError::Timeout {
                    selector: "#swap".into(),
                    timeout_ms: 100,
                }),
            ))
            .unwrap();

        let result = registry
            .invoke("click_swap", &json!({}), &MockDriver::default())
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.trace.contains("click_swap"));
        assert!(result.trace.contains("#swap"));
    }

    #[tokio::test]
    async fn test_session_loss_propagates() {
        let mut registry = ActionRegistry::new();
        registry
            .register(ActionDescriptor::new(
                "click_swap",
                "Click swap",
                Failing(DriverError::SessionLost("ws closed".into())),
            ))
            .unwrap();

        let err = registry
            .invoke("click_swap", &Value::Null, &MockDriver::default())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
