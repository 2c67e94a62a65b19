use crate::actions::{Action, ActionResult};
use crate::error::HandlerError;
use crate::page::{PageDriver, Selector};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for actions that target a single element
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ElementParams {
    /// CSS selector, or XPath when it starts with `/` or `(`
    pub selector: String,
}

/// Action for clicking elements
#[derive(Default)]
pub struct ClickAction;

#[async_trait]
impl Action for ClickAction {
    type Params = ElementParams;

    fn name(&self) -> &str {
        "click_element"
    }

    fn description(&self) -> &str {
        "Click the element matching a CSS selector or XPath expression"
    }

    async fn execute_typed(&self, params: ElementParams, driver: &dyn PageDriver) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        driver.current_page().await?.click(&selector).await?;

        Ok(ActionResult::success(format!("Clicked {}", selector)))
    }
}

/// Action for hovering over elements, e.g. to reveal a menu
#[derive(Default)]
pub struct HoverAction;

#[async_trait]
impl Action for HoverAction {
    type Params = ElementParams;

    fn name(&self) -> &str {
        "hover_element"
    }

    fn description(&self) -> &str {
        "Move the mouse over the element matching a selector"
    }

    async fn execute_typed(&self, params: ElementParams, driver: &dyn PageDriver) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        driver.current_page().await?.hover(&selector).await?;

        Ok(ActionResult::success(format!("Hovered over {}", selector)))
    }
}

/// Parameters for the dismiss_modal action
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DismissModalParams {
    /// Text of the button that closes the modal
    #[serde(default = "default_dismiss_button")]
    pub button_text: String,
}

pub const DEFAULT_DISMISS_BUTTON: &str = "Start trading";

fn default_dismiss_button() -> String {
    DEFAULT_DISMISS_BUTTON.to_string()
}

/// Action for closing a blocking modal by clicking its button
#[derive(Default)]
pub struct DismissModalAction;

#[async_trait]
impl Action for DismissModalAction {
    type Params = DismissModalParams;

    fn name(&self) -> &str {
        "dismiss_modal"
    }

    fn description(&self) -> &str {
        "Dismiss a blocking modal (such as the welcome message) by clicking the button with the given text"
    }

    async fn execute_typed(
        &self,
        params: DismissModalParams,
        driver: &dyn PageDriver,
    ) -> Result<ActionResult, HandlerError> {
        let selector = Selector::button_with_text(&params.button_text);
        driver.current_page().await?.click(&selector).await?;

        Ok(ActionResult::success(format!("Modal dismissed via \"{}\"", params.button_text))
            .with_output("modal_dismissed", true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::error::DriverError;
    use crate::testing::MockDriver;
    use serde_json::json;

    #[tokio::test]
    async fn test_click_css_and_xpath() {
        let driver = MockDriver::default();
        let registry = ActionRegistry::with_defaults();

        registry
            .invoke("click_element", &json!({"selector": "[data-testid=\"submitSwap\"]"}), &driver)
            .await
            .unwrap();
        let result = registry
            .invoke(
                "click_element",
                &json!({"selector": "//*[@data-testid=\"collator-row-item-link\"]"}),
                &driver,
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            driver.page.calls(),
            vec![
                "click:[data-testid=\"submitSwap\"]",
                "click://*[@data-testid=\"collator-row-item-link\"]"
            ]
        );
    }

    #[tokio::test]
    async fn test_dismiss_modal_default_button() {
        let driver = MockDriver::default();
        let result = ActionRegistry::with_defaults()
            .invoke("dismiss_modal", &json!({}), &driver)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.output.unwrap().get("modal_dismissed"), Some(&json!(true)));
        assert_eq!(driver.page.calls(), vec!["click://button[contains(., \"Start trading\")]"]);
    }

    #[tokio::test]
    async fn test_missing_element_is_a_failed_result() {
        let driver = MockDriver::default();
        driver.page.fail_next(DriverError::ElementNotFound("#nope".into()));

        let result = ActionRegistry::with_defaults()
            .invoke("hover_element", &json!({"selector": "#nope"}), &driver)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.trace.contains("#nope"));
    }
}
