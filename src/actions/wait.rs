use crate::actions::click::ElementParams;
use crate::actions::{Action, ActionResult};
use crate::error::HandlerError;
use crate::page::{PageDriver, Selector};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_WAIT_MS: u64 = 5000;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WaitForElementParams {
    /// CSS selector or XPath of the element
    pub selector: String,

    /// How long to wait, in milliseconds
    #[serde(default = "default_wait_ms")]
    pub timeout_ms: u64,
}

fn default_wait_ms() -> u64 {
    DEFAULT_WAIT_MS
}

/// Action for waiting until an element appears
#[derive(Default)]
pub struct WaitForElementAction;

#[async_trait]
impl Action for WaitForElementAction {
    type Params = WaitForElementParams;

    fn name(&self) -> &str {
        "wait_for_element"
    }

    fn description(&self) -> &str {
        "Wait until an element matching the selector appears on the page"
    }

    async fn execute_typed(
        &self,
        params: WaitForElementParams,
        driver: &dyn PageDriver,
    ) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        driver
            .current_page()
            .await?
            .wait_for(&selector, Duration::from_millis(params.timeout_ms))
            .await?;

        Ok(ActionResult::success(format!("{} appeared", selector)))
    }
}

#[derive(Default)]
pub struct ScrollIntoViewAction;

#[async_trait]
impl Action for ScrollIntoViewAction {
    type Params = ElementParams;

    fn name(&self) -> &str {
        "scroll_into_view"
    }

    fn description(&self) -> &str {
        "Scroll the page until the element matching the selector is visible"
    }

    async fn execute_typed(&self, params: ElementParams, driver: &dyn PageDriver) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        driver.current_page().await?.scroll_into_view(&selector).await?;

        Ok(ActionResult::success(format!("Scrolled {} into view", selector)))
    }
}
