//! Read-only actions that turn what is on the page into output fragments

use crate::actions::params::parse_numeric;
use crate::actions::{Action, ActionResult};
use crate::error::HandlerError;
use crate::page::{PageDriver, Selector};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InspectParams {
    /// CSS selector or XPath of the element
    pub selector: String,

    /// Output field to record the observation under
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Default)]
pub struct ReadTextAction;

#[async_trait]
impl Action for ReadTextAction {
    type Params = InspectParams;

    fn name(&self) -> &str {
        "read_text"
    }

    fn description(&self) -> &str {
        "Read the visible text of an element. When `field` is given the text is recorded \
         as that output field (as a number if it is one)."
    }

    async fn execute_typed(&self, params: InspectParams, driver: &dyn PageDriver) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        let text = driver.current_page().await?.text_content(&selector).await?;
        let text = text.trim().to_string();

        let result = ActionResult::success(format!("{} reads \"{}\"", selector, text));
        Ok(match params.field {
            Some(field) => {
                let value = parse_numeric(&text).unwrap_or_else(|| text.into());
                result.with_output(field, value)
            }
            None => result,
        })
    }
}

#[derive(Default)]
pub struct CheckVisibleAction;

#[async_trait]
impl Action for CheckVisibleAction {
    type Params = InspectParams;

    fn name(&self) -> &str {
        "check_visible"
    }

    fn description(&self) -> &str {
        "Check whether an element matching the selector is present. When `field` is given \
         the answer is recorded as that boolean output field."
    }

    async fn execute_typed(&self, params: InspectParams, driver: &dyn PageDriver) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        let visible = driver.current_page().await?.count(&selector).await? > 0;

        let result = ActionResult::success(format!(
            "{} is {}",
            selector,
            if visible { "visible" } else { "not visible" }
        ));
        Ok(match params.field {
            Some(field) => result.with_output(field, visible),
            None => result,
        })
    }
}
