use crate::actions::params::parse_numeric;
use crate::actions::{Action, ActionResult};
use crate::error::HandlerError;
use crate::page::{PageDriver, Selector};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FillInputParams {
    /// CSS selector or XPath of the input element
    pub selector: String,

    /// Text to type into the element, replacing what is there
    pub text: String,

    /// Record the typed value under this output field
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Default)]
pub struct FillInputAction;

#[async_trait]
impl Action for FillInputAction {
    type Params = FillInputParams;

    fn name(&self) -> &str {
        "fill_input"
    }

    fn description(&self) -> &str {
        "Click an input field and replace its content with the given text. \
         Optionally record the value under an output field."
    }

    async fn execute_typed(
        &self,
        params: FillInputParams,
        driver: &dyn PageDriver,
    ) -> Result<ActionResult, HandlerError> {
        let selector = Selector::parse(&params.selector);
        driver.current_page().await?.fill(&selector, &params.text).await?;

        let result = ActionResult::success(format!("Typed \"{}\" into {}", params.text, selector));
        Ok(match params.field {
            // Amounts are recorded as numbers when they look like one
            Some(field) => {
                let value = parse_numeric(&params.text).unwrap_or_else(|| params.text.clone().into());
                result.with_output(field, value)
            }
            None => result,
        })
    }
}
