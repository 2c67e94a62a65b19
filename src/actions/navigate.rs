use crate::actions::utils::{absolute_url, resolve_relative};
use crate::actions::{Action, ActionResult};
use crate::error::HandlerError;
use crate::page::PageDriver;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for the open_url action
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct OpenUrlParams {
    /// Absolute URL, host name, or a path relative to the current page
    pub url: String,
}

/// Action for navigating the current tab to a URL
#[derive(Default)]
pub struct OpenUrlAction;

#[async_trait]
impl Action for OpenUrlAction {
    type Params = OpenUrlParams;

    fn name(&self) -> &str {
        "open_url"
    }

    fn description(&self) -> &str {
        "Open a URL in the current tab. Paths such as `/pools` are resolved against the current page."
    }

    async fn execute_typed(
        &self,
        params: OpenUrlParams,
        driver: &dyn PageDriver,
    ) -> Result<ActionResult, HandlerError> {
        let page = driver.current_page().await?;

        let target = match absolute_url(&params.url) {
            Some(url) => url,
            None => {
                let current = page.url().await?;
                resolve_relative(&current, &params.url).ok_or_else(|| {
                    HandlerError::failed(format!("Cannot resolve '{}' against '{}'", params.url, current))
                })?
            }
        };

        page.navigate(&target).await?;

        Ok(ActionResult::success(format!("Opened {}", target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;

    #[tokio::test]
    async fn test_open_url_normalizes() {
        let driver = MockDriver::default();
        let result = OpenUrlAction
            .execute_typed(
                OpenUrlParams {
                    url: "app.gasp.xyz".into(),
                },
                &driver,
            )
            .await
            .unwrap();

        assert_eq!(result.trace, "Opened https://app.gasp.xyz");
        assert_eq!(driver.page.calls(), vec!["navigate:https://app.gasp.xyz"]);
    }

    #[tokio::test]
    async fn test_open_relative_path() {
        let driver = MockDriver::default();
        driver.page.set_url("https://app.gasp.xyz/swap");

        OpenUrlAction
            .execute_typed(OpenUrlParams { url: "/pools".into() }, &driver)
            .await
            .unwrap();
        assert_eq!(driver.page.calls(), vec!["navigate:https://app.gasp.xyz/pools"]);

        driver.page.set_url("http://localhost:3000/");
        OpenUrlAction
            .execute_typed(OpenUrlParams { url: "staking".into() }, &driver)
            .await
            .unwrap();
        assert_eq!(driver.page.calls().last().unwrap(), "navigate:http://localhost:3000/staking");
    }

    #[tokio::test]
    async fn test_relative_path_without_base_fails() {
        let driver = MockDriver::default();
        driver.page.set_url("about:blank");

        let err = OpenUrlAction
            .execute_typed(OpenUrlParams { url: "/pools".into() }, &driver)
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
