//! `headless_chrome` implementation of the page driver.
//!
//! `headless_chrome` is a blocking client. On a multi-thread tokio runtime
//! its calls run through `block_in_place`, so an element wait does not hold
//! up the other tasks on that worker. On any other executor they block the
//! calling task. Element lookups wait up to the configured element timeout,
//! the same auto-wait behaviour scripted UI tests rely on.

use crate::error::{DriverError, DriverResult};
use crate::page::config::{ConnectionOptions, LaunchOptions};
use crate::page::{Page, PageDriver, PageSummary, Selector};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Run a blocking `headless_chrome` call
fn blocking<T>(op: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(op),
        _ => op(),
    }
}

/// Map a `headless_chrome` error onto the driver error taxonomy
pub(crate) fn classify_error(err: &anyhow::Error, selector: Option<&Selector>, timeout: Duration) -> DriverError {
    let message = format!("{:#}", err);
    let lower = message.to_lowercase();
    let target = selector.map(ToString::to_string).unwrap_or_else(|| "page".to_string());

    if lower.contains("connection is closed")
        || lower.contains("connection closed")
        || lower.contains("closed channel")
        || lower.contains("broken pipe")
    {
        return DriverError::SessionLost(message);
    }

    if lower.contains("never came") || lower.contains("timed out") || lower.contains("timeout") {
        return DriverError::Timeout {
            selector: target,
            timeout_ms: timeout.as_millis() as u64,
        };
    }

    if lower.contains("no element") || lower.contains("could not find") || lower.contains("not found") {
        return DriverError::ElementNotFound(format!("{}: {}", target, message));
    }

    DriverError::OperationFailed(format!("{}: {}", target, message))
}

/// Browser session that manages a Chrome/Chromium instance
pub struct ChromeDriver {
    browser: Browser,
    element_timeout: Duration,
}

impl ChromeDriver {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> DriverResult<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Keep automation markers out of the page so apps behave as they do for users
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // A run can last far longer than the default 30s idle timeout
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;

        if let Some(path) = options.chrome_path {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir {
            launch_opts.user_data_dir = Some(dir);
        }

        let browser = Browser::new(launch_opts).map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        browser
            .new_tab()
            .map_err(|e| DriverError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        log::info!(
            "Launched Chrome ({}, {}x{})",
            if options.headless { "headless" } else { "headed" },
            options.window_width,
            options.window_height
        );

        Ok(Self {
            browser,
            element_timeout: options.element_timeout,
        })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> DriverResult<Self> {
        let browser = Browser::connect_with_timeout(options.ws_url.clone(), Duration::from_millis(options.timeout))
            .map_err(|e| DriverError::LaunchFailed(format!("Failed to connect to {}: {}", options.ws_url, e)))?;

        Ok(Self {
            browser,
            element_timeout: options.element_timeout,
        })
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Get all tabs
    pub fn get_tabs(&self) -> DriverResult<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| DriverError::OperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// Get the currently active tab by checking the document visibility and focus state
    pub fn get_active_tab(&self) -> DriverResult<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        // Visibility and focus is the strongest signal, visibility alone the fallback
        for script in [
            "document.visibilityState === 'visible' && document.hasFocus()",
            "document.visibilityState === 'visible'",
        ] {
            for tab in &tabs {
                match tab.evaluate(script, false) {
                    Ok(remote_object) => {
                        if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                            return Ok(tab.clone());
                        }
                    }
                    Err(e) => {
                        let err = classify_error(&e, None, self.element_timeout);
                        if err.is_fatal() {
                            return Err(err);
                        }
                        log::debug!("Failed to check tab status: {}", e);
                    }
                }
            }
        }

        // Headless tabs do not always report visibility; the newest tab is the one in use
        tabs.last()
            .cloned()
            .ok_or_else(|| DriverError::SessionLost("No open tabs left".to_string()))
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn current_page(&self) -> DriverResult<Arc<dyn Page>> {
        let tab = blocking(|| self.get_active_tab())?;
        Ok(Arc::new(ChromePage::new(tab, self.element_timeout)))
    }
}

/// One browser tab
pub struct ChromePage {
    tab: Arc<Tab>,
    element_timeout: Duration,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>, element_timeout: Duration) -> Self {
        Self { tab, element_timeout }
    }

    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    fn err(&self, err: anyhow::Error, selector: &Selector) -> DriverError {
        classify_error(&err, Some(selector), self.element_timeout)
    }

    fn locate_with_timeout(&self, selector: &Selector, timeout: Duration) -> anyhow::Result<Element<'_>> {
        match selector {
            Selector::Css(css) => self.tab.wait_for_element_with_custom_timeout(css, timeout),
            Selector::XPath(xpath) => self.tab.wait_for_xpath_with_custom_timeout(xpath, timeout),
        }
    }

    /// Wait for the element and run `op` on it
    fn with_element<T>(
        &self,
        selector: &Selector,
        op: impl FnOnce(&Element<'_>) -> anyhow::Result<T>,
    ) -> DriverResult<T> {
        let element = self
            .locate_with_timeout(selector, self.element_timeout)
            .map_err(|e| self.err(e, selector))?;
        op(&element).map_err(|e| self.err(e, selector))
    }
}

#[async_trait]
impl Page for ChromePage {
    async fn url(&self) -> DriverResult<String> {
        Ok(blocking(|| self.tab.get_url()))
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        blocking(|| self.tab.navigate_to(url).and_then(|tab| tab.wait_until_navigated()).map(|_| ()))
            .map_err(|e| match classify_error(&e, None, self.element_timeout) {
                fatal @ DriverError::SessionLost(_) => fatal,
                _ => DriverError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)),
            })?;
        Ok(())
    }

    async fn click(&self, selector: &Selector) -> DriverResult<()> {
        blocking(|| self.with_element(selector, |el| el.click().map(|_| ())))
    }

    async fn fill(&self, selector: &Selector, text: &str) -> DriverResult<()> {
        blocking(|| {
            self.with_element(selector, |el| {
                el.click()?;
                el.call_js_fn(
                    "function() { this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }",
                    vec![],
                    false,
                )?;
                el.type_into(text)?;
                Ok(())
            })
        })
    }

    async fn hover(&self, selector: &Selector) -> DriverResult<()> {
        blocking(|| self.with_element(selector, |el| el.move_mouse_over().map(|_| ())))
    }

    async fn scroll_into_view(&self, selector: &Selector) -> DriverResult<()> {
        blocking(|| self.with_element(selector, |el| el.scroll_into_view().map(|_| ())))
    }

    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> DriverResult<()> {
        blocking(|| self.locate_with_timeout(selector, timeout).map(|_| ()))
            .map_err(|e| classify_error(&e, Some(selector), timeout))
    }

    async fn count(&self, selector: &Selector) -> DriverResult<usize> {
        let found = blocking(|| match selector {
            Selector::Css(css) => self.tab.find_elements(css).map(|els| els.len()),
            Selector::XPath(xpath) => self.tab.find_elements_by_xpath(xpath).map(|els| els.len()),
        });
        match found {
            Ok(n) => Ok(n),
            Err(e) => match self.err(e, selector) {
                DriverError::ElementNotFound(_) => Ok(0),
                other => Err(other),
            },
        }
    }

    async fn text_content(&self, selector: &Selector) -> DriverResult<String> {
        blocking(|| self.with_element(selector, |el| el.get_inner_text()))
    }

    async fn snapshot(&self) -> DriverResult<Vec<u8>> {
        blocking(|| {
            self.tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .map_err(|e| match classify_error(&e, None, self.element_timeout) {
                fatal @ DriverError::SessionLost(_) => fatal,
                _ => DriverError::OperationFailed(format!("Failed to capture screenshot: {}", e)),
            })
    }

    async fn summary(&self) -> DriverResult<PageSummary> {
        let (title, html, url) = blocking(|| {
            let title = self.tab.get_title().unwrap_or_default();
            self.tab.get_content().map(|html| (title, html, self.tab.get_url()))
        })
        .map_err(|e| classify_error(&e, None, self.element_timeout))?;

        Ok(PageSummary {
            url,
            title,
            content: html2md::parse_html(&html),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(message: &str) -> DriverError {
        classify_error(
            &anyhow::anyhow!(message.to_string()),
            Some(&Selector::css("#pay")),
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_classify_connection_closed_is_fatal() {
        let err = classify("Unable to make method calls because underlying connection is closed");
        assert!(matches!(err, DriverError::SessionLost(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_classify_wait_timeout() {
        let err = classify("The event waited for never came");
        assert_eq!(
            err,
            DriverError::Timeout {
                selector: "#pay".into(),
                timeout_ms: 1500
            }
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_classify_missing_node() {
        assert!(matches!(classify("No element found"), DriverError::ElementNotFound(_)));
        assert!(matches!(classify("Could not find node with given id"), DriverError::ElementNotFound(_)));
    }

    #[test]
    fn test_classify_other_errors() {
        let err = classify("Element is not clickable");
        assert!(matches!(err, DriverError::OperationFailed(ref m) if m.contains("#pay")));
    }

    // Integration tests (require Chrome to be installed)
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_on_multi_thread_runtime() {
        let ticker = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "ticked"
        });
        let value = blocking(|| {
            std::thread::sleep(Duration::from_millis(50));
            42
        });
        assert_eq!(value, 42);
        assert_eq!(ticker.await.unwrap(), "ticked");
    }

    #[tokio::test]
    async fn test_blocking_on_current_thread_runtime() {
        assert_eq!(blocking(|| "inline"), "inline");
    }

    #[test]
    fn test_blocking_outside_a_runtime() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test]
    #[ignore] // Ignore by default, run with: cargo test -- --ignored
    async fn test_launch_and_navigate() {
        let driver = ChromeDriver::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser");
        let page = driver.current_page().await.expect("No page");
        page.navigate("about:blank").await.expect("Failed to navigate");
        assert_eq!(page.url().await.unwrap(), "about:blank");
    }
}
