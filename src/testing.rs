//! In-memory page driver for tests
//!
//! Element operations succeed unless a failure was queued, either for the
//! next operation of any kind or for a specific target. Every operation is
//! logged as `op:target`.

use crate::error::{DriverError, DriverResult};
use crate::page::{Page, PageDriver, PageSummary, Selector};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MockPage {
    calls: Mutex<Vec<String>>,
    url: Mutex<String>,
    next_failures: Mutex<VecDeque<DriverError>>,
    target_failures: Mutex<HashMap<String, VecDeque<DriverError>>>,
    texts: Mutex<HashMap<String, String>>,
    counts: Mutex<HashMap<String, usize>>,
    summary_error: Mutex<Option<DriverError>>,
}

impl MockPage {
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn set_url(&self, url: &str) {
        *lock(&self.url) = url.to_string();
    }

    /// Fail the next element operation, whatever it targets
    pub fn fail_next(&self, err: DriverError) {
        lock(&self.next_failures).push_back(err);
    }

    /// Fail the next operation on `target` (a selector, or a URL for navigation)
    pub fn fail(&self, target: &str, err: DriverError) {
        lock(&self.target_failures)
            .entry(target.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn fail_summary(&self, err: DriverError) {
        *lock(&self.summary_error) = Some(err);
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        lock(&self.texts).insert(selector.to_string(), text.to_string());
    }

    pub fn set_count(&self, selector: &str, count: usize) {
        lock(&self.counts).insert(selector.to_string(), count);
    }

    fn record(&self, entry: String, target: &str) -> DriverResult<()> {
        lock(&self.calls).push(entry);
        let queued = lock(&self.target_failures)
            .get_mut(target)
            .and_then(VecDeque::pop_front);
        match queued.or_else(|| lock(&self.next_failures).pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn op(&self, op: &str, target: &str) -> DriverResult<()> {
        self.record(format!("{}:{}", op, target), target)
    }
}

#[async_trait]
impl Page for MockPage {
    async fn url(&self) -> DriverResult<String> {
        Ok(lock(&self.url).clone())
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.op("navigate", url)?;
        self.set_url(url);
        Ok(())
    }

    async fn click(&self, selector: &Selector) -> DriverResult<()> {
        self.op("click", selector.as_str())
    }

    async fn fill(&self, selector: &Selector, text: &str) -> DriverResult<()> {
        self.record(format!("fill:{}={}", selector, text), selector.as_str())?;
        self.set_text(selector.as_str(), text);
        Ok(())
    }

    async fn hover(&self, selector: &Selector) -> DriverResult<()> {
        self.op("hover", selector.as_str())
    }

    async fn scroll_into_view(&self, selector: &Selector) -> DriverResult<()> {
        self.op("scroll", selector.as_str())
    }

    async fn wait_for(&self, selector: &Selector, _timeout: Duration) -> DriverResult<()> {
        self.op("wait", selector.as_str())
    }

    async fn count(&self, selector: &Selector) -> DriverResult<usize> {
        self.op("count", selector.as_str())?;
        if let Some(count) = lock(&self.counts).get(selector.as_str()) {
            return Ok(*count);
        }
        Ok(usize::from(lock(&self.texts).contains_key(selector.as_str())))
    }

    async fn text_content(&self, selector: &Selector) -> DriverResult<String> {
        self.op("text", selector.as_str())?;
        lock(&self.texts)
            .get(selector.as_str())
            .cloned()
            .ok_or_else(|| DriverError::ElementNotFound(selector.to_string()))
    }

    async fn snapshot(&self) -> DriverResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn summary(&self) -> DriverResult<PageSummary> {
        if let Some(err) = lock(&self.summary_error).clone() {
            return Err(err);
        }
        Ok(PageSummary {
            url: lock(&self.url).clone(),
            title: "Mock".to_string(),
            content: String::new(),
        })
    }
}

#[derive(Default, Clone)]
pub struct MockDriver {
    pub page: Arc<MockPage>,
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn current_page(&self) -> DriverResult<Arc<dyn Page>> {
        Ok(self.page.clone())
    }
}
