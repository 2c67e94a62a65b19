//! Page driver capability
//!
//! The agent loop and the action handlers never talk to a browser directly.
//! They go through [`PageDriver`] and [`Page`], which report failures as
//! [`DriverError`] values: a missing element or a wait timeout is an ordinary
//! error the caller can react to, a dropped session is fatal.

pub mod chrome;
pub mod config;

pub use chrome::{ChromeDriver, ChromePage};
pub use config::{ConnectionOptions, LaunchOptions};

use crate::error::DriverResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How to locate an element on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Selector::XPath(expression.into())
    }

    /// Interpret a raw selector string. Expressions starting with `/` or `(`
    /// are XPath, everything else is CSS.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('/') || trimmed.starts_with('(') {
            Selector::XPath(trimmed.to_string())
        } else {
            Selector::Css(trimmed.to_string())
        }
    }

    /// XPath matching a button whose text contains `text`
    pub fn button_with_text(text: &str) -> Self {
        Selector::XPath(format!("//button[contains(., {})]", xpath_literal(text)))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Selector::Css(s) | Selector::XPath(s) => s,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quote a string for use inside an XPath expression
fn xpath_literal(text: &str) -> String {
    if !text.contains('"') {
        format!("\"{}\"", text)
    } else if !text.contains('\'') {
        format!("'{}'", text)
    } else {
        let parts: Vec<String> = text.split('"').map(|p| format!("\"{}\"", p)).collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}

/// What the reasoner gets to see of the current page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    pub title: String,
    /// Readable page content (Markdown), possibly truncated
    pub content: String,
}

impl PageSummary {
    /// Truncate content to at most `limit` characters
    pub fn truncated(mut self, limit: usize) -> Self {
        if self.content.chars().count() > limit {
            let cut: String = self.content.chars().take(limit).collect();
            self.content = format!("{}\n...(truncated)", cut);
        }
        self
    }
}

/// A live page in the browser session
#[async_trait]
pub trait Page: Send + Sync {
    async fn url(&self) -> DriverResult<String>;

    async fn navigate(&self, url: &str) -> DriverResult<()>;

    async fn click(&self, selector: &Selector) -> DriverResult<()>;

    /// Replace the content of an input with `text`
    async fn fill(&self, selector: &Selector, text: &str) -> DriverResult<()>;

    async fn hover(&self, selector: &Selector) -> DriverResult<()>;

    async fn scroll_into_view(&self, selector: &Selector) -> DriverResult<()>;

    /// Wait until an element matching `selector` appears
    async fn wait_for(&self, selector: &Selector, timeout: Duration) -> DriverResult<()>;

    /// Number of elements currently matching `selector`
    async fn count(&self, selector: &Selector) -> DriverResult<usize>;

    async fn text_content(&self, selector: &Selector) -> DriverResult<String>;

    /// PNG capture of the visible viewport
    async fn snapshot(&self) -> DriverResult<Vec<u8>>;

    async fn summary(&self) -> DriverResult<PageSummary>;
}

/// Source of the page an action should operate on
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn current_page(&self) -> DriverResult<Arc<dyn Page>>;
}
