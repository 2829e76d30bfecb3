//! The capabilities the pipeline consumes from a live browser page.
//!
//! [`ScrollSurface`] is the narrow slice needed by scroll convergence and
//! screenshot stitching; [`PageAccessor`] adds navigation, element location
//! and interaction for the page drivers. The production implementation is
//! [`webdriver::WebDriverPage`]; tests substitute scripted fakes.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `wait` | Pluggable clock and wait-for-condition polling |
//! | `webdriver` | W3C WebDriver client over HTTP |

#![allow(async_fn_in_trait)]

use std::fmt;

use serde::Deserialize;

use crate::error::{Result, ScrapeError};

pub mod wait;
pub mod webdriver;

#[cfg(test)]
pub mod mock;

pub use wait::{Clock, TokioClock, wait_all_visible, wait_visible};

/// A markup signature used to find elements.
///
/// `Class` accepts compound signatures such as `"m6QErb XiKgde"`, which match
/// elements carrying every listed class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Class(String),
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn class(name: &str) -> Self {
        Locator::Class(name.to_string())
    }

    pub fn css(selector: &str) -> Self {
        Locator::Css(selector.to_string())
    }

    pub fn xpath(path: &str) -> Self {
        Locator::XPath(path.to_string())
    }

    /// The W3C location strategy and value for this signature.
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            Locator::Class(names) => {
                let selector = names
                    .split_whitespace()
                    .map(|n| format!(".{n}"))
                    .collect::<String>();
                ("css selector", selector)
            }
            Locator::Css(selector) => ("css selector", selector.clone()),
            Locator::XPath(path) => ("xpath", path.clone()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, value) = self.strategy();
        f.write_str(&value)
    }
}

/// Opaque handle to an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scrollable region that can be measured, moved and photographed.
pub trait ScrollSurface {
    /// Current scrollable height of `region` in CSS pixels.
    async fn extent(&self, region: &ElementRef) -> Result<u64>;

    /// Force-scroll `region` so that `offset` is at its top edge.
    async fn drive_to(&self, region: &ElementRef, offset: u64) -> Result<()>;

    /// PNG bytes of the currently visible part of `region`.
    async fn capture_bitmap(&self, region: &ElementRef) -> Result<Vec<u8>>;

    /// Physical pixels per CSS pixel on the captured display.
    async fn device_pixel_ratio(&self) -> Result<f64>;
}

/// Everything the page drivers need from a browsing session.
pub trait PageAccessor: ScrollSurface {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// All elements matching `locator`, in document order.
    async fn locate_all(&self, locator: &Locator) -> Result<Vec<ElementRef>>;

    /// Direct children of `element`, in document order.
    async fn children(&self, element: &ElementRef) -> Result<Vec<ElementRef>>;

    async fn text(&self, element: &ElementRef) -> Result<String>;

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;

    async fn click(&self, element: &ElementRef) -> Result<()>;

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<()>;

    /// Serialized markup of the whole current page.
    async fn markup_snapshot(&self) -> Result<String>;

    /// End the browsing session.
    async fn quit(&self) -> Result<()>;

    /// First element matching `locator`.
    async fn locate(&self, locator: &Locator) -> Result<ElementRef> {
        self.locate_all(locator)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::not_found(format!("element {locator}")))
    }

    /// Trimmed `class` attribute of `element` (empty when absent).
    async fn class_of(&self, element: &ElementRef) -> Result<String> {
        Ok(self
            .attribute(element, "class")
            .await?
            .map(|c| c.trim().to_string())
            .unwrap_or_default())
    }

    /// Visible text of every element matching `locator`.
    async fn texts(&self, locator: &Locator) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for element in self.locate_all(locator).await? {
            out.push(self.text(&element).await?);
        }
        Ok(out)
    }
}
