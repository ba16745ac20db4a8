use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config::BrowserSettings;
use crate::scanner::{ElementHandle, CANDIDATE_SELECTOR};
use crate::writeback::{FormSurface, WriteError};

// Every script receives [selector, ordinal, id, tag, ...] and resolves the
// element by id first, then by position in the candidate query.
const LOCATE: &str = r#"
const [selector, ordinal, id, tag] = arguments;
let el = id ? document.getElementById(id) : null;
if (!el) { el = document.querySelectorAll(selector)[ordinal] || null; }
if (el && el.tagName.toLowerCase() !== tag) { el = null; }
"#;

const SET_TEXT: &str = r#"
if (!el) return false;
const value = arguments[4];
if (el.isContentEditable && !('value' in el)) {
  el.textContent = value;
} else {
  const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, value);
}
for (const type of ['input', 'change', 'blur']) {
  el.dispatchEvent(new Event(type, { bubbles: true }));
}
return true;
"#;

const SELECT_INDEX: &str = r#"
if (!el) return false;
el.selectedIndex = arguments[4];
el.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#;

const CHECK: &str = r#"
if (!el) return false;
el.checked = true;
el.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#;

const HIGHLIGHT: &str = r#"
if (!el) return false;
const previous = el.style.backgroundColor;
el.style.backgroundColor = arguments[4];
setTimeout(() => { el.style.backgroundColor = previous; }, arguments[5]);
return true;
"#;

const RETURN_ELEMENT: &str = "return el;";

/// A live WebDriver session. The async driver runs on a private runtime so
/// the rest of the crate stays synchronous.
pub struct BrowserSession {
    runtime: Runtime,
    driver: WebDriver,
    settings: BrowserSettings,
}

impl BrowserSession {
    pub fn connect(settings: &BrowserSettings) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to start async runtime")?;
        let caps = DesiredCapabilities::chrome();
        let driver = runtime
            .block_on(WebDriver::new(&settings.webdriver_url, caps))
            .with_context(|| {
                format!(
                    "Failed to connect to WebDriver at {}. Make sure chromedriver is running.",
                    settings.webdriver_url
                )
            })?;
        info!("Connected to WebDriver at {}", settings.webdriver_url);
        Ok(Self {
            runtime,
            driver,
            settings: settings.clone(),
        })
    }

    /// Navigates to `url`, waits for dynamic content, and returns the page source.
    pub fn open(&self, url: &str) -> Result<String> {
        info!("Navigating to {}", url);
        self.runtime
            .block_on(self.driver.goto(url))
            .with_context(|| format!("Failed to navigate to {}", url))?;
        std::thread::sleep(Duration::from_millis(self.settings.page_load_wait_ms));
        self.source()
    }

    pub fn source(&self) -> Result<String> {
        self.runtime
            .block_on(self.driver.source())
            .context("Failed to read page source")
    }

    pub fn current_url(&self) -> Result<String> {
        let url = self
            .runtime
            .block_on(self.driver.current_url())
            .context("Failed to read current URL")?;
        Ok(url.to_string())
    }

    pub fn quit(self) -> Result<()> {
        let Self { runtime, driver, .. } = self;
        runtime.block_on(driver.quit()).context("Failed to close browser session")
    }

    fn driver_call<T, F>(&self, fut: F) -> Result<T, WriteError>
    where
        F: Future<Output = WebDriverResult<T>>,
    {
        self.runtime
            .block_on(fut)
            .map_err(|e| WriteError::Driver(e.to_string()))
    }

    fn args(element: &ElementHandle, extra: &[Value]) -> Vec<Value> {
        let mut args = vec![
            json!(CANDIDATE_SELECTOR),
            json!(element.ordinal),
            json!(element.id.clone().unwrap_or_default()),
            json!(element.tag),
        ];
        args.extend_from_slice(extra);
        args
    }

    fn run(&self, element: &ElementHandle, body: &str, extra: &[Value]) -> Result<(), WriteError> {
        let script = format!("{}{}", LOCATE, body);
        let ret = self.driver_call(self.driver.execute(&script, Self::args(element, extra)))?;
        if ret.json().as_bool() == Some(true) {
            Ok(())
        } else {
            Err(WriteError::missing(element))
        }
    }
}

impl FormSurface for BrowserSession {
    fn set_text(&mut self, element: &ElementHandle, value: &str) -> Result<(), WriteError> {
        self.run(element, SET_TEXT, &[json!(value)])
    }

    fn select_index(&mut self, element: &ElementHandle, index: usize) -> Result<(), WriteError> {
        self.run(element, SELECT_INDEX, &[json!(index)])
    }

    fn check(&mut self, element: &ElementHandle) -> Result<(), WriteError> {
        self.run(element, CHECK, &[])
    }

    fn highlight(&mut self, element: &ElementHandle) -> Result<(), WriteError> {
        let extra = [json!(self.settings.highlight_color), json!(self.settings.highlight_ms)];
        self.run(element, HIGHLIGHT, &extra)
    }

    fn attach_file(&mut self, element: &ElementHandle, path: &Path) -> Result<(), WriteError> {
        if !path.exists() {
            return Err(WriteError::Unsupported(format!("missing resume file {}", path.display())));
        }
        let script = format!("{}{}", LOCATE, RETURN_ELEMENT);
        let ret = self.driver_call(self.driver.execute(&script, Self::args(element, &[])))?;
        let input = ret.element().map_err(|_| WriteError::missing(element))?;
        let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        debug!("Attaching {} to {}", absolute.display(), element.tag);
        self.driver_call(input.send_keys(absolute.display().to_string()))
    }
}
