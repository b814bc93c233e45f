//! Browser session lifecycle. One session is created per activation, with
//! an explicit start/stop; nothing browser-related lives in module state.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};

/// A live connection to one Chrome instance and its active tab.
pub struct BrowserSession {
    browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Attach to a debugging-enabled Chrome on the default port, or launch
    /// a fresh instance when none is listening.
    pub fn start(headless: bool) -> Result<Self> {
        if let Ok(browser) = Browser::connect("http://127.0.0.1:9222".to_string()) {
            tracing::info!("attached to existing Chrome on port 9222");
            let existing = {
                let tabs_lock = browser.get_tabs();
                let tabs = tabs_lock.lock().unwrap();
                tabs.first().cloned()
            };
            let tab = match existing {
                Some(tab) => tab,
                None => browser
                    .new_tab()
                    .context("attached Chrome has no usable tab")?,
            };
            return Ok(Self { browser, tab });
        }

        tracing::info!("no debuggable Chrome found, launching one");
        let options = LaunchOptions {
            headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };
        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab().context("could not open a tab")?;
        tab.navigate_to("about:blank")
            .context("initial navigation failed")?;

        Ok(Self { browser, tab })
    }

    /// The active tab all page traffic goes through.
    pub fn tab(&self) -> Arc<Tab> {
        self.tab.clone()
    }

    /// Open a fresh tab and make it the active one.
    pub fn new_tab(&mut self) -> Result<Arc<Tab>> {
        let tab = self.browser.new_tab()?;
        self.tab = tab.clone();
        Ok(tab)
    }

    /// Tear the session down. Dropping the handle closes the CDP
    /// connection and, for a browser we launched, the process itself.
    pub fn shutdown(self) {
        tracing::info!("browser session closed");
    }
}
