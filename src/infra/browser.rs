//! Headless-Chrome implementation of the page seam.
//!
//! One Chromium process hosts every render page as a tab. The CDP client is
//! blocking, so each call is bridged onto the blocking thread pool; the async
//! traits above never see a blocked runtime worker. Page console output is
//! forwarded to `tracing` as observational diagnostics only.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tokio::task;
use tracing::debug;

use crate::application::render::{PageError, PageHandle, PageHost};
use crate::config::BrowserSettings;
use crate::infra::error::InfraError;

/// Chromium flags the rendering front end needs: no audio device, no
/// throttling of the WebGL loop while the window is unfocused or occluded.
const CHROMIUM_ARGS: [&str; 7] = [
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--disable-audio-output",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
];

pub struct ChromeHost {
    browser: Browser,
    call_timeout: Duration,
}

impl ChromeHost {
    /// Launch the shared browser process with a fixed window size so every
    /// page renders onto the same deterministic surface.
    pub fn launch(settings: &BrowserSettings, viewport: (u32, u32)) -> Result<Self, InfraError> {
        let mut builder = LaunchOptions::default_builder();
        builder
            .headless(true)
            .sandbox(settings.sandbox)
            .window_size(Some(viewport))
            .args(CHROMIUM_ARGS.iter().map(OsStr::new).collect())
            // Pooled pages sit idle between jobs; the default idle timeout
            // would sever the CDP connection underneath them.
            .idle_browser_timeout(Duration::from_secs(86_400));

        if let Some(path) = settings.binary.clone() {
            builder.path(Some(path));
        }

        let options = builder
            .build()
            .map_err(|err| InfraError::browser(err.to_string()))?;
        let browser = Browser::new(options).map_err(|err| InfraError::browser(err.to_string()))?;

        Ok(Self {
            browser,
            call_timeout: settings.call_timeout,
        })
    }
}

#[async_trait]
impl PageHost for ChromeHost {
    async fn open_page(&self) -> Result<Box<dyn PageHandle>, PageError> {
        let browser = self.browser.clone();
        let call_timeout = self.call_timeout;

        let tab = run_blocking(move || {
            let tab = browser.new_tab().map_err(|err| err.to_string())?;
            tab.set_default_timeout(call_timeout);
            forward_console(&tab);
            Ok(tab)
        })
        .await
        .map_err(PageError::Open)?;

        Ok(Box::new(ChromePage { tab }))
    }
}

fn forward_console(tab: &Arc<Tab>) {
    if let Err(err) = tab.enable_log() {
        debug!(target = "schemat::browser", error = %err, "could not enable page log domain");
        return;
    }

    let listener = tab.add_event_listener(Arc::new(move |event: &Event| {
        if let Event::LogEntryAdded(entry) = event {
            let entry = &entry.params.entry;
            debug!(
                target = "schemat::browser",
                level = ?entry.level,
                text = %entry.text,
                "page console"
            );
        }
    }));

    if let Err(err) = listener {
        debug!(target = "schemat::browser", error = %err, "could not attach page log listener");
    }
}

struct ChromePage {
    tab: Arc<Tab>,
}

#[async_trait]
impl PageHandle for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let tab = self.tab.clone();
        let url = url.to_string();

        run_blocking(move || {
            tab.navigate_to(&url).map_err(|err| err.to_string())?;
            tab.wait_until_navigated().map_err(|err| err.to_string())?;
            Ok(())
        })
        .await
        .map_err(PageError::Navigation)
    }

    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<Value, PageError> {
        let tab = self.tab.clone();
        let script = script.to_string();

        run_blocking(move || {
            let object = tab
                .evaluate(&script, await_promise)
                .map_err(|err| err.to_string())?;
            Ok(object.value.unwrap_or(Value::Null))
        })
        .await
        .map_err(PageError::Evaluation)
    }

    async fn close(&self) -> Result<(), PageError> {
        let tab = self.tab.clone();

        run_blocking(move || {
            tab.close(true).map_err(|err| err.to_string())?;
            Ok(())
        })
        .await
        .map_err(PageError::Close)
    }
}

async fn run_blocking<T>(work: impl FnOnce() -> Result<T, String> + Send + 'static) -> Result<T, String>
where
    T: Send + 'static,
{
    match task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(format!("blocking browser call failed: {err}")),
    }
}
