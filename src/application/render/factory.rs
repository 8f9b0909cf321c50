//! Builds ready-to-render pages.
//!
//! Creation is a fixed ladder of bounded steps: open, navigate to the front
//! end, poll until the helper surface exists, then wait for the renderer's
//! own readiness promise. Every failure after the page was opened closes the
//! page before the error propagates, so a failed attempt never leaks a
//! browser context. The factory mutates nothing outside the page it builds.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::application::error::RenderError;
use crate::application::render::page::{PageHost, RenderPage};

#[derive(Debug, Clone)]
pub struct PageFactoryConfig {
    /// URL the rendering front end is served from.
    pub frontend_url: String,
    /// Bound on navigation up to document parse.
    pub navigation_timeout: Duration,
    /// Bound on the helper surface appearing after navigation.
    pub helper_discovery_timeout: Duration,
    /// Interval between helper-surface probes.
    pub helper_poll_interval: Duration,
    /// Bound on the front end's own readiness promise.
    pub frontend_ready_timeout: Duration,
}

impl Default for PageFactoryConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            navigation_timeout: Duration::from_secs(30),
            helper_discovery_timeout: Duration::from_secs(15),
            helper_poll_interval: Duration::from_millis(500),
            frontend_ready_timeout: Duration::from_secs(10),
        }
    }
}

pub struct PageFactory {
    host: Arc<dyn PageHost>,
    config: PageFactoryConfig,
}

impl PageFactory {
    pub fn new(host: Arc<dyn PageHost>, config: PageFactoryConfig) -> Self {
        Self { host, config }
    }

    /// Create one pre-initialized render page.
    ///
    /// Does not retry: a stalled navigation or an absent helper surface fails
    /// this attempt and the caller decides whether another is worth making.
    pub async fn create(&self) -> Result<RenderPage, RenderError> {
        let started = Instant::now();
        let handle = self.host.open_page().await.map_err(|err| {
            counter!("schemat_page_create_failures_total").increment(1);
            RenderError::creation_failed(format!("could not open page: {err}"))
        })?;
        let page = RenderPage::new(handle);

        match self.initialize(&page).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                histogram!("schemat_page_create_ms").record(elapsed.as_millis() as f64);
                info!(
                    target = "schemat::render::factory",
                    elapsed_ms = elapsed.as_millis() as u64,
                    "render page ready"
                );
                Ok(page)
            }
            Err(err) => {
                counter!("schemat_page_create_failures_total").increment(1);
                warn!(
                    target = "schemat::render::factory",
                    error = %err,
                    "page initialization failed, closing page"
                );
                page.close().await;
                Err(err)
            }
        }
    }

    async fn initialize(&self, page: &RenderPage) -> Result<(), RenderError> {
        let url = &self.config.frontend_url;

        match timeout(self.config.navigation_timeout, page.navigate(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(RenderError::creation_failed(format!(
                    "front end unreachable at {url}: {err}"
                )));
            }
            Err(_) => {
                return Err(RenderError::creation_failed(format!(
                    "navigation to {url} did not parse within {}s",
                    self.config.navigation_timeout.as_secs()
                )));
            }
        }

        self.discover_helpers(page).await?;

        match page.is_ready().await {
            Ok(true) => {
                debug!(
                    target = "schemat::render::factory",
                    "renderer already ready, skipping wait"
                );
                return Ok(());
            }
            Ok(false) => {}
            Err(err) => {
                return Err(RenderError::creation_failed(format!(
                    "readiness check failed: {err}"
                )));
            }
        }

        page.wait_for_ready(self.config.frontend_ready_timeout)
            .await
            .map_err(|err| RenderError::creation_failed(format!("renderer not ready: {err}")))
    }

    /// Poll for the helper surface. The front end installs its helpers while
    /// scripts are still booting, so partial or absent surfaces keep polling
    /// until the discovery deadline.
    async fn discover_helpers(&self, page: &RenderPage) -> Result<(), RenderError> {
        let deadline = Instant::now() + self.config.helper_discovery_timeout;
        let mut last_missing: Vec<String> = Vec::new();

        loop {
            match page.probe_capabilities().await {
                Ok(probe) if probe.is_complete() => return Ok(()),
                Ok(probe) => {
                    last_missing = if probe.present {
                        probe.missing
                    } else {
                        Vec::new()
                    };
                }
                Err(err) => {
                    debug!(
                        target = "schemat::render::factory",
                        error = %err,
                        "helper probe failed, retrying"
                    );
                }
            }

            if Instant::now() >= deadline {
                if !last_missing.is_empty() {
                    return Err(RenderError::capability_missing(last_missing.join(", ")));
                }
                return Err(RenderError::creation_failed(format!(
                    "helper surface did not appear within {}s",
                    self.config.helper_discovery_timeout.as_secs()
                )));
            }

            sleep(self.config.helper_poll_interval).await;
        }
    }
}
