//! The seam between the host process and one isolated browser page, plus the
//! typed capability surface the rendering front end exposes inside it.
//!
//! [`PageHost`] and [`PageHandle`] are the only operations the core needs from
//! a real browser: open a page, navigate it, evaluate a script (optionally
//! awaiting an in-page promise), close it. Everything above that — capability
//! validation, readiness, load/completion correlation, capture — lives in
//! [`RenderPage`] and is exercised in tests through mock handles.
//!
//! Failures thrown inside page scripts travel back as evaluation errors; the
//! scripts tag them with stable markers so the host can map them onto the
//! typed [`RenderError`] taxonomy instead of probing message prose.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::error::RenderError;
use crate::application::render::options::{ImageOptions, LoadReport, VideoOptions};

/// Logical identifier every job loads its schematic under. Reusing one slot
/// makes each load replace the page's previous scene, which is what keeps
/// pooled pages safe to reuse.
pub const SCHEMATIC_SLOT: &str = "api-schematic";

const MARKER_LOAD_REJECTED: &str = "schematic-load-rejected";
const MARKER_RENDER_TIMEOUT: &str = "schematic-render-timeout";
const MARKER_CAPABILITY_MISSING: &str = "capability-missing";

/// Fixed grace added to host-side timeouts so the in-page timer, which carries
/// the authoritative bound, fires first.
const HOST_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Transport-level failures talking to a browser page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("failed to open page: {0}")]
    Open(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("failed to close page: {0}")]
    Close(String),
}

/// A running browser capable of opening isolated pages.
#[async_trait]
pub trait PageHost: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn PageHandle>, PageError>;
}

/// One isolated browser page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate and return once the document has parsed.
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Evaluate a script in the page. With `await_promise`, the returned
    /// promise is awaited and its settled value (or rejection) is reported.
    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<Value, PageError>;

    async fn close(&self) -> Result<(), PageError>;
}

/// Result of probing for the front end's helper object.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityProbe {
    pub present: bool,
    #[serde(default)]
    pub missing: Vec<String>,
}

impl CapabilityProbe {
    pub fn is_complete(&self) -> bool {
        self.present && self.missing.is_empty()
    }
}

/// A pre-initialized rendering page: the front end is loaded, its helper
/// surface validated, and its renderer ready. Owned by the pool while idle
/// and by exactly one job while checked out.
pub struct RenderPage {
    handle: Box<dyn PageHandle>,
}

impl std::fmt::Debug for RenderPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPage").finish_non_exhaustive()
    }
}

impl RenderPage {
    pub fn new(handle: Box<dyn PageHandle>) -> Self {
        Self { handle }
    }

    pub async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.handle.navigate(url).await
    }

    /// Check whether `window.schematicHelpers` exists with every required
    /// function. Absence is a normal answer during startup polling, not an
    /// error.
    pub async fn probe_capabilities(&self) -> Result<CapabilityProbe, PageError> {
        let script = r#"
            (() => {
                const helpers = window.schematicHelpers;
                if (!helpers) {
                    return { present: false, missing: [] };
                }
                const required = [
                    "isReady",
                    "waitForReady",
                    "loadSchematic",
                    "takeScreenshot",
                    "startVideoRecording",
                ];
                const missing = required.filter((name) => typeof helpers[name] !== "function");
                return { present: true, missing };
            })()
        "#;

        let value = self.handle.evaluate(script, false).await?;
        serde_json::from_value(value)
            .map_err(|err| PageError::Evaluation(format!("malformed capability probe: {err}")))
    }

    pub async fn is_ready(&self) -> Result<bool, PageError> {
        let value = self
            .handle
            .evaluate("window.schematicHelpers.isReady() === true", false)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Await the front end's own readiness promise, bounded in-page.
    pub async fn wait_for_ready(&self, bound: Duration) -> Result<(), PageError> {
        let script = format!(
            r#"
            new Promise((resolve, reject) => {{
                const timer = setTimeout(
                    () => reject(new Error("renderer initialization timed out")),
                    {bound_ms},
                );
                window.schematicHelpers.waitForReady().then(
                    () => {{ clearTimeout(timer); resolve(true); }},
                    (error) => {{ clearTimeout(timer); reject(error); }},
                );
            }})
            "#,
            bound_ms = bound.as_millis(),
        );

        match tokio::time::timeout(
            bound + HOST_TIMEOUT_GRACE,
            self.handle.evaluate(&script, true),
        )
        .await
        {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(PageError::Evaluation(
                "renderer readiness wait exceeded its bound".to_string(),
            )),
        }
    }

    /// Load schematic bytes into the fixed slot and wait for the render
    /// front end's completion signal.
    ///
    /// The completion listener is installed before `loadSchematic` is
    /// invoked; installing it after would lose a completion that fires
    /// faster than the host can subscribe.
    pub async fn load_schematic(
        &self,
        data: &[u8],
        bound: Duration,
    ) -> Result<LoadReport, RenderError> {
        let payload = BASE64.encode(data);
        let script = format!(
            r#"
            (async () => {{
                const completed = new Promise((resolve, reject) => {{
                    const timer = setTimeout(
                        () => reject(new Error("{MARKER_RENDER_TIMEOUT}")),
                        {bound_ms},
                    );
                    window.addEventListener(
                        "schematicRenderComplete",
                        (event) => {{
                            clearTimeout(timer);
                            resolve(event.detail);
                        }},
                        {{ once: true }},
                    );
                }});
                try {{
                    await window.schematicHelpers.loadSchematic("{slot}", "{payload}");
                }} catch (error) {{
                    throw new Error(
                        "{MARKER_LOAD_REJECTED}: "
                            + (error && error.message ? error.message : String(error)),
                    );
                }}
                return completed;
            }})()
            "#,
            bound_ms = bound.as_millis(),
            slot = SCHEMATIC_SLOT,
        );

        let evaluated = tokio::time::timeout(
            bound + HOST_TIMEOUT_GRACE,
            self.handle.evaluate(&script, true),
        )
        .await;

        let value = match evaluated {
            Ok(Ok(value)) => value,
            Ok(Err(PageError::Evaluation(message))) => {
                // A synchronous load rejection is checked before the timeout
                // branch: a malformed schematic fails immediately even when
                // the completion timer would also have fired.
                if let Some((_, detail)) = message.split_once(MARKER_LOAD_REJECTED) {
                    let detail = detail.trim_start_matches(':').trim();
                    return Err(RenderError::invalid_schematic(detail));
                }
                if message.contains(MARKER_RENDER_TIMEOUT) {
                    return Err(RenderError::timeout(bound));
                }
                return Err(RenderError::invalid_schematic(message));
            }
            Ok(Err(err)) => return Err(RenderError::invalid_schematic(err.to_string())),
            Err(_) => return Err(RenderError::timeout(bound)),
        };

        let report = match serde_json::from_value::<LoadReport>(value) {
            Ok(report) => report,
            Err(err) => {
                debug!(
                    target = "schemat::render::page",
                    error = %err,
                    "completion event detail was not decodable, continuing with empty metadata"
                );
                LoadReport::default()
            }
        };

        Ok(report)
    }

    /// Capture one still frame of the loaded scene.
    pub async fn take_screenshot(
        &self,
        options: &ImageOptions,
        bound: Duration,
    ) -> Result<Vec<u8>, RenderError> {
        let opts = serde_json::to_string(options)
            .map_err(|err| RenderError::capture_failed(err.to_string()))?;
        let script = format!(
            r#"
            (async () => {{
                const helpers = window.schematicHelpers;
                if (!helpers || typeof helpers.takeScreenshot !== "function") {{
                    throw new Error("{MARKER_CAPABILITY_MISSING}:takeScreenshot");
                }}
                const blob = await helpers.takeScreenshot({opts});
                return await blobToBase64(blob);

                function blobToBase64(blob) {{
                    return new Promise((resolve, reject) => {{
                        const reader = new FileReader();
                        reader.onerror = () => reject(reader.error);
                        reader.onloadend = () => {{
                            const url = reader.result;
                            resolve(url.slice(url.indexOf(",") + 1));
                        }};
                        reader.readAsDataURL(blob);
                    }});
                }}
            }})()
            "#,
        );

        self.capture(&script, bound, "takeScreenshot").await
    }

    /// Record a rotating-view video of the loaded scene.
    pub async fn record_video(
        &self,
        options: &VideoOptions,
        bound: Duration,
    ) -> Result<Vec<u8>, RenderError> {
        let opts = serde_json::to_string(options)
            .map_err(|err| RenderError::capture_failed(err.to_string()))?;
        let script = format!(
            r#"
            (async () => {{
                const helpers = window.schematicHelpers;
                if (!helpers || typeof helpers.startVideoRecording !== "function") {{
                    throw new Error("{MARKER_CAPABILITY_MISSING}:startVideoRecording");
                }}
                const blob = await helpers.startVideoRecording({opts});
                return await blobToBase64(blob);

                function blobToBase64(blob) {{
                    return new Promise((resolve, reject) => {{
                        const reader = new FileReader();
                        reader.onerror = () => reject(reader.error);
                        reader.onloadend = () => {{
                            const url = reader.result;
                            resolve(url.slice(url.indexOf(",") + 1));
                        }};
                        reader.readAsDataURL(blob);
                    }});
                }}
            }})()
            "#,
        );

        self.capture(&script, bound, "startVideoRecording").await
    }

    async fn capture(
        &self,
        script: &str,
        bound: Duration,
        capability: &str,
    ) -> Result<Vec<u8>, RenderError> {
        let evaluated =
            tokio::time::timeout(bound + HOST_TIMEOUT_GRACE, self.handle.evaluate(script, true))
                .await;

        let value = match evaluated {
            Ok(Ok(value)) => value,
            Ok(Err(PageError::Evaluation(message)))
                if message.contains(MARKER_CAPABILITY_MISSING) =>
            {
                return Err(RenderError::capability_missing(capability));
            }
            Ok(Err(err)) => return Err(RenderError::capture_failed(err.to_string())),
            Err(_) => {
                return Err(RenderError::capture_failed(format!(
                    "capture did not finish within {}s",
                    (bound + HOST_TIMEOUT_GRACE).as_secs()
                )));
            }
        };

        let encoded = value
            .as_str()
            .ok_or_else(|| RenderError::capture_failed("capture returned no data"))?;
        let buffer = BASE64
            .decode(encoded)
            .map_err(|err| RenderError::capture_failed(format!("undecodable capture: {err}")))?;

        if buffer.is_empty() {
            return Err(RenderError::capture_failed("capture returned empty buffer"));
        }

        Ok(buffer)
    }

    pub async fn close(self) {
        if let Err(err) = self.handle.close().await {
            warn!(target = "schemat::render::page", error = %err, "failed to close page");
        }
    }
}
