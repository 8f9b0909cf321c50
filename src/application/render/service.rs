//! Per-job render coordination.
//!
//! Each job moves through a fixed sequence: wait for the backend gate,
//! acquire a page, load the schematic, capture, then hand the page back.
//! The hand-back runs on every exit path — success, load rejection, timeout —
//! so a failed job can never leave a page checked out. Jobs are independent;
//! nothing orders one against another once each owns its page.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::error::RenderError;
use crate::application::render::options::{ImageOptions, VideoOptions};
use crate::application::render::page::RenderPage;
use crate::application::render::pool::{PagePool, PoolStatus};
use crate::application::render::readiness::{ReadinessGate, ReadinessState};
use crate::util::bytes::format_bytes;

#[derive(Debug, Clone)]
pub struct RenderServiceConfig {
    /// How long a job waits for the backend gate before giving up.
    pub backend_wait: Duration,
    /// Completion-signal bound for still-image loads and captures.
    pub image_timeout: Duration,
    /// Completion-signal bound for video loads; recordings additionally get
    /// their own duration on top.
    pub video_timeout: Duration,
}

impl Default for RenderServiceConfig {
    fn default() -> Self {
        Self {
            backend_wait: Duration::from_secs(30),
            image_timeout: Duration::from_secs(30),
            video_timeout: Duration::from_secs(120),
        }
    }
}

/// Overall backend health, consumed by the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BackendStatus {
    pub ready: bool,
    pub state: ReadinessState,
    pub pool: PoolStatus,
}

enum CaptureMode<'a> {
    Image(&'a ImageOptions),
    Video(&'a VideoOptions),
}

impl CaptureMode<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Video(_) => "video",
        }
    }
}

pub struct RenderService {
    pool: Arc<PagePool>,
    gate: Arc<ReadinessGate>,
    config: RenderServiceConfig,
}

impl RenderService {
    pub fn new(pool: Arc<PagePool>, gate: Arc<ReadinessGate>, config: RenderServiceConfig) -> Self {
        Self { pool, gate, config }
    }

    /// Run the bootstrap sequence. This is the readiness gate's single
    /// writer: the gate opens only when at least one page exists, and goes
    /// to `failed` when none could be created.
    pub async fn initialize(&self) -> usize {
        self.gate.mark_initializing();
        let successes = self.pool.bootstrap().await;
        if successes > 0 {
            self.gate.mark_ready();
        } else {
            self.gate.mark_failed();
        }
        successes
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            ready: self.gate.is_ready(),
            state: self.gate.state(),
            pool: self.pool.status(),
        }
    }

    /// Render a still frame of the schematic.
    pub async fn render_image(
        &self,
        schematic: &[u8],
        options: &ImageOptions,
    ) -> Result<Vec<u8>, RenderError> {
        self.render(schematic, CaptureMode::Image(options)).await
    }

    /// Render a rotating-view video of the schematic.
    pub async fn render_video(
        &self,
        schematic: &[u8],
        options: &VideoOptions,
    ) -> Result<Vec<u8>, RenderError> {
        self.render(schematic, CaptureMode::Video(options)).await
    }

    async fn render(
        &self,
        schematic: &[u8],
        mode: CaptureMode<'_>,
    ) -> Result<Vec<u8>, RenderError> {
        let job = Uuid::new_v4();

        if !self.gate.await_ready(self.config.backend_wait).await {
            return Err(RenderError::BackendUnavailable);
        }

        let page = self.pool.acquire().await?;
        let started = Instant::now();

        info!(
            target = "schemat::render",
            job = %job,
            mode = mode.label(),
            size = %format_bytes(schematic.len() as u64),
            "rendering schematic"
        );

        let result = self.run_job(&page, schematic, &mode).await;

        // Scoped acquisition: the page goes back on every outcome. Pages
        // that stalled or failed mid-capture are in an unknown state and are
        // closed instead of pooled.
        match &result {
            Ok(buffer) => {
                let elapsed = started.elapsed();
                counter!("schemat_renders_total", "mode" => mode.label()).increment(1);
                histogram!("schemat_render_ms", "mode" => mode.label())
                    .record(elapsed.as_millis() as f64);
                info!(
                    target = "schemat::render",
                    job = %job,
                    mode = mode.label(),
                    output = %format_bytes(buffer.len() as u64),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "render complete"
                );
                self.pool.release(page).await;
            }
            Err(err) => {
                counter!("schemat_render_failures_total", "mode" => mode.label()).increment(1);
                warn!(
                    target = "schemat::render",
                    job = %job,
                    mode = mode.label(),
                    error = %err,
                    discarded = err.poisons_page(),
                    "render failed"
                );
                if err.poisons_page() {
                    self.pool.discard(page).await;
                } else {
                    self.pool.release(page).await;
                }
            }
        }

        result
    }

    async fn run_job(
        &self,
        page: &RenderPage,
        schematic: &[u8],
        mode: &CaptureMode<'_>,
    ) -> Result<Vec<u8>, RenderError> {
        let load_bound = match mode {
            CaptureMode::Image(_) => self.config.image_timeout,
            CaptureMode::Video(_) => self.config.video_timeout,
        };

        let report = page.load_schematic(schematic, load_bound).await?;
        info!(
            target = "schemat::render",
            meshes = report.mesh_count,
            build_time_ms = report.build_time_ms,
            "schematic loaded"
        );

        match mode {
            CaptureMode::Image(options) => {
                page.take_screenshot(options, self.config.image_timeout).await
            }
            CaptureMode::Video(options) => {
                let bound = self.config.video_timeout + Duration::from_secs(options.duration as u64);
                page.record_video(options, bound).await
            }
        }
    }
}
