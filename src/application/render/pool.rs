//! Bounded pool of ready render pages.
//!
//! Pages cost seconds to create and carry loaded scene state, so the pool
//! keeps up to `capacity` of them idle between jobs. `acquire` never waits on
//! other callers: it pops an idle page or builds a fresh one on demand.
//! Overshoot beyond capacity is allowed while jobs are in flight; the cap is
//! enforced at `release`, where surplus pages are closed instead of pooled.
//!
//! The idle vector is the only structure shared between concurrent jobs. Its
//! mutex guards O(1) push/pop operations and is never held across an await.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::gauge;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::error::RenderError;
use crate::application::render::factory::PageFactory;
use crate::application::render::page::RenderPage;

/// Occupancy snapshot for health reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStatus {
    pub available: usize,
    pub total: usize,
}

pub struct PagePool {
    factory: PageFactory,
    capacity: usize,
    idle: Mutex<Vec<RenderPage>>,
    initialized: AtomicBool,
}

impl PagePool {
    pub fn new(factory: PageFactory, capacity: usize) -> Self {
        Self {
            factory,
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Attempt to create `capacity` pages. Individual failures are logged and
    /// skipped; the pool becomes usable once at least one page exists.
    /// Returns the number of pages created.
    pub async fn bootstrap(&self) -> usize {
        let mut successes = 0usize;

        for attempt in 1..=self.capacity {
            match self.factory.create().await {
                Ok(page) => {
                    self.push_idle(page);
                    successes += 1;
                    info!(
                        target = "schemat::render::pool",
                        page = attempt,
                        total = self.capacity,
                        "created render page"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "schemat::render::pool",
                        page = attempt,
                        total = self.capacity,
                        error = %err,
                        "failed to create render page, continuing"
                    );
                }
            }
        }

        if successes > 0 {
            self.initialized.store(true, Ordering::SeqCst);
        }

        if successes == 0 {
            warn!(
                target = "schemat::render::pool",
                "no render pages could be created, backend is unusable"
            );
        } else if successes < self.capacity {
            warn!(
                target = "schemat::render::pool",
                created = successes,
                requested = self.capacity,
                "render pool started degraded"
            );
        } else {
            info!(
                target = "schemat::render::pool",
                pages = successes,
                "render pool initialized"
            );
        }

        successes
    }

    /// Pop an idle page, or build one on demand when the pool is empty.
    /// On-demand creation failures propagate to the caller.
    pub async fn acquire(&self) -> Result<RenderPage, RenderError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(RenderError::NotInitialized);
        }

        let idle = {
            let mut pool = self.idle.lock().expect("render pool poisoned");
            let page = pool.pop();
            self.record_occupancy(pool.len());
            page
        };

        match idle {
            Some(page) => Ok(page),
            None => {
                debug!(
                    target = "schemat::render::pool",
                    "pool empty, creating page on demand"
                );
                self.factory.create().await
            }
        }
    }

    /// Return a page after a job. Pages above capacity are closed, keeping
    /// steady-state resource usage bounded.
    pub async fn release(&self, page: RenderPage) {
        let surplus = {
            let mut pool = self.idle.lock().expect("render pool poisoned");
            if pool.len() < self.capacity {
                pool.push(page);
                self.record_occupancy(pool.len());
                None
            } else {
                Some(page)
            }
        };

        if let Some(page) = surplus {
            debug!(
                target = "schemat::render::pool",
                "pool at capacity, closing released page"
            );
            page.close().await;
        }
    }

    /// Close a page that must not be reused.
    pub async fn discard(&self, page: RenderPage) {
        debug!(target = "schemat::render::pool", "discarding render page");
        page.close().await;
    }

    pub fn status(&self) -> PoolStatus {
        let available = self.idle.lock().expect("render pool poisoned").len();
        PoolStatus {
            available,
            total: self.capacity,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Close every idle page. Checked-out pages are closed by their jobs'
    /// release path once those jobs finish.
    pub async fn shutdown(&self) {
        let drained: Vec<RenderPage> = {
            let mut pool = self.idle.lock().expect("render pool poisoned");
            let pages = pool.drain(..).collect();
            self.record_occupancy(0);
            pages
        };

        for page in drained {
            page.close().await;
        }
    }

    fn push_idle(&self, page: RenderPage) {
        let mut pool = self.idle.lock().expect("render pool poisoned");
        pool.push(page);
        self.record_occupancy(pool.len());
    }

    fn record_occupancy(&self, available: usize) {
        gauge!("schemat_pool_available_pages").set(available as f64);
    }
}
