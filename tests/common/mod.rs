//! Scripted stand-ins for the browser seam.
//!
//! `MockHost` hands out `MockPage`s that answer the render protocol from a
//! per-page script: helper probes, readiness, load outcomes, and captures.
//! Every evaluated script is recorded so tests can assert on protocol order.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use schemat::application::render::{PageError, PageHandle, PageHost};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
pub const WEBM_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = PNG_SIGNATURE.to_vec();
    bytes.extend_from_slice(b"mock-image-data");
    bytes
}

pub fn webm_bytes() -> Vec<u8> {
    let mut bytes = WEBM_MAGIC.to_vec();
    bytes.extend_from_slice(b"mock-video-data");
    bytes
}

#[derive(Clone)]
pub enum ProbeBehavior {
    /// Helper object present with every required function.
    Full,
    /// Helper object present but missing the named functions.
    Missing(Vec<&'static str>),
    /// No helper object at all.
    Absent,
}

#[derive(Clone)]
pub enum LoadBehavior {
    /// Load succeeds and the completion event fires with this detail.
    Complete(Value),
    /// `loadSchematic` rejects synchronously with this message.
    Reject(&'static str),
    /// The completion signal never arrives; the in-page timer fires after a
    /// short delay.
    Stall,
}

#[derive(Clone)]
pub enum CaptureBehavior {
    Bytes(Vec<u8>),
    MissingCapability,
    Fail(&'static str),
}

#[derive(Clone)]
pub struct PageScript {
    pub navigate_ok: bool,
    pub probe: ProbeBehavior,
    pub ready: bool,
    pub load: LoadBehavior,
    pub screenshot: CaptureBehavior,
    pub video: CaptureBehavior,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            navigate_ok: true,
            probe: ProbeBehavior::Full,
            ready: true,
            load: LoadBehavior::Complete(json!({"meshCount": 42, "buildTimeMs": 17})),
            screenshot: CaptureBehavior::Bytes(png_bytes()),
            video: CaptureBehavior::Bytes(webm_bytes()),
        }
    }
}

impl PageScript {
    pub fn rejecting_load(message: &'static str) -> Self {
        Self {
            load: LoadBehavior::Reject(message),
            ..Self::default()
        }
    }

    pub fn stalling_load() -> Self {
        Self {
            load: LoadBehavior::Stall,
            ..Self::default()
        }
    }
}

enum PagePlan {
    Page(PageScript),
    Fail(&'static str),
}

pub struct MockHost {
    fallback: PageScript,
    plans: Mutex<VecDeque<PagePlan>>,
    created: AtomicUsize,
    closed: Arc<AtomicUsize>,
    logs: Mutex<Vec<Arc<Mutex<Vec<String>>>>>,
}

impl MockHost {
    pub fn new(fallback: PageScript) -> Self {
        Self {
            fallback,
            plans: Mutex::new(VecDeque::new()),
            created: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn healthy() -> Self {
        Self::new(PageScript::default())
    }

    /// Queue a scripted page for the next `open_page` call. Queued plans are
    /// consumed in order; afterwards the fallback script applies.
    pub fn queue_page(&self, script: PageScript) {
        self.plans.lock().unwrap().push_back(PagePlan::Page(script));
    }

    /// Queue a creation failure for the next `open_page` call.
    pub fn queue_open_failure(&self, message: &'static str) {
        self.plans.lock().unwrap().push_back(PagePlan::Fail(message));
    }

    pub fn created_pages(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed_pages(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Scripts evaluated on the n-th created page, in submission order.
    pub fn evaluated_scripts(&self, page: usize) -> Vec<String> {
        self.logs.lock().unwrap()[page].lock().unwrap().clone()
    }
}

#[async_trait]
impl PageHost for MockHost {
    async fn open_page(&self) -> Result<Box<dyn PageHandle>, PageError> {
        let plan = self.plans.lock().unwrap().pop_front();
        let script = match plan {
            Some(PagePlan::Fail(message)) => return Err(PageError::Open(message.to_string())),
            Some(PagePlan::Page(script)) => script,
            None => self.fallback.clone(),
        };

        self.created.fetch_add(1, Ordering::SeqCst);
        let log = Arc::new(Mutex::new(Vec::new()));
        self.logs.lock().unwrap().push(log.clone());

        Ok(Box::new(MockPage {
            script,
            log,
            closed: AtomicBool::new(false),
            closed_counter: self.closed.clone(),
        }))
    }
}

pub struct MockPage {
    script: PageScript,
    log: Arc<Mutex<Vec<String>>>,
    closed: AtomicBool,
    closed_counter: Arc<AtomicUsize>,
}

#[async_trait]
impl PageHandle for MockPage {
    async fn navigate(&self, _url: &str) -> Result<(), PageError> {
        if self.script.navigate_ok {
            Ok(())
        } else {
            Err(PageError::Navigation("connection refused".to_string()))
        }
    }

    async fn evaluate(&self, script: &str, _await_promise: bool) -> Result<Value, PageError> {
        self.log.lock().unwrap().push(script.to_string());

        if self.closed.load(Ordering::SeqCst) {
            return Err(PageError::Evaluation("page is closed".to_string()));
        }

        if script.contains("required.filter") {
            return Ok(match &self.script.probe {
                ProbeBehavior::Full => json!({"present": true, "missing": []}),
                ProbeBehavior::Missing(names) => json!({"present": true, "missing": names}),
                ProbeBehavior::Absent => json!({"present": false, "missing": []}),
            });
        }

        if script.contains("schematicRenderComplete") {
            return match &self.script.load {
                LoadBehavior::Complete(detail) => {
                    // Scene builds take real time; yielding here lets
                    // concurrent jobs genuinely overlap.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(detail.clone())
                }
                LoadBehavior::Reject(message) => Err(PageError::Evaluation(format!(
                    "Evaluation failed: Error: schematic-load-rejected: {message}"
                ))),
                LoadBehavior::Stall => {
                    // The in-page timer is the authoritative bound; emulate it
                    // firing after the completion signal never shows up.
                    tokio::time::sleep(Duration::from_millis(120)).await;
                    Err(PageError::Evaluation(
                        "Evaluation failed: Error: schematic-render-timeout".to_string(),
                    ))
                }
            };
        }

        if script.contains("helpers.takeScreenshot") {
            return capture_result(&self.script.screenshot, "takeScreenshot");
        }

        if script.contains("helpers.startVideoRecording") {
            return capture_result(&self.script.video, "startVideoRecording");
        }

        if script.contains("isReady() === true") {
            return Ok(Value::Bool(self.script.ready));
        }

        if script.contains("waitForReady()") {
            return Ok(Value::Bool(true));
        }

        Ok(Value::Null)
    }

    async fn close(&self) -> Result<(), PageError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn capture_result(behavior: &CaptureBehavior, capability: &str) -> Result<Value, PageError> {
    match behavior {
        CaptureBehavior::Bytes(bytes) => Ok(Value::String(BASE64.encode(bytes))),
        CaptureBehavior::MissingCapability => Err(PageError::Evaluation(format!(
            "Evaluation failed: Error: capability-missing:{capability}"
        ))),
        CaptureBehavior::Fail(message) => Err(PageError::Evaluation(message.to_string())),
    }
}
