use serde::{Deserialize, Serialize};

/// Capture format for still-frame renders, named by MIME type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ImageFormat {
    #[default]
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Options for a single still-frame capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// JPEG encoding quality in `0.0..=1.0`; the front end ignores it for PNG.
    pub quality: f64,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            format: ImageFormat::Png,
            quality: 0.95,
        }
    }
}

/// Options for a rotating-view video capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoOptions {
    /// Length of the recording in seconds.
    pub duration: u32,
    pub width: u32,
    pub height: u32,
    /// Serialized as `frameRate`: the name the front end's recording
    /// capability expects.
    #[serde(rename = "frameRate", alias = "frame_rate")]
    pub frame_rate: u32,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            duration: 5,
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

/// Metadata the front end emits with its render-complete event.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadReport {
    pub mesh_count: u64,
    pub build_time_ms: u64,
}

impl Default for LoadReport {
    fn default() -> Self {
        Self {
            mesh_count: 0,
            build_time_ms: 0,
        }
    }
}
