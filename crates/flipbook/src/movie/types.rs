use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// One decoded frame, or the marker that no frame exists past this index.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    pub image: Option<Arc<RgbaImage>>,
    /// Display time in ms; `None` when the reader didn't report one.
    pub delay: Option<u32>,
    pub end_marker: bool,
}

impl FrameInfo {
    pub fn frame(image: RgbaImage, delay_ms: i32) -> Self {
        Self {
            image: Some(Arc::new(image)),
            delay: u32::try_from(delay_ms).ok(),
            end_marker: false,
        }
    }

    pub fn end_marker() -> Self {
        Self {
            image: None,
            delay: None,
            end_marker: true,
        }
    }

    /// The "could not produce a frame" value.
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        if self.end_marker {
            return true;
        }
        let has_pixels = self
            .image
            .as_ref()
            .is_some_and(|img| img.width() > 0 && img.height() > 0);
        has_pixels && self.delay.is_some()
    }
}

/// Playback lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovieState {
    #[default]
    NotRunning,
    Running,
    Paused,
}

impl fmt::Display for MovieState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MovieState::NotRunning => "not running",
            MovieState::Running => "running",
            MovieState::Paused => "paused",
        })
    }
}

/// Frame memoization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CacheMode {
    /// Decode on demand; only sequential access is cheap.
    #[default]
    None,
    /// Keep every decoded frame for instant repeat and random access.
    All,
}
