use std::fmt;

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Parse `WxH` (e.g. `320x240`).
    pub fn parse(text: &str) -> Option<Self> {
        let (w, h) = text.split_once(['x', 'X'])?;
        let size = Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?);
        (!size.is_empty()).then_some(size)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering `size`.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Intersection with a `bounds`-sized canvas, `None` if they don't overlap.
    pub fn clamp_to(&self, bounds: Size) -> Option<Rect> {
        if self.x >= bounds.width || self.y >= bounds.height {
            return None;
        }
        let width = self.width.min(bounds.width - self.x);
        let height = self.height.min(bounds.height - self.y);
        (width > 0 && height > 0).then(|| Rect::new(self.x, self.y, width, height))
    }
}

/// How many times an animation repeats after its first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopCount {
    /// Repeat forever.
    Infinite,
    /// Repeat this many extra times. `Finite(0)` plays once.
    Finite(u32),
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Finite(0)
    }
}

impl LoopCount {
    /// Legacy integer form: -1 infinite, otherwise the repeat count.
    pub fn as_i32(&self) -> i32 {
        match self {
            LoopCount::Infinite => -1,
            LoopCount::Finite(n) => i32::try_from(*n).unwrap_or(i32::MAX),
        }
    }
}

impl fmt::Display for LoopCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopCount::Infinite => f.write_str("infinite"),
            LoopCount::Finite(n) => write!(f, "{n}"),
        }
    }
}
