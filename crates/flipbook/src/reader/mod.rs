pub mod device;
#[cfg(feature = "gif")]
pub mod gif_reader;
pub mod registry;
pub mod still;
#[cfg(feature = "webp")]
pub mod webp_reader;

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::types::{LoopCount, Rect, Size};
pub use device::{MovieDevice, MovieSource, ReadSeek};
pub use registry::{DecoderRegistry, FormatTable};

/// Category of a reader failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderErrorKind {
    Unknown,
    FileNotFound,
    Device,
    UnsupportedFormat,
    InvalidData,
}

impl fmt::Display for ReaderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReaderErrorKind::Unknown => "unknown error",
            ReaderErrorKind::FileNotFound => "file not found",
            ReaderErrorKind::Device => "device error",
            ReaderErrorKind::UnsupportedFormat => "unsupported format",
            ReaderErrorKind::InvalidData => "invalid image data",
        })
    }
}

/// Error code plus human readable message reported by a reader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ReaderError {
    pub kind: ReaderErrorKind,
    pub message: String,
}

impl ReaderError {
    pub fn new(kind: ReaderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(ReaderErrorKind::InvalidData, message)
    }
}

impl From<io::Error> for ReaderError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ReaderErrorKind::FileNotFound,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                ReaderErrorKind::InvalidData
            }
            _ => ReaderErrorKind::Device,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<image::ImageError> for ReaderError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => e.into(),
            image::ImageError::Unsupported(e) => {
                Self::new(ReaderErrorKind::UnsupportedFormat, e.to_string())
            }
            other => Self::invalid_data(other.to_string()),
        }
    }
}

/// Per-session decode options a reader carries alongside its stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderOptions {
    pub background_color: Option<Rgba<u8>>,
    /// Target size; the movie resamples decoded frames that don't match.
    pub scaled_size: Option<Size>,
    /// Sub-rectangle of each frame to keep, applied at decode time.
    pub clip_rect: Option<Rect>,
}

impl ReaderOptions {
    /// Crop `image` to the clip rect, if one is set and overlaps the frame.
    pub fn apply_clip(&self, image: RgbaImage) -> RgbaImage {
        let Some(rect) = self.clip_rect else {
            return image;
        };
        match rect.clamp_to(Size::new(image.width(), image.height())) {
            Some(r) => image::imageops::crop_imm(&image, r.x, r.y, r.width, r.height).to_image(),
            None => image,
        }
    }
}

/// A single decoder bound to one byte stream.
///
/// Frames come out strictly in order through [`read`](ImageReader::read); random
/// access is best-effort via [`jump_to_image`](ImageReader::jump_to_image).
pub trait ImageReader {
    /// Whether another frame can be read. May peek at the stream.
    fn can_read(&mut self) -> bool;

    /// Decode the next frame and advance the cursor by one.
    fn read(&mut self) -> Result<RgbaImage, ReaderError>;

    /// Reposition so the next `read` returns frame `index`.
    fn jump_to_image(&mut self, _index: usize) -> bool {
        false
    }

    /// Number of frames, 0 when unknown ahead of time.
    fn image_count(&self) -> usize {
        0
    }

    fn loop_count(&self) -> LoopCount {
        LoopCount::Finite(0)
    }

    /// Display time of the frame last returned by `read`, in ms. Negative when unknown.
    fn next_image_delay(&self) -> i32;

    /// Last error hit while peeking or decoding, if any.
    fn error(&self) -> Option<&ReaderError> {
        None
    }

    fn source(&self) -> &MovieSource;

    /// Short lowercase format name (`gif`, `webp`, `png`, ...).
    fn format(&self) -> &str;

    fn options(&self) -> &ReaderOptions;

    fn options_mut(&mut self) -> &mut ReaderOptions;

    fn file_name(&self) -> Option<&Path> {
        self.source().file_name()
    }

    fn device(&self) -> Option<&MovieDevice> {
        self.source().device()
    }

    fn background_color(&self) -> Option<Rgba<u8>> {
        self.options().background_color
    }

    fn set_background_color(&mut self, color: Option<Rgba<u8>>) {
        self.options_mut().background_color = color;
    }

    fn scaled_size(&self) -> Option<Size> {
        self.options().scaled_size
    }

    fn set_scaled_size(&mut self, size: Option<Size>) {
        self.options_mut().scaled_size = size;
    }

    fn clip_rect(&self) -> Option<Rect> {
        self.options().clip_rect
    }

    fn set_clip_rect(&mut self, rect: Option<Rect>) {
        self.options_mut().clip_rect = rect;
    }
}

/// Builds readers for a source. This is the seam where format dispatch lives.
pub trait ReaderFactory {
    type Reader: ImageReader;

    fn create(
        &self,
        source: &MovieSource,
        format: Option<&str>,
    ) -> Result<Self::Reader, ReaderError>;
}

/// Open `source` as a forward-only byte stream.
pub(crate) fn open_stream(source: &MovieSource) -> Result<Box<dyn Read>, ReaderError> {
    match source {
        MovieSource::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        MovieSource::Device(device) => Ok(Box::new(device.clone())),
    }
}

/// Open `source` as a buffered, seekable stream.
pub(crate) fn open_seekable(
    source: &MovieSource,
) -> Result<BufReader<Box<dyn ReadSeek>>, ReaderError> {
    let stream: Box<dyn ReadSeek> = match source {
        MovieSource::File(path) => Box::new(File::open(path)?),
        MovieSource::Device(device) if device.is_sequential() => {
            return Err(ReaderError::new(
                ReaderErrorKind::Device,
                "decoder needs a seekable device",
            ));
        }
        MovieSource::Device(device) => Box::new(device.clone()),
    };
    Ok(BufReader::new(stream))
}
