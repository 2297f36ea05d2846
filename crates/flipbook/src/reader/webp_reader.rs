use std::io::BufReader;

use image::{DynamicImage, RgbImage, RgbaImage};
use image_webp::WebPDecoder;

use super::{open_seekable, ImageReader, MovieSource, ReadSeek, ReaderError, ReaderOptions};
use crate::types::LoopCount;

impl From<image_webp::DecodingError> for ReaderError {
    fn from(err: image_webp::DecodingError) -> Self {
        match err {
            image_webp::DecodingError::IoError(e) => e.into(),
            other => ReaderError::invalid_data(other.to_string()),
        }
    }
}

/// WebP reader for both still and animated files. Frame count is known up front
/// but the decoder can only move forward.
pub struct WebpReader {
    decoder: WebPDecoder<BufReader<Box<dyn ReadSeek>>>,
    source: MovieSource,
    options: ReaderOptions,
    width: u32,
    height: u32,
    animated: bool,
    frame_count: usize,
    frames_read: usize,
    loop_count: LoopCount,
    last_delay: i32,
    error: Option<ReaderError>,
}

impl WebpReader {
    pub fn open(source: &MovieSource) -> Result<Self, ReaderError> {
        let decoder = WebPDecoder::new(open_seekable(source)?)?;
        let (width, height) = decoder.dimensions();
        let animated = decoder.is_animated();
        let frame_count = if animated {
            decoder.num_frames() as usize
        } else {
            1
        };
        // WebP stores the total number of plays; 0 means forever
        let loop_count = if animated {
            match decoder.loop_count() {
                image_webp::LoopCount::Forever => LoopCount::Infinite,
                image_webp::LoopCount::Times(n) => LoopCount::Finite(u32::from(n.get()) - 1),
            }
        } else {
            LoopCount::Finite(0)
        };
        log::info!(
            "Opened WebP: {width}x{height}, {frame_count} frame{}, loop count {loop_count}",
            if frame_count == 1 { "" } else { "s" }
        );

        Ok(Self {
            decoder,
            source: source.clone(),
            options: ReaderOptions::default(),
            width,
            height,
            animated,
            frame_count,
            frames_read: 0,
            loop_count,
            last_delay: -1,
            error: None,
        })
    }

    /// Hand the configured background to the decoder, which fills the canvas
    /// with it and clears disposed frames to it. Takes effect before frame 0.
    fn apply_background(&mut self) {
        let Some(color) = self.options.background_color else {
            return;
        };
        if let Err(e) = self.decoder.set_background_color(color.0) {
            log::debug!("WebP background colour not applied: {e}");
        }
    }

    fn to_rgba(&self, buf: Vec<u8>) -> Result<RgbaImage, ReaderError> {
        let pixels = self.width as usize * self.height as usize;
        if buf.len() == pixels * 4 {
            RgbaImage::from_raw(self.width, self.height, buf)
        } else {
            RgbImage::from_raw(self.width, self.height, buf)
                .map(|rgb| DynamicImage::ImageRgb8(rgb).to_rgba8())
        }
        .ok_or_else(|| ReaderError::invalid_data("WebP buffer size mismatch"))
    }
}

impl ImageReader for WebpReader {
    fn can_read(&mut self) -> bool {
        self.error.is_none() && self.frames_read < self.frame_count
    }

    fn read(&mut self) -> Result<RgbaImage, ReaderError> {
        if !self.can_read() {
            return Err(ReaderError::invalid_data("no more frames"));
        }
        let Some(size) = self.decoder.output_buffer_size() else {
            return Err(ReaderError::invalid_data("WebP image too large"));
        };
        let mut buf = vec![0u8; size];

        if self.animated && self.frames_read == 0 {
            self.apply_background();
        }
        let decoded = if self.animated {
            self.decoder.read_frame(&mut buf).map(|ms| i32::try_from(ms).unwrap_or(i32::MAX))
        } else {
            self.decoder.read_image(&mut buf).map(|()| 0)
        };
        match decoded {
            Ok(delay) => {
                self.frames_read += 1;
                self.last_delay = delay;
                let image = self.to_rgba(buf)?;
                Ok(self.options.apply_clip(image))
            }
            Err(e) => {
                let err = ReaderError::from(e);
                log::warn!("WebP decode error: {err}");
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn image_count(&self) -> usize {
        self.frame_count
    }

    fn loop_count(&self) -> LoopCount {
        self.loop_count
    }

    fn next_image_delay(&self) -> i32 {
        self.last_delay
    }

    fn error(&self) -> Option<&ReaderError> {
        self.error.as_ref()
    }

    fn source(&self) -> &MovieSource {
        &self.source
    }

    fn format(&self) -> &str {
        "webp"
    }

    fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        &mut self.options
    }
}
