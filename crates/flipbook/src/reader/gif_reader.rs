use std::io::Read;

use gif::{DisposalMethod, Repeat};
use image::{Rgba, RgbaImage};

use super::{open_stream, ImageReader, MovieSource, ReaderError, ReaderOptions};
use crate::types::LoopCount;

/// Minimum delay in ms; many GIFs declare 0 and expect the viewer to pick a sane rate.
const MIN_FRAME_DELAY_MS: i32 = 20;

impl From<gif::DecodingError> for ReaderError {
    fn from(err: gif::DecodingError) -> Self {
        match err {
            gif::DecodingError::Io(e) => e.into(),
            other => ReaderError::invalid_data(other.to_string()),
        }
    }
}

/// Geometry and timing of the frame the decoder is positioned on.
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
    delay_cs: u16,
    dispose: DisposalMethod,
}

impl FrameHeader {
    fn from_frame(frame: &gif::Frame<'_>) -> Self {
        Self {
            left: u32::from(frame.left),
            top: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
            delay_cs: frame.delay,
            dispose: frame.dispose,
        }
    }
}

/// Streaming GIF reader. Frames are composited onto a full-size canvas so every
/// frame handed out is a complete picture.
pub struct GifReader {
    decoder: gif::Decoder<Box<dyn Read>>,
    source: MovieSource,
    options: ReaderOptions,
    canvas: RgbaImage,
    /// Canvas to restore after a `Previous`-disposed frame.
    saved: Option<RgbaImage>,
    /// Disposal owed by the frame last drawn.
    pending_dispose: Option<FrameHeader>,
    /// Header of a frame peeked by `can_read` but not yet decoded.
    peeked: Option<FrameHeader>,
    loop_count: LoopCount,
    last_delay: i32,
    exhausted: bool,
    error: Option<ReaderError>,
}

impl GifReader {
    pub fn open(source: &MovieSource) -> Result<Self, ReaderError> {
        let stream = open_stream(source)?;
        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let decoder = options.read_info(stream)?;

        let width = u32::from(decoder.width());
        let height = u32::from(decoder.height());
        let loop_count = match decoder.repeat() {
            Repeat::Infinite => LoopCount::Infinite,
            Repeat::Finite(n) => LoopCount::Finite(u32::from(n)),
        };
        log::info!("Opened GIF: {width}x{height}, loop count {loop_count}");

        Ok(Self {
            decoder,
            source: source.clone(),
            options: ReaderOptions::default(),
            canvas: RgbaImage::new(width, height),
            saved: None,
            pending_dispose: None,
            peeked: None,
            loop_count,
            last_delay: -1,
            exhausted: false,
            error: None,
        })
    }

    fn background(&self) -> Rgba<u8> {
        self.options.background_color.unwrap_or(Rgba([0, 0, 0, 0]))
    }

    /// Undo the previous frame according to its disposal method.
    fn dispose_previous(&mut self) {
        let Some(header) = self.pending_dispose.take() else {
            return;
        };
        match header.dispose {
            DisposalMethod::Background => {
                let fill = self.background();
                let (cw, ch) = self.canvas.dimensions();
                for y in header.top..(header.top + header.height).min(ch) {
                    for x in header.left..(header.left + header.width).min(cw) {
                        self.canvas.put_pixel(x, y, fill);
                    }
                }
            }
            DisposalMethod::Previous => {
                if let Some(saved) = self.saved.take() {
                    self.canvas = saved;
                }
            }
            DisposalMethod::Any | DisposalMethod::Keep => {}
        }
    }

    /// Composite a decoded RGBA sub-frame onto the canvas at its offset.
    fn blit(&mut self, header: &FrameHeader, pixels: &[u8]) {
        let (cw, ch) = self.canvas.dimensions();
        for y in 0..header.height {
            for x in 0..header.width {
                let src_idx = ((y * header.width + x) * 4) as usize;
                let Some(src) = pixels.get(src_idx..src_idx + 4) else {
                    return;
                };
                let dst_x = header.left + x;
                let dst_y = header.top + y;
                // Fully transparent pixels leave the canvas untouched
                if dst_x < cw && dst_y < ch && src[3] > 0 {
                    self.canvas.put_pixel(dst_x, dst_y, Rgba([src[0], src[1], src[2], src[3]]));
                }
            }
        }
    }

    fn fail(&mut self, err: ReaderError) -> ReaderError {
        log::warn!("GIF decode error: {err}");
        self.exhausted = true;
        self.error = Some(err.clone());
        err
    }
}

impl ImageReader for GifReader {
    fn can_read(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        if self.exhausted {
            return false;
        }
        match self.decoder.next_frame_info() {
            Ok(Some(frame)) => {
                self.peeked = Some(FrameHeader::from_frame(frame));
                true
            }
            Ok(None) => {
                self.exhausted = true;
                false
            }
            Err(e) => {
                self.fail(e.into());
                false
            }
        }
    }

    fn read(&mut self) -> Result<RgbaImage, ReaderError> {
        if !self.can_read() {
            return Err(self
                .error
                .clone()
                .unwrap_or_else(|| ReaderError::invalid_data("no more frames")));
        }
        let Some(header) = self.peeked.take() else {
            return Err(ReaderError::invalid_data("no frame header"));
        };

        let mut pixels = vec![0u8; self.decoder.buffer_size()];
        if let Err(e) = self.decoder.read_into_buffer(&mut pixels) {
            return Err(self.fail(e.into()));
        }

        self.dispose_previous();
        if header.dispose == DisposalMethod::Previous {
            self.saved = Some(self.canvas.clone());
        }
        self.blit(&header, &pixels);
        self.pending_dispose = Some(header);

        // GIF delay is in centiseconds
        self.last_delay = (i32::from(header.delay_cs) * 10).max(MIN_FRAME_DELAY_MS);
        Ok(self.options.apply_clip(self.canvas.clone()))
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
        "gif"
    }

    fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        &mut self.options
    }
}

/// Encode a small GIF in memory. Shared by tests across the crate.
#[cfg(test)]
pub(crate) fn encode_test_gif(
    colors: &[[u8; 4]],
    delays_cs: &[u16],
    repeat: Option<Repeat>,
) -> Vec<u8> {
    let (w, h) = (4u16, 3u16);
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, w, h, &[]).unwrap();
        if let Some(repeat) = repeat {
            encoder.set_repeat(repeat).unwrap();
        }
        for (color, delay) in colors.iter().zip(delays_cs) {
            let mut rgba: Vec<u8> = color.repeat(usize::from(w) * usize::from(h));
            let mut frame = gif::Frame::from_rgba_speed(w, h, &mut rgba, 10);
            frame.delay = *delay;
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}
