use image::Rgba;

use super::types::{CacheMode, FrameInfo};
use crate::reader::{
    ImageReader, MovieDevice, MovieSource, ReaderError, ReaderErrorKind, ReaderFactory,
    ReaderOptions,
};
use crate::types::{LoopCount, Rect, Size};

/// Resolves frame indices to decoded frames, either straight from the reader or
/// through the cache-all frame list.
///
/// Owns the bound reader. In `CacheMode::None` the reader's cursor sits one
/// frame past the frame last handed out; any other access goes through
/// `jump_to_image` or a rebuild of the reader.
pub struct FrameSource<F: ReaderFactory> {
    factory: F,
    origin: Option<MovieSource>,
    format: Option<String>,
    reader: Option<F::Reader>,
    initial_device_pos: u64,
    /// Options handed to every freshly bound reader.
    options: ReaderOptions,
    cache_mode: CacheMode,
    frames: Vec<FrameInfo>,
    greatest_frame: Option<usize>,
    have_read_all: bool,
    first_frame_failed: bool,
    last_error: Option<ReaderError>,
}

impl<F: ReaderFactory> FrameSource<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            origin: None,
            format: None,
            reader: None,
            initial_device_pos: 0,
            options: ReaderOptions::default(),
            cache_mode: CacheMode::None,
            frames: Vec::new(),
            greatest_frame: None,
            have_read_all: false,
            first_frame_failed: false,
            last_error: None,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Bind a new stream, discarding every bit of decode state.
    pub fn bind(&mut self, origin: MovieSource) {
        self.origin = Some(origin);
        self.reopen();
    }

    /// Recreate the reader for the current origin and forget all decoded frames.
    pub fn reopen(&mut self) {
        self.reader = None;
        self.frames.clear();
        self.greatest_frame = None;
        self.have_read_all = false;
        self.first_frame_failed = false;
        self.last_error = None;
        self.initial_device_pos = 0;

        let Some(origin) = self.origin.clone() else {
            return;
        };
        if let Some(device) = origin.device() {
            match device.position() {
                Ok(pos) => self.initial_device_pos = pos,
                Err(e) => log::warn!("Could not query device position: {e}"),
            }
        }
        match self.factory.create(&origin, self.format.as_deref()) {
            Ok(mut reader) => {
                *reader.options_mut() = self.options.clone();
                log::info!("Bound {} reader", reader.format());
                self.reader = Some(reader);
            }
            Err(e) => {
                log::warn!("Could not create reader: {e}");
                self.last_error = Some(e);
            }
        }
    }

    pub fn origin(&self) -> Option<&MovieSource> {
        self.origin.as_ref()
    }

    pub fn reader(&self) -> Option<&F::Reader> {
        self.reader.as_ref()
    }

    /// Format hint for the next reader. Applied right away while nothing has
    /// been decoded from the current stream.
    pub fn set_format(&mut self, format: Option<String>) {
        self.format = format;
        if self.origin.is_some() && self.greatest_frame.is_none() {
            self.reopen();
        }
    }

    /// Format of the bound reader, or the configured hint when unbound.
    pub fn format(&self) -> Option<&str> {
        self.reader
            .as_ref()
            .map(ImageReader::format)
            .or(self.format.as_deref())
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Switch cache policy. Returns true when the stream had to be rebound.
    pub fn set_cache_mode(&mut self, mode: CacheMode) -> bool {
        if mode == self.cache_mode {
            return false;
        }
        self.cache_mode = mode;
        if self.origin.is_some() {
            self.reopen();
        }
        true
    }

    pub fn background_color(&self) -> Option<Rgba<u8>> {
        self.options.background_color
    }

    pub fn set_background_color(&mut self, color: Option<Rgba<u8>>) {
        self.options.background_color = color;
        if let Some(reader) = self.reader.as_mut() {
            reader.set_background_color(color);
        }
    }

    pub fn scaled_size(&self) -> Option<Size> {
        self.reader
            .as_ref()
            .map_or(self.options.scaled_size, ImageReader::scaled_size)
    }

    pub fn set_scaled_size(&mut self, size: Option<Size>) {
        self.options.scaled_size = size;
        if let Some(reader) = self.reader.as_mut() {
            reader.set_scaled_size(size);
        }
    }

    /// Clip rect of the live reader. A rebuilt reader reports `None`.
    pub fn clip_rect(&self) -> Option<Rect> {
        self.reader
            .as_ref()
            .map_or(self.options.clip_rect, ImageReader::clip_rect)
    }

    pub fn set_clip_rect(&mut self, rect: Option<Rect>) {
        self.options.clip_rect = rect;
        if let Some(reader) = self.reader.as_mut() {
            reader.set_clip_rect(rect);
        }
    }

    pub fn greatest_frame(&self) -> Option<usize> {
        self.greatest_frame
    }

    pub fn loop_count(&self) -> LoopCount {
        self.reader
            .as_ref()
            .map_or(LoopCount::Finite(0), ImageReader::loop_count)
    }

    pub fn image_count(&self) -> usize {
        self.reader.as_ref().map_or(0, ImageReader::image_count)
    }

    /// Whether the stream has produced, or can still produce, a frame.
    pub fn is_valid(&mut self) -> bool {
        if self.greatest_frame.is_some() {
            return true;
        }
        if self.first_frame_failed {
            return false;
        }
        self.reader.as_mut().is_some_and(ImageReader::can_read)
    }

    /// Most recent reader failure, if any.
    pub fn last_error(&self) -> Option<ReaderError> {
        self.reader
            .as_ref()
            .and_then(|r| r.error().cloned())
            .or_else(|| self.last_error.clone())
    }

    /// Produce frame `n`, given that `current` is the frame on screen.
    pub fn info_for_frame(&mut self, n: usize, current: Option<usize>) -> FrameInfo {
        let unseen = self.greatest_frame.map_or(0, |g| g + 1);
        if self.have_read_all && n >= unseen {
            // Anything more than one step past the known end is a bad jump
            return if n == unseen {
                FrameInfo::end_marker()
            } else {
                FrameInfo::invalid()
            };
        }
        match self.cache_mode {
            CacheMode::None => self.uncached_frame(n, current),
            CacheMode::All => self.cached_frame(n),
        }
    }

    fn uncached_frame(&mut self, n: usize, current: Option<usize>) -> FrameInfo {
        let sequential = current.map_or(0, |c| c + 1) == n;
        if !sequential {
            let jumped = self.reader.as_mut().is_some_and(|r| r.jump_to_image(n));
            if !jumped && (n != 0 || !self.rewind()) {
                return FrameInfo::invalid();
            }
        }
        let Some(reader) = self.reader.as_mut() else {
            return FrameInfo::invalid();
        };
        if !reader.can_read() {
            if n == 0 {
                // Zero readable frames
                self.first_frame_failed = true;
                return FrameInfo::invalid();
            }
            self.have_read_all = true;
            return FrameInfo::end_marker();
        }
        match self.decode(n) {
            Some(info) => {
                if self.greatest_frame.is_none_or(|g| n > g) {
                    self.greatest_frame = Some(n);
                }
                info
            }
            None => FrameInfo::invalid(),
        }
    }

    fn cached_frame(&mut self, n: usize) -> FrameInfo {
        while self.frames.len() <= n {
            let index = self.frames.len();
            let Some(reader) = self.reader.as_mut() else {
                return FrameInfo::invalid();
            };
            if !reader.can_read() {
                self.have_read_all = true;
                return FrameInfo::end_marker();
            }
            let Some(info) = self.decode(index) else {
                return FrameInfo::invalid();
            };
            self.frames.push(info);
            self.greatest_frame = Some(index);
        }
        self.frames[n].clone()
    }

    /// Read one frame off the reader. `index` is only used for bookkeeping.
    fn decode(&mut self, index: usize) -> Option<FrameInfo> {
        let reader = self.reader.as_mut()?;
        match reader.read() {
            Ok(image) if image.width() > 0 && image.height() > 0 => {
                Some(FrameInfo::frame(image, reader.next_image_delay()))
            }
            Ok(_) => {
                log::warn!("Reader returned an empty image for frame {index}");
                if index == 0 {
                    self.first_frame_failed = true;
                }
                None
            }
            Err(e) => {
                log::warn!("Failed to decode frame {index}: {e}");
                if index == 0 {
                    self.first_frame_failed = true;
                }
                self.last_error = Some(e);
                None
            }
        }
    }

    /// Rebuild the reader so the next read returns frame 0.
    ///
    /// Only the background colour and scaled size survive; the clip rect and any
    /// other reader state are lost.
    fn rewind(&mut self) -> bool {
        let sequential = self
            .reader
            .as_ref()
            .and_then(ImageReader::device)
            .is_some_and(MovieDevice::is_sequential);
        if sequential {
            self.last_error = Some(ReaderError::new(
                ReaderErrorKind::Device,
                "cannot rewind a sequential device",
            ));
            return false;
        }
        let Some(old) = self.reader.take() else {
            return false;
        };
        let source = old.source().clone();
        let format = old.format().to_string();
        let background = old.background_color();
        let scaled = old.scaled_size();
        let dropped_clip = old.clip_rect();
        drop(old);

        if let Some(device) = source.device() {
            if let Err(e) = device.seek_to(self.initial_device_pos) {
                log::warn!("Could not seek device back for rewind: {e}");
                self.last_error = Some(e.into());
                return false;
            }
        }
        match self.factory.create(&source, Some(&format)) {
            Ok(mut reader) => {
                reader.set_background_color(background);
                reader.set_scaled_size(scaled);
                log::info!("Rewound {format} stream by rebuilding its reader");
                if let Some(rect) = dropped_clip {
                    log::debug!("Clip rect {rect:?} not carried over to rebuilt reader");
                }
                self.reader = Some(reader);
                true
            }
            Err(e) => {
                log::warn!("Could not rebuild reader: {e}");
                self.last_error = Some(e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movie::testing::MockFactory;
    use std::io::Cursor;

    fn bound(factory: MockFactory) -> FrameSource<MockFactory> {
        let mut source = FrameSource::new(factory);
        source.bind(MovieSource::File("clip.mock".into()));
        source
    }

    #[test]
    fn sequential_reads_then_end_marker() {
        let mut source = bound(MockFactory::new(&[10, 20]));
        assert!(source.info_for_frame(0, None).is_valid());
        assert_eq!(source.info_for_frame(1, Some(0)).delay, Some(20));
        assert!(source.info_for_frame(2, Some(1)).end_marker);
        assert_eq!(source.greatest_frame(), Some(1));

        // Past the known end by more than one is never a frame
        assert!(!source.info_for_frame(4, Some(1)).is_valid());
        assert!(source.info_for_frame(2, Some(1)).end_marker);
    }

    #[test]
    fn random_access_needs_a_seekable_reader() {
        let factory = MockFactory::new(&[10, 10, 10, 10]);
        let stats = factory.stats();
        let mut source = bound(factory);
        source.info_for_frame(0, None);
        assert!(!source.info_for_frame(3, Some(0)).is_valid());
        assert_eq!(stats.reads(), vec![0]);

        let factory = MockFactory::new(&[10, 10, 10, 10]).seekable();
        let stats = factory.stats();
        let mut source = bound(factory);
        source.info_for_frame(0, None);
        assert!(source.info_for_frame(3, Some(0)).is_valid());
        assert_eq!(stats.reads(), vec![0, 3]);
        assert_eq!(stats.opens(), 1);
    }

    #[test]
    fn rewind_rebuilds_reader_keeping_only_some_options() {
        let factory = MockFactory::new(&[10, 10, 10]);
        let stats = factory.stats();
        let mut source = bound(factory);
        source.set_background_color(Some(Rgba([1, 2, 3, 255])));
        source.set_scaled_size(Some(Size::new(2, 2)));
        source.set_clip_rect(Some(Rect::new(0, 0, 1, 1)));

        source.info_for_frame(0, None);
        source.info_for_frame(1, Some(0));
        assert!(source.info_for_frame(0, Some(1)).is_valid());
        assert_eq!(stats.opens(), 2);
        assert_eq!(stats.reads(), vec![0, 1, 0]);

        let reader = source.reader().unwrap();
        assert_eq!(reader.background_color(), Some(Rgba([1, 2, 3, 255])));
        assert_eq!(reader.scaled_size(), Some(Size::new(2, 2)));
        assert_eq!(reader.clip_rect(), None);
    }

    #[test]
    fn rewind_restores_device_position() {
        let device = MovieDevice::from_bytes(vec![0u8; 64]);
        device.seek_to(8).unwrap();
        let mut source = FrameSource::new(MockFactory::new(&[10, 10]));
        source.bind(MovieSource::Device(device.clone()));

        source.info_for_frame(0, None);
        device.seek_to(40).unwrap();
        assert!(source.info_for_frame(0, Some(0)).is_valid());
        assert_eq!(device.position().unwrap(), 8);
    }

    #[test]
    fn sequential_device_cannot_rewind() {
        let device = MovieDevice::sequential(Cursor::new(vec![0u8; 8]));
        let factory = MockFactory::new(&[10, 10]);
        let stats = factory.stats();
        let mut source = FrameSource::new(factory);
        source.bind(MovieSource::Device(device));

        source.info_for_frame(0, None);
        assert!(!source.info_for_frame(0, Some(0)).is_valid());
        assert_eq!(stats.opens(), 1);
    }

    #[test]
    fn cache_all_decodes_each_frame_once() {
        let factory = MockFactory::new(&[10, 20, 30]);
        let stats = factory.stats();
        let mut source = FrameSource::new(factory);
        source.set_cache_mode(CacheMode::All);
        source.bind(MovieSource::File("clip.mock".into()));

        assert_eq!(source.info_for_frame(2, None).delay, Some(30));
        assert_eq!(source.info_for_frame(2, Some(2)).delay, Some(30));
        assert_eq!(source.info_for_frame(0, Some(2)).delay, Some(10));
        assert_eq!(stats.reads(), vec![0, 1, 2]);
        assert!(source.info_for_frame(3, Some(2)).end_marker);
    }

    #[test]
    fn first_frame_failure_makes_stream_invalid() {
        let factory = MockFactory::new(&[10, 10]).fail_at(0);
        let mut source = bound(factory);
        assert!(source.is_valid());
        assert!(!source.info_for_frame(0, None).is_valid());
        assert!(!source.is_valid());
        assert_eq!(source.last_error().unwrap().kind, ReaderErrorKind::InvalidData);
    }

    #[test]
    fn empty_stream_is_invalid_not_ended() {
        let mut source = bound(MockFactory::new(&[]));
        assert!(!source.is_valid());
        let info = source.info_for_frame(0, None);
        assert!(!info.is_valid());
        assert!(!info.end_marker);
    }

    #[test]
    fn failed_open_is_remembered() {
        let mut source = bound(MockFactory::new(&[10]).fail_open());
        assert!(source.reader().is_none());
        assert!(!source.is_valid());
        assert_eq!(source.last_error().unwrap().kind, ReaderErrorKind::FileNotFound);
    }

    #[test]
    fn format_hint_reopens_only_before_decoding() {
        let factory = MockFactory::new(&[10, 10]);
        let stats = factory.stats();
        let mut source = bound(factory);
        source.set_format(Some("gif".into()));
        assert_eq!(stats.opens(), 2);
        assert_eq!(stats.last_format().as_deref(), Some("gif"));

        source.info_for_frame(0, None);
        source.set_format(Some("webp".into()));
        assert_eq!(stats.opens(), 2);
    }
}
