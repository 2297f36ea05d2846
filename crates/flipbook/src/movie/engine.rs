use std::sync::Arc;
use std::time::Instant;

use image::imageops::FilterType;
use image::RgbaImage;

use super::events::MovieEvent;
use super::source::FrameSource;
use super::timer::{Clock, FrameTimer};
use super::types::{CacheMode, FrameInfo, MovieState};
use crate::reader::{MovieSource, ReaderError, ReaderErrorKind, ReaderFactory};
use crate::types::{LoopCount, Rect, Size};

/// Playback state machine.
///
/// Every transition queues the events it produced; the owner drains them with
/// [`take_events`](Engine::take_events) after each call.
pub struct Engine<F: ReaderFactory, C: Clock> {
    pub(crate) source: FrameSource<F>,
    clock: C,
    timer: FrameTimer,
    state: MovieState,
    current_frame: Option<usize>,
    next_frame: usize,
    /// Reader-reported delay of the current frame, in ms.
    frame_delay: u32,
    /// Time spent producing the current frame, in ms.
    decode_ms: u64,
    play_counter: LoopCount,
    first_iteration: bool,
    /// Percent of normal speed. 0 freezes auto-advance.
    speed: u32,
    current_image: Option<Arc<RgbaImage>>,
    frame_rect: Rect,
    pending: Vec<MovieEvent>,
}

impl<F: ReaderFactory, C: Clock> Engine<F, C> {
    pub fn new(factory: F, clock: C) -> Self {
        Self {
            source: FrameSource::new(factory),
            clock,
            timer: FrameTimer::default(),
            state: MovieState::NotRunning,
            current_frame: None,
            next_frame: 0,
            frame_delay: 0,
            decode_ms: 0,
            play_counter: LoopCount::Infinite,
            first_iteration: true,
            speed: 100,
            current_image: None,
            frame_rect: Rect::default(),
            pending: Vec::new(),
        }
    }

    pub fn take_events(&mut self) -> Vec<MovieEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> MovieState {
        self.state
    }

    pub fn current_frame(&self) -> Option<usize> {
        self.current_frame
    }

    pub fn current_image(&self) -> Option<&Arc<RgbaImage>> {
        self.current_image.as_ref()
    }

    pub fn frame_rect(&self) -> Rect {
        self.frame_rect
    }

    /// Speed-adjusted wait after the current frame, less its decode time.
    /// 0 while speed is 0, since nothing is scheduled then.
    pub fn next_frame_delay(&self) -> u32 {
        if self.speed == 0 {
            return 0;
        }
        let delay = u64::from(self.frame_delay) * 100 / u64::from(self.speed);
        u32::try_from(delay.saturating_sub(self.decode_ms)).unwrap_or(u32::MAX)
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn next_wake(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Bind a new stream. Stops playback and resets all frame bookkeeping.
    pub fn bind(&mut self, origin: MovieSource) {
        self.stop();
        self.reset();
        self.source.bind(origin);
    }

    /// Switch cache policy. A different mode stops playback and rebinds the stream.
    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        if mode == self.source.cache_mode() {
            return;
        }
        self.stop();
        self.reset();
        self.source.set_cache_mode(mode);
    }

    fn reset(&mut self) {
        self.timer.stop();
        self.current_frame = None;
        self.next_frame = 0;
        self.frame_delay = 0;
        self.decode_ms = 0;
        self.play_counter = LoopCount::Infinite;
        self.first_iteration = true;
        self.current_image = None;
        self.frame_rect = Rect::default();
    }

    fn enter_state(&mut self, state: MovieState) {
        if self.state != state {
            self.state = state;
            self.pending.push(MovieEvent::StateChanged(state));
        }
    }

    /// True once the last pass has started. A read failure from here on ends
    /// playback as a normal finish with no error event, even when the failure
    /// is real (a failed rewind on the final pass, for one).
    fn is_done(&self) -> bool {
        self.play_counter == LoopCount::Finite(0)
    }

    fn error(&self) -> ReaderError {
        self.source
            .last_error()
            .unwrap_or_else(|| ReaderError::new(ReaderErrorKind::Unknown, "no more frames"))
    }

    /// Decode the frame at `next_frame`, wrapping around for loops.
    fn next(&mut self) -> bool {
        let started = self.clock.now();
        loop {
            let info = self.source.info_for_frame(self.next_frame, self.current_frame);
            if !info.is_valid() {
                return false;
            }
            if !info.end_marker {
                self.show(info, started);
                return true;
            }
            if self.first_iteration {
                if self.next_frame == 0 {
                    return false;
                }
                self.play_counter = self.source.loop_count();
                self.first_iteration = false;
            }
            match self.play_counter {
                LoopCount::Finite(0) => return false,
                LoopCount::Finite(n) => self.play_counter = LoopCount::Finite(n - 1),
                LoopCount::Infinite => {}
            }
            self.next_frame = 0;
        }
    }

    /// Make `info` the current frame and record how long it should stay up.
    fn show(&mut self, info: FrameInfo, started: Instant) {
        self.current_frame = Some(self.next_frame);
        self.next_frame += 1;

        let image = info.image.map(|image| match self.source.scaled_size() {
            Some(size)
                if !size.is_empty() && (image.width(), image.height()) != (size.width, size.height) =>
            {
                Arc::new(image::imageops::resize(
                    &*image,
                    size.width,
                    size.height,
                    FilterType::Triangle,
                ))
            }
            _ => image,
        });
        self.current_image = image;

        self.frame_delay = info.delay.unwrap_or(0);
        let spent = self.clock.now().saturating_duration_since(started).as_millis();
        self.decode_ms = u64::try_from(spent).unwrap_or(u64::MAX);
    }

    /// Announce the frame just shown and schedule the one after it.
    fn publish_frame(&mut self) {
        let size = self
            .current_image
            .as_ref()
            .map_or(Size::default(), |image| Size::new(image.width(), image.height()));
        if self.frame_rect.size() != size {
            self.frame_rect = Rect::from_size(size);
            self.pending.push(MovieEvent::Resized(size));
        }
        if let Some(n) = self.current_frame {
            self.pending.push(MovieEvent::FrameChanged(n));
            self.pending.push(MovieEvent::Updated(self.frame_rect));
        }
        if self.speed > 0 && self.state == MovieState::Running {
            self.timer.start(self.clock.now(), self.next_frame_delay());
        }
    }

    fn load_next_frame(&mut self, starting: bool) {
        if self.next() {
            if starting && self.state == MovieState::NotRunning {
                self.enter_state(MovieState::Running);
                self.pending.push(MovieEvent::Started);
                log::debug!("Playback started");
            }
            self.publish_frame();
            return;
        }

        if !self.is_done() {
            let err = self.error();
            log::warn!("Playback stopped on error: {err}");
            self.pending.push(MovieEvent::Error(err));
        }
        if self.state != MovieState::Paused {
            self.next_frame = 0;
            self.first_iteration = true;
            self.play_counter = LoopCount::Infinite;
            self.timer.stop();
            self.enter_state(MovieState::NotRunning);
            self.pending.push(MovieEvent::Finished);
            log::debug!("Playback finished");
        }
    }

    pub fn start(&mut self) {
        match self.state {
            MovieState::NotRunning => self.load_next_frame(true),
            MovieState::Paused => self.set_paused(false),
            MovieState::Running => {}
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if paused {
            if self.state == MovieState::NotRunning {
                return;
            }
            self.enter_state(MovieState::Paused);
            self.timer.stop();
        } else if self.state == MovieState::Paused {
            self.enter_state(MovieState::Running);
            if self.speed > 0 {
                self.timer.start(self.clock.now(), self.next_frame_delay());
            }
        }
    }

    /// Halt playback. The next start begins again at frame 0; loop bookkeeping
    /// from the current pass is kept.
    pub fn stop(&mut self) {
        if self.state == MovieState::NotRunning {
            return;
        }
        self.enter_state(MovieState::NotRunning);
        self.timer.stop();
        self.next_frame = 0;
    }

    /// Show frame `n` right away. Leaves everything untouched if it can't be produced.
    pub fn jump_to_frame(&mut self, n: usize) -> bool {
        if self.current_frame == Some(n) {
            return true;
        }
        let started = self.clock.now();
        let info = self.source.info_for_frame(n, self.current_frame);
        if !info.is_valid() || info.end_marker {
            log::debug!("Cannot jump to frame {n}");
            return false;
        }
        if self.state == MovieState::Running {
            self.timer.stop();
        }
        self.next_frame = n;
        self.show(info, started);
        self.publish_frame();
        true
    }

    /// Rescale delays. Leaving speed 0 while running schedules the frame on screen.
    pub fn set_speed(&mut self, percent: u32) {
        let resume = self.speed == 0 && percent > 0 && self.state == MovieState::Running;
        self.speed = percent;
        if resume {
            self.timer.start(self.clock.now(), self.next_frame_delay());
        }
    }

    /// Whether the stream holds at least one frame. Queues an error event when not.
    pub fn is_valid(&mut self) -> bool {
        let valid = self.source.is_valid();
        if !valid {
            let err = self.error();
            self.pending.push(MovieEvent::Error(err));
        }
        valid
    }

    /// Fire the frame timer if it is due. Returns true if it fired.
    pub fn poll(&mut self) -> bool {
        if !self.timer.fire_if_due(self.clock.now()) {
            return false;
        }
        self.load_next_frame(false);
        true
    }
}
