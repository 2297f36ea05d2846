pub mod engine;
pub mod events;
pub mod source;
#[cfg(test)]
pub(crate) mod testing;
pub mod timer;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use image::{Rgba, RgbaImage};

use crate::reader::{
    DecoderRegistry, MovieDevice, MovieSource, ReaderError, ReaderFactory,
};
use crate::settings::PlaybackSettings;
use crate::types::{LoopCount, Rect, Size};
use engine::Engine;
pub use events::{EventBus, MovieEvent};
pub use timer::{Clock, SystemClock};
pub use types::{CacheMode, FrameInfo, MovieState};

/// An animated image being played back.
///
/// Single-threaded and host driven: call [`poll`](Movie::poll) whenever
/// [`next_wake`](Movie::next_wake) has passed, or hand the thread to
/// [`run`](Movie::run). Events reach every receiver from
/// [`subscribe`](Movie::subscribe) in the order they happened.
pub struct Movie<F: ReaderFactory = DecoderRegistry, C: Clock = SystemClock> {
    engine: Engine<F, C>,
    bus: EventBus,
}

impl Movie {
    /// Movie with the built-in decoders and no stream bound yet.
    pub fn new() -> Self {
        Self::with_factory(DecoderRegistry::default(), SystemClock)
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut movie = Self::new();
        movie.set_file_name(path);
        movie
    }

    pub fn from_device(device: MovieDevice, format: Option<&str>) -> Self {
        let mut movie = Self::new();
        movie.engine.source.set_format(format.map(str::to_string));
        movie.set_device(device);
        movie
    }

    /// Movie configured from persisted settings, including the format table.
    pub fn from_settings(settings: &PlaybackSettings) -> Self {
        let registry = DecoderRegistry::new(settings.formats.clone());
        let mut movie = Self::with_factory(registry, SystemClock);
        movie.apply_settings(settings);
        movie
    }
}

impl Default for Movie {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ReaderFactory, C: Clock> Movie<F, C> {
    pub fn with_factory(factory: F, clock: C) -> Self {
        Self {
            engine: Engine::new(factory, clock),
            bus: EventBus::default(),
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<MovieEvent> {
        self.bus.subscribe()
    }

    fn flush(&mut self) {
        let events = self.engine.take_events();
        self.bus.publish(events);
    }

    pub fn factory(&self) -> &F {
        self.engine.source.factory()
    }

    // Source binding

    pub fn set_file_name(&mut self, path: impl Into<PathBuf>) {
        self.set_source(MovieSource::File(path.into()));
    }

    pub fn set_device(&mut self, device: MovieDevice) {
        self.set_source(MovieSource::Device(device));
    }

    /// Bind a new stream. Stops playback if running.
    pub fn set_source(&mut self, source: MovieSource) {
        self.engine.bind(source);
        self.flush();
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.engine.source.origin().and_then(MovieSource::file_name)
    }

    pub fn device(&self) -> Option<&MovieDevice> {
        self.engine.source.origin().and_then(MovieSource::device)
    }

    pub fn set_format(&mut self, format: Option<&str>) {
        self.engine.source.set_format(format.map(str::to_string));
    }

    pub fn format(&self) -> Option<&str> {
        self.engine.source.format()
    }

    // Reader options

    pub fn set_background_color(&mut self, color: Option<Rgba<u8>>) {
        self.engine.source.set_background_color(color);
    }

    pub fn background_color(&self) -> Option<Rgba<u8>> {
        self.engine.source.background_color()
    }

    pub fn set_scaled_size(&mut self, size: Option<Size>) {
        self.engine.source.set_scaled_size(size);
    }

    pub fn scaled_size(&self) -> Option<Size> {
        self.engine.source.scaled_size()
    }

    pub fn set_clip_rect(&mut self, rect: Option<Rect>) {
        self.engine.source.set_clip_rect(rect);
    }

    pub fn clip_rect(&self) -> Option<Rect> {
        self.engine.source.clip_rect()
    }

    /// Change the cache policy. A different mode stops playback and rebinds the stream.
    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        self.engine.set_cache_mode(mode);
        self.flush();
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.engine.source.cache_mode()
    }

    pub fn set_speed(&mut self, percent: u32) {
        self.engine.set_speed(percent);
    }

    pub fn speed(&self) -> u32 {
        self.engine.speed()
    }

    pub fn apply_settings(&mut self, settings: &PlaybackSettings) {
        self.set_speed(settings.speed);
        self.set_cache_mode(settings.cache_mode);
        self.set_background_color(settings.background_color.map(Rgba));
        self.set_scaled_size(settings.scaled_size);
    }

    // Queries

    pub fn state(&self) -> MovieState {
        self.engine.state()
    }

    pub fn frame_rect(&self) -> Rect {
        self.engine.frame_rect()
    }

    pub fn current_image(&self) -> Option<&Arc<RgbaImage>> {
        self.engine.current_image()
    }

    /// Whether the stream has at least one decodable frame. Publishes an error
    /// event when it doesn't.
    pub fn is_valid(&mut self) -> bool {
        let valid = self.engine.is_valid();
        self.flush();
        valid
    }

    pub fn last_error(&self) -> Option<ReaderError> {
        self.engine.source.last_error()
    }

    pub fn loop_count(&self) -> LoopCount {
        self.engine.source.loop_count()
    }

    /// Number of frames, 0 when the reader can't tell ahead of time.
    pub fn frame_count(&self) -> usize {
        self.engine.source.image_count()
    }

    /// Milliseconds until the next frame, speed and decode time accounted for.
    pub fn next_frame_delay(&self) -> u32 {
        self.engine.next_frame_delay()
    }

    pub fn current_frame_number(&self) -> Option<usize> {
        self.engine.current_frame()
    }

    // Commands

    pub fn start(&mut self) {
        self.engine.start();
        self.flush();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.engine.set_paused(paused);
        self.flush();
    }

    pub fn stop(&mut self) {
        self.engine.stop();
        self.flush();
    }

    /// Show frame `n` now. False if the frame can't be produced, in which case
    /// nothing changes.
    pub fn jump_to_frame(&mut self, n: usize) -> bool {
        let jumped = self.engine.jump_to_frame(n);
        self.flush();
        jumped
    }

    pub fn jump_to_next_frame(&mut self) -> bool {
        let n = self.engine.current_frame().map_or(0, |c| c + 1);
        self.jump_to_frame(n)
    }

    // Driving

    /// When the pending frame is due, if one is scheduled.
    pub fn next_wake(&self) -> Option<Instant> {
        self.engine.next_wake()
    }

    /// Advance playback if the frame timer has expired. Returns true if it fired.
    pub fn poll(&mut self) -> bool {
        let fired = self.engine.poll();
        self.flush();
        fired
    }

    /// Block, sleeping between frames, until nothing is scheduled.
    ///
    /// Returns on finish, stop or pause. Never returns for an infinitely looping
    /// movie.
    pub fn run(&mut self) {
        while let Some(deadline) = self.next_wake() {
            let clock = self.engine.clock();
            let now = clock.now();
            if deadline > now {
                clock.sleep(deadline - now);
            }
            self.poll();
        }
    }
}
