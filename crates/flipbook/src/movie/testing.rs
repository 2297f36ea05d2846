//! Scripted reader, factory and clock for driving the engine in tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};

use super::timer::Clock;
use crate::reader::{
    ImageReader, MovieSource, ReaderError, ReaderErrorKind, ReaderFactory, ReaderOptions,
};
use crate::types::LoopCount;

/// Clock that only moves when told to. `sleep` advances it.
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    pub fn set(&self, to: Instant) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Counters shared between a factory, its readers and the test.
#[derive(Default)]
pub(crate) struct Stats {
    opens: Cell<usize>,
    reads: RefCell<Vec<usize>>,
    last_format: RefCell<Option<String>>,
}

impl Stats {
    pub fn opens(&self) -> usize {
        self.opens.get()
    }

    /// Frame index of every `read` call, in order.
    pub fn reads(&self) -> Vec<usize> {
        self.reads.borrow().clone()
    }

    pub fn last_format(&self) -> Option<String> {
        self.last_format.borrow().clone()
    }
}

#[derive(Clone)]
struct Script {
    sizes: Vec<(u32, u32)>,
    delays: Vec<i32>,
    loop_count: LoopCount,
    seekable: bool,
    fail_at: Option<usize>,
    cost: Option<(ManualClock, Duration)>,
}

pub(crate) struct MockFactory {
    script: Script,
    fail_open: bool,
    stats: Rc<Stats>,
}

impl MockFactory {
    /// One 4x4 frame per delay, no looping, not seekable.
    pub fn new(delays: &[i32]) -> Self {
        Self {
            script: Script {
                sizes: vec![(4, 4); delays.len()],
                delays: delays.to_vec(),
                loop_count: LoopCount::Finite(0),
                seekable: false,
                fail_at: None,
                cost: None,
            },
            fail_open: false,
            stats: Rc::new(Stats::default()),
        }
    }

    pub fn loop_count(mut self, count: LoopCount) -> Self {
        self.script.loop_count = count;
        self
    }

    pub fn seekable(mut self) -> Self {
        self.script.seekable = true;
        self
    }

    /// Make `read` fail on frame `index`.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.script.fail_at = Some(index);
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn sizes(mut self, sizes: &[(u32, u32)]) -> Self {
        self.script.sizes = sizes.to_vec();
        self
    }

    /// Every `read` advances `clock` by `ms`.
    pub fn decode_cost(mut self, clock: &ManualClock, ms: u64) -> Self {
        self.script.cost = Some((clock.clone(), Duration::from_millis(ms)));
        self
    }

    pub fn stats(&self) -> Rc<Stats> {
        Rc::clone(&self.stats)
    }
}

impl ReaderFactory for MockFactory {
    type Reader = MockReader;

    fn create(&self, source: &MovieSource, format: Option<&str>) -> Result<MockReader, ReaderError> {
        if self.fail_open {
            return Err(ReaderError::new(ReaderErrorKind::FileNotFound, "no such clip"));
        }
        self.stats.opens.set(self.stats.opens.get() + 1);
        *self.stats.last_format.borrow_mut() = format.map(str::to_string);
        Ok(MockReader {
            script: self.script.clone(),
            stats: Rc::clone(&self.stats),
            source: source.clone(),
            format: format.unwrap_or("mock").to_string(),
            options: ReaderOptions::default(),
            cursor: 0,
            last_delay: -1,
            error: None,
        })
    }
}

pub(crate) struct MockReader {
    script: Script,
    stats: Rc<Stats>,
    source: MovieSource,
    format: String,
    options: ReaderOptions,
    cursor: usize,
    last_delay: i32,
    error: Option<ReaderError>,
}

impl ImageReader for MockReader {
    fn can_read(&mut self) -> bool {
        self.cursor < self.script.delays.len()
    }

    fn read(&mut self) -> Result<RgbaImage, ReaderError> {
        let index = self.cursor;
        self.stats.reads.borrow_mut().push(index);
        if let Some((clock, cost)) = &self.script.cost {
            clock.advance(*cost);
        }
        if self.script.fail_at == Some(index) || index >= self.script.delays.len() {
            let err = ReaderError::invalid_data(format!("scripted failure at frame {index}"));
            self.error = Some(err.clone());
            return Err(err);
        }
        let (w, h) = self.script.sizes.get(index).copied().unwrap_or((4, 4));
        self.last_delay = self.script.delays[index];
        self.cursor += 1;
        Ok(RgbaImage::from_pixel(w, h, Rgba([index as u8, 0, 0, 255])))
    }

    fn jump_to_image(&mut self, index: usize) -> bool {
        if self.script.seekable && index < self.script.delays.len() {
            self.cursor = index;
            true
        } else {
            false
        }
    }

    fn image_count(&self) -> usize {
        if self.script.seekable {
            self.script.delays.len()
        } else {
            0
        }
    }

    fn loop_count(&self) -> LoopCount {
        self.script.loop_count
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
        &self.format
    }

    fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        &mut self.options
    }
}
