//! Animated image playback: lazy frame decoding, optional frame caching,
//! decode-time-corrected scheduling and a start/pause/stop state machine.

pub mod movie;
pub mod reader;
pub mod settings;
pub mod types;

pub use movie::{CacheMode, Movie, MovieEvent, MovieState};
pub use reader::{
    DecoderRegistry, FormatTable, ImageReader, MovieDevice, MovieSource, ReaderError,
    ReaderErrorKind, ReaderFactory,
};
pub use settings::PlaybackSettings;
pub use types::{LoopCount, Rect, Size};
