use std::io::{self, Read};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

#[cfg(feature = "gif")]
use super::gif_reader::GifReader;
use super::still::StillReader;
#[cfg(feature = "webp")]
use super::webp_reader::WebpReader;
use super::{
    ImageReader, MovieSource, ReaderError, ReaderErrorKind, ReaderFactory, ReaderOptions,
};
use crate::types::LoopCount;

/// Bytes read from the head of a stream to sniff its format.
const SNIFF_LEN: usize = 32;

/// One known image format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatEntry {
    pub name: String,
    pub extensions: Vec<String>,
    /// Whether files of this format can hold more than one frame.
    #[serde(default)]
    pub animated: bool,
}

impl FormatEntry {
    fn new(name: &str, extensions: &[&str], animated: bool) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| (*e).to_string()).collect(),
            animated,
        }
    }
}

/// Format capabilities handed to the registry. Persisted with the settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatTable {
    pub entries: Vec<FormatEntry>,
}

impl Default for FormatTable {
    fn default() -> Self {
        Self {
            entries: vec![
                FormatEntry::new("gif", &["gif"], true),
                FormatEntry::new("webp", &["webp"], true),
                FormatEntry::new("png", &["png", "apng"], false),
                FormatEntry::new("jpeg", &["jpg", "jpeg", "jpe"], false),
                FormatEntry::new("bmp", &["bmp"], false),
            ],
        }
    }
}

impl FormatTable {
    pub fn by_name(&self, name: &str) -> Option<&FormatEntry> {
        self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn by_extension(&self, ext: &str) -> Option<&FormatEntry> {
        self.entries
            .iter()
            .find(|e| e.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
    }
}

/// Reader for any format this build can decode.
pub enum AnyReader {
    #[cfg(feature = "gif")]
    Gif(GifReader),
    #[cfg(feature = "webp")]
    Webp(WebpReader),
    Still(StillReader),
}

macro_rules! dispatch {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            #[cfg(feature = "gif")]
            AnyReader::Gif($r) => $body,
            #[cfg(feature = "webp")]
            AnyReader::Webp($r) => $body,
            AnyReader::Still($r) => $body,
        }
    };
}

impl ImageReader for AnyReader {
    fn can_read(&mut self) -> bool {
        dispatch!(self, r => r.can_read())
    }

    fn read(&mut self) -> Result<RgbaImage, ReaderError> {
        dispatch!(self, r => r.read())
    }

    fn jump_to_image(&mut self, index: usize) -> bool {
        dispatch!(self, r => r.jump_to_image(index))
    }

    fn image_count(&self) -> usize {
        dispatch!(self, r => r.image_count())
    }

    fn loop_count(&self) -> LoopCount {
        dispatch!(self, r => r.loop_count())
    }

    fn next_image_delay(&self) -> i32 {
        dispatch!(self, r => r.next_image_delay())
    }

    fn error(&self) -> Option<&ReaderError> {
        dispatch!(self, r => r.error())
    }

    fn source(&self) -> &MovieSource {
        dispatch!(self, r => r.source())
    }

    fn format(&self) -> &str {
        dispatch!(self, r => r.format())
    }

    fn options(&self) -> &ReaderOptions {
        dispatch!(self, r => r.options())
    }

    fn options_mut(&mut self) -> &mut ReaderOptions {
        dispatch!(self, r => r.options_mut())
    }
}

/// Picks and builds a decoder for a source.
///
/// Resolution order: explicit format hint, then magic bytes (seekable sources
/// only), then file extension.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    formats: FormatTable,
}

impl DecoderRegistry {
    pub fn new(formats: FormatTable) -> Self {
        Self { formats }
    }

    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    /// Whether this build has a decoder for `format`.
    pub fn is_supported(&self, format: &str) -> bool {
        let Some(entry) = self.formats.by_name(format) else {
            return false;
        };
        match entry.name.as_str() {
            "gif" => cfg!(feature = "gif"),
            "webp" => cfg!(feature = "webp"),
            other => image::ImageFormat::from_extension(other)
                .is_some_and(|f| f.reading_enabled()),
        }
    }

    pub fn supported_formats(&self) -> Vec<&str> {
        self.formats
            .entries
            .iter()
            .filter(|e| self.is_supported(&e.name))
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Supported formats that can carry animations.
    pub fn animated_formats(&self) -> Vec<&str> {
        self.formats
            .entries
            .iter()
            .filter(|e| e.animated && self.is_supported(&e.name))
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Work out which format `source` holds.
    pub fn resolve_format(
        &self,
        source: &MovieSource,
        hint: Option<&str>,
    ) -> Result<String, ReaderError> {
        if let Some(hint) = hint.filter(|h| !h.is_empty()) {
            return match self.formats.by_name(hint).or_else(|| self.formats.by_extension(hint)) {
                Some(entry) => Ok(entry.name.clone()),
                None => Err(unsupported(hint)),
            };
        }
        if let Some(name) = sniff_source(source)? {
            if let Some(entry) = self.formats.by_name(name) {
                return Ok(entry.name.clone());
            }
        }
        source
            .extension()
            .and_then(|ext| self.formats.by_extension(&ext))
            .map(|entry| entry.name.clone())
            .ok_or_else(|| {
                ReaderError::new(
                    ReaderErrorKind::UnsupportedFormat,
                    "could not determine image format",
                )
            })
    }
}

impl ReaderFactory for DecoderRegistry {
    type Reader = AnyReader;

    fn create(&self, source: &MovieSource, format: Option<&str>) -> Result<AnyReader, ReaderError> {
        let format = self.resolve_format(source, format)?;
        if !self.is_supported(&format) {
            return Err(unsupported(&format));
        }
        log::debug!("Creating {format} reader");
        match format.as_str() {
            #[cfg(feature = "gif")]
            "gif" => Ok(AnyReader::Gif(GifReader::open(source)?)),
            #[cfg(feature = "webp")]
            "webp" => Ok(AnyReader::Webp(WebpReader::open(source)?)),
            other => Ok(AnyReader::Still(StillReader::open(source, other)?)),
        }
    }
}

fn unsupported(format: &str) -> ReaderError {
    ReaderError::new(
        ReaderErrorKind::UnsupportedFormat,
        format!("unsupported image format '{format}'"),
    )
}

/// Identify a format from its leading bytes.
fn sniff(header: &[u8]) -> Option<&'static str> {
    if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        return Some("webp");
    }
    match image::guess_format(header).ok()? {
        image::ImageFormat::Png => Some("png"),
        image::ImageFormat::Jpeg => Some("jpeg"),
        image::ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}

/// Peek at the head of a seekable source, leaving its position untouched.
fn sniff_source(source: &MovieSource) -> Result<Option<&'static str>, ReaderError> {
    let mut header = [0u8; SNIFF_LEN];
    let len = match source {
        MovieSource::File(path) => match std::fs::File::open(path) {
            Ok(mut file) => read_head(&mut file, &mut header)?,
            Err(e) => return Err(e.into()),
        },
        MovieSource::Device(device) if device.is_sequential() => return Ok(None),
        MovieSource::Device(device) => {
            let start = device.position()?;
            let len = read_head(&mut device.clone(), &mut header);
            device.seek_to(start)?;
            len?
        }
    };
    Ok(sniff(&header[..len]))
}

fn read_head(stream: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
