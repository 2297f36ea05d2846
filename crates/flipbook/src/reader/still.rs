use image::{ImageFormat, RgbaImage};

use super::{open_seekable, ImageReader, MovieSource, ReaderError, ReaderErrorKind, ReaderOptions};

/// Single-frame reader for anything the `image` crate can decode.
pub struct StillReader {
    source: MovieSource,
    format: String,
    image_format: ImageFormat,
    options: ReaderOptions,
    done: bool,
    error: Option<ReaderError>,
}

impl StillReader {
    pub fn open(source: &MovieSource, format: &str) -> Result<Self, ReaderError> {
        let image_format = ImageFormat::from_extension(format).ok_or_else(|| {
            ReaderError::new(
                ReaderErrorKind::UnsupportedFormat,
                format!("no still image decoder for '{format}'"),
            )
        })?;
        if !image_format.reading_enabled() {
            return Err(ReaderError::new(
                ReaderErrorKind::UnsupportedFormat,
                format!("decoding '{format}' is not enabled in this build"),
            ));
        }
        Ok(Self {
            source: source.clone(),
            format: format.to_string(),
            image_format,
            options: ReaderOptions::default(),
            done: false,
            error: None,
        })
    }
}

impl ImageReader for StillReader {
    fn can_read(&mut self) -> bool {
        !self.done && self.error.is_none()
    }

    fn read(&mut self) -> Result<RgbaImage, ReaderError> {
        if self.done {
            return Err(ReaderError::invalid_data("no more frames"));
        }
        let decoded = open_seekable(&self.source).and_then(|input| {
            let mut reader = image::ImageReader::new(input);
            reader.set_format(self.image_format);
            Ok(reader.decode()?)
        });
        match decoded {
            Ok(image) => {
                self.done = true;
                Ok(self.options.apply_clip(image.to_rgba8()))
            }
            Err(err) => {
                log::warn!("Failed to decode {} image: {err}", self.format);
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn image_count(&self) -> usize {
        1
    }

    fn next_image_delay(&self) -> i32 {
        0
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
