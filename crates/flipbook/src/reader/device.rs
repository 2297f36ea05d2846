use std::cell::RefCell;
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Anything a decoder can both read and reposition.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

enum DeviceStream {
    Seekable(Box<dyn ReadSeek>),
    Sequential(Box<dyn Read>),
}

/// Shared handle to the byte stream a movie plays from.
///
/// Readers hold a clone while decoding; the movie keeps its own so it can put the
/// stream back at its starting position when the decoder has to be rebuilt.
#[derive(Clone)]
pub struct MovieDevice {
    inner: Rc<RefCell<DeviceStream>>,
}

impl MovieDevice {
    /// Seekable device (files, in-memory buffers).
    pub fn new<S: Read + Seek + 'static>(stream: S) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeviceStream::Seekable(Box::new(stream)))),
        }
    }

    /// Forward-only device (pipes, sockets). Cannot be rewound.
    pub fn sequential<S: Read + 'static>(stream: S) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeviceStream::Sequential(Box::new(stream)))),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Cursor::new(bytes.into()))
    }

    pub fn is_sequential(&self) -> bool {
        matches!(*self.inner.borrow(), DeviceStream::Sequential(_))
    }

    /// Current read offset. Sequential devices always report 0.
    pub fn position(&self) -> io::Result<u64> {
        match &mut *self.inner.borrow_mut() {
            DeviceStream::Seekable(s) => s.stream_position(),
            DeviceStream::Sequential(_) => Ok(0),
        }
    }

    pub fn seek_to(&self, pos: u64) -> io::Result<()> {
        self.clone().seek(SeekFrom::Start(pos)).map(|_| ())
    }

    /// True if both handles refer to the same underlying stream.
    pub fn same_device(&self, other: &MovieDevice) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Read for MovieDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut *self.inner.borrow_mut() {
            DeviceStream::Seekable(s) => s.read(buf),
            DeviceStream::Sequential(s) => s.read(buf),
        }
    }
}

impl Seek for MovieDevice {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut *self.inner.borrow_mut() {
            DeviceStream::Seekable(s) => s.seek(pos),
            DeviceStream::Sequential(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "sequential device cannot seek",
            )),
        }
    }
}

impl fmt::Debug for MovieDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MovieDevice")
            .field("sequential", &self.is_sequential())
            .finish()
    }
}

/// Where a movie's bytes come from.
#[derive(Debug, Clone)]
pub enum MovieSource {
    File(PathBuf),
    Device(MovieDevice),
}

impl MovieSource {
    pub fn file_name(&self) -> Option<&Path> {
        match self {
            MovieSource::File(path) => Some(path),
            MovieSource::Device(_) => None,
        }
    }

    pub fn device(&self) -> Option<&MovieDevice> {
        match self {
            MovieSource::File(_) => None,
            MovieSource::Device(device) => Some(device),
        }
    }

    /// Lowercased file extension, if this is a file source.
    pub fn extension(&self) -> Option<String> {
        self.file_name()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }
}
