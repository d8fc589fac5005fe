//! Seekable output file capability.
//!
//! The recorder never touches the filesystem directly: muxers write through a
//! [`FileIo`] that forwards to whatever [`SeekableFile`] the caller supplied.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

pub trait SeekableFile: Send {
    fn open(&mut self, name: &str) -> io::Result<()>;
    fn close(&mut self);
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
}

pub type SharedFile = Arc<Mutex<dyn SeekableFile>>;

pub fn shared_file(file: impl SeekableFile + 'static) -> SharedFile {
    Arc::new(Mutex::new(file))
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "file is not open")
}

/// [`SeekableFile`] backed by `std::fs`. `open` creates or truncates.
#[derive(Default)]
pub struct FsFile {
    inner: Option<File>,
}

impl FsFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

impl SeekableFile for FsFile {
    fn open(&mut self, name: &str) -> io::Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(name)?;
        self.inner = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut file) = self.inner.take() {
            if let Err(e) = file.flush() {
                log::warn!("flush on close failed: {}", e);
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.as_mut().ok_or_else(not_open)?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.as_mut().ok_or_else(not_open)?.write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.as_mut().ok_or_else(not_open)?.seek(pos)
    }
}

/// `Read + Write + Seek` view of a shared [`SeekableFile`].
#[derive(Clone)]
pub struct FileIo {
    name: String,
    file: SharedFile,
}

impl FileIo {
    pub fn new(name: &str, file: SharedFile) -> Self {
        Self {
            name: name.to_string(),
            file,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Read for FileIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.lock().read(buf)
    }
}

impl Write for FileIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for FileIo {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.lock().seek(pos)
    }
}
