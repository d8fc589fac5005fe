use std::fmt::{Display, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Packed 8-bit pixel layouts accepted from image sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }

    /// Tightly packed byte size of a `width` x `height` image.
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    fn to_rgba(&self, px: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Rgba8 => [px[0], px[1], px[2], px[3]],
            PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
            PixelFormat::Rgb8 => [px[0], px[1], px[2], u8::MAX],
        }
    }

    fn write_rgba(&self, rgba: [u8; 4], out: &mut Vec<u8>) {
        match self {
            PixelFormat::Rgba8 => out.extend_from_slice(&rgba),
            PixelFormat::Bgra8 => out.extend_from_slice(&[rgba[2], rgba[1], rgba[0], rgba[3]]),
            PixelFormat::Rgb8 => out.extend_from_slice(&rgba[..3]),
        }
    }
}

/// Caller-owned pixel data. Shared with the worker encoding it through
/// [`SharedImage`]; never mutated once built.
#[derive(Clone)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Bytes,
}

pub type SharedImage = Arc<ImageBuffer>;

impl ImageBuffer {
    /// Wraps `data` without checking its length; the encode worker rejects
    /// buffers whose size does not match the declared layout.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
        }
    }

    /// An image filled with a single RGBA colour, converted to `format`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(format.frame_size(width, height));
        for _ in 0..pixels {
            format.write_rgba(rgba, &mut data);
        }
        Self::new(width, height, format, data)
    }

    pub fn shared(self) -> SharedImage {
        Arc::new(self)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Size this image should have according to its declared layout.
    pub fn expected_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }

    /// Copy of this image in `format`. The source buffer is left untouched.
    pub fn to_format(&self, format: PixelFormat) -> ImageBuffer {
        if format == self.format {
            return self.clone();
        }
        let mut data = Vec::with_capacity(format.frame_size(self.width, self.height));
        for px in self.data.chunks_exact(self.format.bytes_per_pixel()) {
            format.write_rgba(self.format.to_rgba(px), &mut data);
        }
        ImageBuffer::new(self.width, self.height, format, data)
    }
}

impl Display for ImageBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "ImageBuffer width: {}, height: {}, format: {:?}, data_len: {}",
            self.width,
            self.height,
            self.format,
            self.data.len()
        )
    }
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
