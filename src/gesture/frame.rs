// src/gesture/frame.rs

use std::sync::Arc;

use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Luma8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// One captured video frame. Pixel data is never copied after capture;
/// frames travel between threads as [`SharedFrame`].
#[derive(Clone, Debug)]
pub struct Frame {
    /// Stamped by the pipeline, strictly increasing.
    pub id: u64,
    /// Device-clock time of capture.
    pub timestamp: f64,
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

pub type SharedFrame = Arc<Frame>;

impl Frame {
    pub fn new(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Self {
        Self { id: 0, timestamp: 0.0, width, height, format, data }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() >= self.width * self.height * self.format.bytes_per_pixel()
    }

    /// Luma (0..255) of the pixel at (x, y). Out of range reads as black.
    pub fn luma_at(&self, x: usize, y: usize) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        let i = (y * self.width + x) * self.format.bytes_per_pixel();
        match self.format {
            PixelFormat::Luma8 => self.data.get(i).copied().unwrap_or(0) as f32,
            PixelFormat::Rgba8 => match self.data.get(i..i + 3) {
                Some(px) => 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32,
                None => 0.0,
            },
        }
    }

    /// Nearest-neighbour `size` x `size` luma grid over the whole frame.
    pub fn luma_grid(&self, size: usize) -> Vec<f32> {
        let size = size.max(1);
        let mut out = Vec::with_capacity(size * size);
        for gy in 0..size {
            let y = (gy * self.height) / size + self.height / (2 * size);
            for gx in 0..size {
                let x = (gx * self.width) / size + self.width / (2 * size);
                out.push(self.luma_at(x, y));
            }
        }
        out
    }

    /// Width / height.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 { 1.0 } else { self.width as f32 / self.height as f32 }
    }
}

/// Pull-model camera. `next_frame` blocks until the device delivers a frame.
pub trait FrameSource: Send {
    /// Acquire the device. Permission or hardware problems surface here as
    /// `CoreError::CameraUnavailable`.
    fn open(&mut self) -> Result<()>;

    /// `Ok(None)` is a dropped frame: nothing this cycle, try again.
    /// `Err` means the camera is gone and the pipeline must halt.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
