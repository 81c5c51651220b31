//! Color raster produced by the ray marcher.

use glam::{UVec2, Vec4};

/// Row-major RGBA samples, top row first.
///
/// The backing storage is reused across frames; [`Raster::resize`] only
/// reallocates when the sample count grows.
#[derive(Debug, Clone, Default)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<Vec4>,
}

impl Raster {
    /// Create a black raster.
    pub fn new(width: u32, height: u32) -> Self {
        let mut raster = Self::default();
        raster.resize(width, height);
        raster
    }

    /// Change the dimensions, keeping the allocation when possible.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.resize(width as usize * height as usize, Vec4::ZERO);
    }

    /// Width in samples.
    #[inline]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in samples.
    #[inline]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Dimensions as a vector.
    #[inline]
    pub const fn resolution(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Sample at `(x, y)`, or `None` outside the raster.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<Vec4> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(self.index(x, y)).copied()
    }

    /// Overwrite the sample at `(x, y)`; out-of-range writes are ignored.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: Vec4) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.data[i] = color;
        }
    }

    /// All samples.
    #[inline]
    pub fn as_slice(&self) -> &[Vec4] {
        &self.data
    }

    /// All samples, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Vec4] {
        &mut self.data
    }

    /// Set every sample to one color.
    pub fn fill(&mut self, color: Vec4) {
        self.data.fill(color);
    }

    #[inline]
    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}
