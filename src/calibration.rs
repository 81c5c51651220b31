//! Pixel/cell coordinate calibration.
//!
//! Terminals report window geometry in pixels and their own size in cells,
//! but never where the cell grid sits inside the window. Every mouse click
//! gives one (cell, pixel) pair; those are bucketed per axis and a linear
//! model `cell = beta * pixel + alpha + 0.5` is fitted over the bucket
//! centres. Until both axes have a usable fit, estimates come from
//! `window_pixels / terminal_cells`.

use glam::{IVec2, UVec2, Vec2};
use tracing::debug;

/// Cell size assumed when nothing is known about the window.
pub const NOMINAL_CELL_SIZE: Vec2 = Vec2::new(8.0, 16.0);

const MIN_VARIANCE: f64 = 1e-9;

/// Pixel range observed for one cell index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bucket {
    estimate: f64,
    min: f64,
    max: f64,
}

impl Bucket {
    const fn new(pixel: f64) -> Self {
        Self {
            estimate: pixel,
            min: pixel,
            max: pixel,
        }
    }

    fn widen(&mut self, pixel: f64) {
        self.min = self.min.min(pixel);
        self.max = self.max.max(pixel);
        self.estimate = (self.min + self.max) / 2.0;
    }
}

/// Samples and fit for a single axis.
#[derive(Debug, Clone, Default)]
struct Axis {
    buckets: Vec<Option<Bucket>>,
    populated: usize,
    /// `(beta, alpha)`; `None` until two buckets give a non-degenerate fit.
    fit: Option<(f64, f64)>,
}

impl Axis {
    fn with_len(len: usize) -> Self {
        Self {
            buckets: vec![None; len],
            populated: 0,
            fit: None,
        }
    }

    fn add(&mut self, cell: usize, pixel: f64) {
        let Some(slot) = self.buckets.get_mut(cell) else {
            return;
        };
        match slot {
            Some(bucket) => bucket.widen(pixel),
            None => {
                *slot = Some(Bucket::new(pixel));
                self.populated += 1;
            }
        }
        if self.populated >= 2 {
            self.refit();
        }
    }

    // Ordinary least squares of cell index on pixel estimate.
    fn refit(&mut self) {
        let samples = self
            .buckets
            .iter()
            .enumerate()
            .filter_map(|(cell, bucket)| bucket.map(|b| (cell as f64, b.estimate)));

        let n = self.populated as f64;
        let (sum_cell, sum_pixel) = samples
            .clone()
            .fold((0.0, 0.0), |(c, p), (cell, pixel)| (c + cell, p + pixel));
        let mean_cell = sum_cell / n;
        let mean_pixel = sum_pixel / n;

        let (covariance, variance) = samples.fold((0.0, 0.0), |(cov, var), (cell, pixel)| {
            let dp = pixel - mean_pixel;
            (cov + (cell - mean_cell) * dp, var + dp * dp)
        });

        if variance <= MIN_VARIANCE || covariance.abs() <= MIN_VARIANCE {
            self.fit = None;
            return;
        }
        let beta = covariance / variance;
        self.fit = Some((beta, mean_cell - beta * mean_pixel));
    }
}

/// Online pixel-to-cell model built from observed clicks.
#[derive(Debug, Clone)]
pub struct CoordinateModel {
    terminal: UVec2,
    window_origin: Option<IVec2>,
    window_size: Option<IVec2>,
    x: Axis,
    y: Axis,
}

impl CoordinateModel {
    /// Empty model for a terminal of `terminal` cells.
    pub fn new(terminal: UVec2) -> Self {
        let len = terminal.x.max(terminal.y) as usize;
        Self {
            terminal,
            window_origin: None,
            window_size: None,
            x: Axis::with_len(len),
            y: Axis::with_len(len),
        }
    }

    /// Discard every sample if the terminal grid changed.
    ///
    /// Returns whether the model was rebuilt.
    pub fn ensure_terminal(&mut self, terminal: UVec2) -> bool {
        if terminal == self.terminal {
            return false;
        }
        debug!(?terminal, "terminal size changed, discarding calibration");
        let origin = self.window_origin;
        let size = self.window_size;
        *self = Self::new(terminal);
        self.window_origin = origin;
        self.window_size = size;
        true
    }

    /// Record the latest window geometry used by the coarse estimate.
    pub fn set_window(&mut self, origin: Option<IVec2>, size: Option<IVec2>) {
        if origin.is_some() {
            self.window_origin = origin;
        }
        if size.is_some_and(|s| s.x > 0 && s.y > 0) {
            self.window_size = size;
        }
    }

    /// Fold one click into the model.
    ///
    /// `cell` is 0-based; `pixel` is relative to the window origin. Negative
    /// pixels and cells outside the grid are ignored.
    pub fn observe(&mut self, terminal: UVec2, window: Option<IVec2>, cell: IVec2, pixel: IVec2) {
        self.ensure_terminal(terminal);
        self.set_window(None, window);
        if pixel.x < 0 || pixel.y < 0 || cell.x < 0 || cell.y < 0 {
            return;
        }
        let was_calibrated = self.is_calibrated();
        self.x.add(cell.x as usize, f64::from(pixel.x));
        self.y.add(cell.y as usize, f64::from(pixel.y));
        if self.is_calibrated() && !was_calibrated {
            debug!(x = ?self.x.fit, y = ?self.y.fit, "coordinate model calibrated");
        }
    }

    /// Whether both axes have a usable fit.
    pub const fn is_calibrated(&self) -> bool {
        self.x.populated >= 2 && self.y.populated >= 2 && self.x.fit.is_some() && self.y.fit.is_some()
    }

    /// Populated bucket count per axis.
    pub const fn len(&self) -> UVec2 {
        UVec2::new(self.x.populated as u32, self.y.populated as u32)
    }

    /// Whether no click has been recorded since the last rebuild.
    pub const fn is_empty(&self) -> bool {
        self.x.populated == 0 && self.y.populated == 0
    }

    fn fits(&self) -> Option<((f64, f64), (f64, f64))> {
        if !self.is_calibrated() {
            return None;
        }
        Some((self.x.fit?, self.y.fit?))
    }

    fn coarse_cell_size(&self) -> Vec2 {
        match self.window_size {
            Some(size) if self.terminal.x > 0 && self.terminal.y > 0 => {
                size.as_vec2() / self.terminal.as_vec2()
            }
            _ => NOMINAL_CELL_SIZE,
        }
    }

    /// Window-relative pixel to fractional cell.
    pub fn pixel_to_cell(&self, pixel: Vec2) -> Vec2 {
        match self.fits() {
            Some(((bx, ax), (by, ay))) => Vec2::new(
                (bx * f64::from(pixel.x) + ax + 0.5) as f32,
                (by * f64::from(pixel.y) + ay + 0.5) as f32,
            ),
            None => pixel / self.coarse_cell_size(),
        }
    }

    /// Cell to window-relative pixel; the exact inverse of
    /// [`pixel_to_cell`](Self::pixel_to_cell).
    pub fn cell_to_pixel(&self, cell: Vec2) -> Vec2 {
        match self.fits() {
            Some(((bx, ax), (by, ay))) => Vec2::new(
                ((f64::from(cell.x) - ax - 0.5) / bx) as f32,
                ((f64::from(cell.y) - ay - 0.5) / by) as f32,
            ),
            None => cell * self.coarse_cell_size(),
        }
    }

    /// Window-relative pixel of the grid's top-left corner.
    pub fn terminal_origin(&self) -> Vec2 {
        if self.is_calibrated() {
            self.cell_to_pixel(Vec2::ZERO)
        } else {
            Vec2::ZERO
        }
    }

    /// Pixel extent of the cell grid.
    pub fn terminal_pixel_size(&self) -> Vec2 {
        if self.is_calibrated() {
            self.cell_to_pixel(self.terminal.as_vec2()) - self.terminal_origin()
        } else {
            self.window_size
                .map_or(self.terminal.as_vec2() * NOMINAL_CELL_SIZE, |s| s.as_vec2())
        }
    }

    /// Pixel size of one cell.
    pub fn cell_size(&self) -> Vec2 {
        if self.is_calibrated() && self.terminal.x > 0 && self.terminal.y > 0 {
            self.terminal_pixel_size() / self.terminal.as_vec2()
        } else {
            self.coarse_cell_size()
        }
    }

    /// Cell height over cell width, as consumed by the ray marcher.
    pub fn cell_aspect(&self) -> f32 {
        let size = self.cell_size();
        if size.x > 0.0 && size.y > 0.0 {
            size.y / size.x
        } else {
            NOMINAL_CELL_SIZE.y / NOMINAL_CELL_SIZE.x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERM: UVec2 = UVec2::new(80, 24);
    const WINDOW: IVec2 = IVec2::new(660, 400);

    // 8x16 cells offset by a 10px border.
    fn click(model: &mut CoordinateModel, cx: i32, cy: i32, jitter: i32) {
        let pixel = IVec2::new(10 + cx * 8 + 4 + jitter, 10 + cy * 16 + 8 + jitter);
        model.observe(TERM, Some(WINDOW), IVec2::new(cx, cy), pixel);
    }

    #[test]
    fn test_uncalibrated_uses_window_ratio() {
        let mut model = CoordinateModel::new(TERM);
        model.set_window(None, Some(IVec2::new(800, 480)));
        assert!(!model.is_calibrated());
        assert_eq!(model.cell_size(), Vec2::new(10.0, 20.0));
        assert_eq!(model.pixel_to_cell(Vec2::new(100.0, 100.0)), Vec2::new(10.0, 5.0));
    }

    #[test]
    fn test_unknown_window_uses_nominal_cell() {
        let model = CoordinateModel::new(TERM);
        assert_eq!(model.cell_size(), NOMINAL_CELL_SIZE);
        assert!((model.cell_aspect() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_single_bucket_is_not_calibrated() {
        let mut model = CoordinateModel::new(TERM);
        click(&mut model, 5, 5, 0);
        click(&mut model, 5, 5, 2);
        assert_eq!(model.len(), UVec2::new(1, 1));
        assert!(!model.is_calibrated());
    }

    #[test]
    fn test_round_trip_after_calibration() {
        let mut model = CoordinateModel::new(TERM);
        let cells = [(2, 3), (40, 12), (70, 20), (15, 7)];
        for (i, &(cx, cy)) in cells.iter().enumerate() {
            click(&mut model, cx, cy, (i as i32 % 3) - 1);
        }
        assert!(model.is_calibrated());

        for &(cx, cy) in &cells {
            let cell = Vec2::new(cx as f32, cy as f32);
            let back = model.pixel_to_cell(model.cell_to_pixel(cell));
            assert!((back - cell).abs().max_element() < 1e-3, "{cell} -> {back}");

            let pixel = IVec2::new(10 + cx * 8 + 4, 10 + cy * 16 + 8).as_vec2();
            let estimated = model.pixel_to_cell(pixel).floor();
            assert!((estimated - cell).abs().max_element() <= 1.0, "{cell} vs {estimated}");
        }
    }

    #[test]
    fn test_calibrated_cell_size() {
        let mut model = CoordinateModel::new(TERM);
        click(&mut model, 0, 0, 0);
        click(&mut model, 79, 23, 0);
        assert!(model.is_calibrated());
        let size = model.cell_size();
        assert!((size.x - 8.0).abs() < 0.01);
        assert!((size.y - 16.0).abs() < 0.01);
        assert!((model.cell_aspect() - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_resize_discards_samples() {
        let mut model = CoordinateModel::new(TERM);
        click(&mut model, 1, 1, 0);
        click(&mut model, 30, 10, 0);
        assert!(model.is_calibrated());

        assert!(model.ensure_terminal(UVec2::new(100, 30)));
        assert_eq!(model.len(), UVec2::ZERO);
        assert!(model.is_empty());
        assert!(!model.is_calibrated());
        assert!(!model.ensure_terminal(UVec2::new(100, 30)));
    }

    #[test]
    fn test_bucket_estimate_is_midpoint() {
        let mut bucket = Bucket::new(10.0);
        bucket.widen(14.0);
        bucket.widen(12.0);
        assert_eq!(bucket.min, 10.0);
        assert_eq!(bucket.max, 14.0);
        assert_eq!(bucket.estimate, 12.0);
    }

    #[test]
    fn test_out_of_range_samples_ignored() {
        let mut model = CoordinateModel::new(TERM);
        model.observe(TERM, None, IVec2::new(500, 3), IVec2::new(10, 10));
        model.observe(TERM, None, IVec2::new(3, 3), IVec2::new(-1, 10));
        assert_eq!(model.len().y, 1);
        assert_eq!(model.len().x, 0);
    }
}
