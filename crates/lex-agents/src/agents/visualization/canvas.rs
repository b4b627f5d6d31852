//! Minimal raster drawing on top of `image::RgbImage`.

use crate::error::{PipelineError, Result};
use image::{ImageFormat, Rgb, RgbImage};
use std::path::Path;

pub(crate) const PANEL_WIDTH: u32 = 480;
pub(crate) const PANEL_HEIGHT: u32 = 400;
const MARGIN: u32 = 40;

pub(crate) const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
pub(crate) const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
pub(crate) const GRID: Rgb<u8> = Rgb([225, 225, 225]);
pub(crate) const DATA_BARS: Rgb<u8> = Rgb([31, 119, 180]);
pub(crate) const PREDICTION_BARS: Rgb<u8> = Rgb([255, 127, 14]);
pub(crate) const POINTS: Rgb<u8> = Rgb([44, 110, 170]);
pub(crate) const IDENTITY: Rgb<u8> = Rgb([214, 39, 40]);
const PLACEHOLDER: Rgb<u8> = Rgb([170, 170, 170]);

/// Plot area of one panel, in pixels.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Area {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

impl Area {
    /// Map fractions of the area (0..=1, y pointing up) to pixel coordinates.
    fn point(&self, fx: f64, fy: f64) -> (i64, i64) {
        let x = self.left as f64 + fx.clamp(0.0, 1.0) * (self.width - 1) as f64;
        let y = (self.top + self.height - 1) as f64 - fy.clamp(0.0, 1.0) * (self.height - 1) as f64;
        (x.round() as i64, y.round() as i64)
    }
}

/// Panels laid out left to right, each `PANEL_WIDTH` wide.
pub(crate) struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(panels: usize) -> Self {
        let panels = panels.max(1) as u32;
        Self {
            image: RgbImage::from_pixel(PANEL_WIDTH * panels, PANEL_HEIGHT, BACKGROUND),
        }
    }

    pub fn area(&self, panel: usize) -> Area {
        Area {
            left: panel as u32 * PANEL_WIDTH + MARGIN,
            top: MARGIN,
            width: PANEL_WIDTH - 2 * MARGIN,
            height: PANEL_HEIGHT - 2 * MARGIN,
        }
    }

    #[cfg(test)]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        let (w, h) = self.image.dimensions();
        if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
        for y in y0.min(y1)..=y0.max(y1) {
            for x in x0.min(x1)..=x0.max(x1) {
                self.put(x, y, color);
            }
        }
    }

    /// Bresenham line. With `dash = Some(n)` pixels alternate in runs of `n`.
    fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, dash: Option<usize>) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut step = 0usize;

        loop {
            if dash.is_none_or(|n| (step / n) % 2 == 0) {
                self.put(x, y, color);
            }
            if (x, y) == to {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
            step += 1;
        }
    }

    pub fn grid(&mut self, area: Area, divisions: usize) {
        for i in 1..divisions {
            let f = i as f64 / divisions as f64;
            self.line(area.point(0.0, f), area.point(1.0, f), GRID, None);
            self.line(area.point(f, 0.0), area.point(f, 1.0), GRID, None);
        }
    }

    pub fn frame(&mut self, area: Area) {
        let corners = [
            area.point(0.0, 0.0),
            area.point(1.0, 0.0),
            area.point(1.0, 1.0),
            area.point(0.0, 1.0),
        ];
        for i in 0..4 {
            self.line(corners[i], corners[(i + 1) % 4], AXIS, None);
        }
    }

    /// Bars for pre-binned counts, scaled to the tallest bin.
    pub fn histogram(&mut self, area: Area, counts: &[usize], color: Rgb<u8>) {
        self.grid(area, 5);
        let tallest = counts.iter().copied().max().unwrap_or(0);
        if tallest > 0 {
            let bins = counts.len() as f64;
            for (i, &count) in counts.iter().enumerate() {
                if count == 0 {
                    continue;
                }
                let top = count as f64 / tallest as f64;
                let (x0, y0) = area.point(i as f64 / bins, 0.0);
                let (x1, y1) = area.point((i + 1) as f64 / bins, top);
                self.fill_rect(x0, y0, x1, y1, color);
                // bar outline
                self.line((x0, y0), (x0, y1), AXIS, None);
                self.line((x0, y1), (x1, y1), AXIS, None);
                self.line((x1, y1), (x1, y0), AXIS, None);
            }
        }
        self.frame(area);
    }

    /// Scatter of `(actual, predicted)` pairs with a dashed identity line.
    /// Both axes share the joint value range so the identity line runs
    /// corner to corner.
    pub fn scatter_with_identity(&mut self, area: Area, actual: &[f64], predicted: &[f64]) {
        self.grid(area, 5);

        let (lo, hi) = joint_range(actual.iter().chain(predicted));
        let span = hi - lo;
        for (&a, &p) in actual.iter().zip(predicted) {
            if !(a.is_finite() && p.is_finite()) {
                continue;
            }
            let (x, y) = area.point((a - lo) / span, (p - lo) / span);
            self.fill_rect(x - 2, y - 2, x + 2, y + 2, POINTS);
        }

        self.line(area.point(0.0, 0.0), area.point(1.0, 1.0), IDENTITY, Some(6));
        self.frame(area);
    }

    pub fn placeholder(&mut self, area: Area) {
        self.line(area.point(0.0, 0.0), area.point(1.0, 1.0), PLACEHOLDER, None);
        self.line(area.point(0.0, 1.0), area.point(1.0, 0.0), PLACEHOLDER, None);
        self.frame(area);
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        *self.image.get_pixel(x, y)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| PipelineError::RenderFailed(format!("{}: {}", path.display(), e)))
    }
}

/// Finite min/max of `values`, widened to a unit span when degenerate.
fn joint_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if !lo.is_finite() {
        (0.0, 1.0)
    } else if hi - lo <= f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canvas_width_follows_panel_count() {
        assert_eq!(Canvas::new(1).dimensions(), (PANEL_WIDTH, PANEL_HEIGHT));
        assert_eq!(Canvas::new(3).dimensions(), (3 * PANEL_WIDTH, PANEL_HEIGHT));
    }

    #[test]
    fn test_histogram_draws_bars() {
        let mut canvas = Canvas::new(1);
        let area = canvas.area(0);
        canvas.histogram(area, &[4, 0, 2], DATA_BARS);

        // middle of the first (tallest) bar
        let x = MARGIN + (PANEL_WIDTH - 2 * MARGIN) / 6;
        let y = PANEL_HEIGHT / 2;
        assert_eq!(canvas.pixel(x, y), DATA_BARS);
    }

    #[test]
    fn test_identity_line_is_red_and_dashed() {
        let mut canvas = Canvas::new(1);
        let area = canvas.area(0);
        canvas.scatter_with_identity(area, &[], &[]);

        let (x, y) = area.point(0.0, 0.0);
        assert_eq!(canvas.pixel(x as u32 + 1, y as u32 - 1), IDENTITY);
    }

    #[test]
    fn test_joint_range_degenerate() {
        assert_eq!(joint_range([2.0, 2.0].iter()), (1.5, 2.5));
        assert_eq!(joint_range([].iter()), (0.0, 1.0));
        assert_eq!(joint_range([1.0, f64::NAN, 3.0].iter()), (1.0, 3.0));
    }
}
