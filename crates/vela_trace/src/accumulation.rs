//! Progressive radiance accumulation and image output.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::context::ContextError;
use crate::Color;

/// Per-pixel radiance sums, written concurrently by scheduler passes.
///
/// Additions are lock-free compare-and-swap loops on the `f32` bit
/// patterns. Sums are averaged over the number of finished frames.
pub struct AccumulationBuffer {
    width: u32,
    height: u32,
    pixels: Box<[[AtomicU32; 3]]>,
    frames: u32,
}

#[inline]
fn atomic_add_f32(cell: &AtomicU32, value: f32) {
    // The closure always returns Some, so this cannot fail
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        Some((f32::from_bits(bits) + value).to_bits())
    });
}

fn load_color(cells: &[AtomicU32; 3]) -> Color {
    Color::new(
        f32::from_bits(cells[0].load(Ordering::Relaxed)),
        f32::from_bits(cells[1].load(Ordering::Relaxed)),
        f32::from_bits(cells[2].load(Ordering::Relaxed)),
    )
}

impl AccumulationBuffer {
    /// Zeroed sums for `width × height` pixels, allocated up front like the
    /// work queues.
    pub fn new(width: u32, height: u32) -> Result<Self, ContextError> {
        let count = width as usize * height as usize;
        if count == 0 {
            return Err(ContextError::InvalidResolution { width, height });
        }

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(count)
            .map_err(|source| ContextError::PoolAllocation {
                queue: "accumulation",
                capacity: count,
                source,
            })?;
        pixels.resize_with(count, || {
            [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)]
        });

        Ok(Self {
            width,
            height,
            pixels: pixels.into_boxed_slice(),
            frames: 0,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Number of completed frames folded into the sums.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Add `color` to `pixel`. Non-finite values and out-of-range pixels
    /// are ignored, so one bad sample cannot poison the image.
    pub fn add(&self, pixel: u32, color: Color) -> bool {
        if !color.is_finite() {
            return false;
        }
        let Some(cells) = self.pixels.get(pixel as usize) else {
            return false;
        };

        for (cell, value) in cells.iter().zip(color.to_array()) {
            if value != 0.0 {
                atomic_add_f32(cell, value);
            }
        }
        true
    }

    /// Raw sum for one pixel, `None` past the end of the image.
    pub fn sum(&self, pixel: u32) -> Option<Color> {
        self.pixels.get(pixel as usize).map(load_color)
    }

    pub fn finish_frame(&mut self) {
        self.frames += 1;
    }

    /// Mean radiance per pixel over the finished frames.
    pub fn resolve(&self) -> Vec<Color> {
        let scale = 1.0 / self.frames.max(1) as f32;
        self.pixels
            .iter()
            .map(|cells| load_color(cells) * scale)
            .collect()
    }

    /// Resolved image as gamma-corrected 8-bit RGBA, row-major.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for color in self.resolve() {
            bytes.extend_from_slice(&color_to_rgba(color));
        }
        bytes
    }
}

impl std::fmt::Debug for AccumulationBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulationBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frames", &self.frames)
            .finish()
    }
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a color to 8-bit RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    let r = (255.0 * linear_to_gamma(color.x).clamp(0.0, 1.0)) as u8;
    let g = (255.0 * linear_to_gamma(color.y).clamp(0.0, 1.0)) as u8;
    let b = (255.0 * linear_to_gamma(color.z).clamp(0.0, 1.0)) as u8;
    [r, g, b, 255]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_linear_to_gamma() {
        assert_eq!(linear_to_gamma(0.0), 0.0);
        assert_eq!(linear_to_gamma(1.0), 1.0);
        assert!((linear_to_gamma(0.25) - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_color_to_rgba() {
        assert_eq!(color_to_rgba(Color::ZERO), [0, 0, 0, 255]);
        assert_eq!(color_to_rgba(Color::splat(4.0)), [255, 255, 255, 255]);
        assert_eq!(color_to_rgba(Color::new(0.25, -1.0, 1.0)), [127, 0, 255, 255]);
    }

    #[test]
    fn test_concurrent_adds() {
        let buffer = AccumulationBuffer::new(2, 1).unwrap();

        (0..1000).into_par_iter().for_each(|_| {
            buffer.add(1, Color::new(0.5, 1.0, 0.0));
        });

        assert_eq!(buffer.sum(1), Some(Color::new(500.0, 1000.0, 0.0)));
        assert_eq!(buffer.sum(0), Some(Color::ZERO));
        assert_eq!(buffer.sum(2), None);
    }

    #[test]
    fn test_resolve_averages_frames() {
        let mut buffer = AccumulationBuffer::new(1, 1).unwrap();
        assert_eq!(buffer.resolve(), vec![Color::ZERO]);

        buffer.add(0, Color::splat(1.0));
        buffer.finish_frame();
        buffer.add(0, Color::splat(3.0));
        buffer.finish_frame();

        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.resolve(), vec![Color::splat(2.0)]);
    }

    #[test]
    fn test_rejects_bad_samples() {
        let buffer = AccumulationBuffer::new(1, 1).unwrap();
        assert!(!buffer.add(0, Color::new(f32::NAN, 0.0, 0.0)));
        assert!(!buffer.add(5, Color::ONE));
        assert_eq!(buffer.sum(0), Some(Color::ZERO));
    }

    #[test]
    fn test_allocation_errors() {
        let err = AccumulationBuffer::new(0, 3).unwrap_err();
        assert!(matches!(err, ContextError::InvalidResolution { width: 0, height: 3 }));

        // u32::MAX squared pixels of 12 bytes cannot be reserved
        let err = AccumulationBuffer::new(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(
            err,
            ContextError::PoolAllocation {
                queue: "accumulation",
                ..
            }
        ));
    }
}
