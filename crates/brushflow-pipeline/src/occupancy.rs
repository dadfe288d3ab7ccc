//! Occupancy mask: pixels already claimed by accepted strokes.
//!
//! The tracer consults the mask before tracing each seed and marks a
//! disk around every point of each stroke it accepts. Cells are only
//! ever set, never cleared, for the lifetime of one run.

use crate::types::{Dimensions, Point};

/// Bit raster of claimed pixels, packed 64 cells per word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyMask {
    width: u32,
    height: u32,
    bits: Vec<u64>,
}

impl OccupancyMask {
    /// An all-clear mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let cells = width as usize * height as usize;
        Self {
            width,
            height,
            bits: vec![0; cells.div_ceil(64)],
        }
    }

    /// Mask dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn cell(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Whether `(x, y)` is claimed. Out-of-bounds pixels read as clear.
    #[must_use]
    pub fn is_occupied(&self, x: i64, y: i64) -> bool {
        self.cell(x, y)
            .is_some_and(|i| self.bits[i / 64] & (1u64 << (i % 64)) != 0)
    }

    fn mark(&mut self, x: i64, y: i64) {
        if let Some(i) = self.cell(x, y) {
            self.bits[i / 64] |= 1u64 << (i % 64);
        }
    }

    /// Claim every pixel within `radius` of the pixel nearest `center`
    /// (`dx² + dy² <= radius²`). Cells outside the mask are ignored.
    pub fn mark_disk(&mut self, center: Point, radius: u32) {
        let (cx, cy) = center.round_to_pixel();
        let r = i64::from(radius);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.mark(cx + dx, cy + dy);
                }
            }
        }
    }

    /// Number of claimed pixels.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        let mask = OccupancyMask::new(9, 7);
        assert_eq!(mask.occupied_count(), 0);
        assert!(!mask.is_occupied(4, 3));
    }

    #[test]
    fn radius_one_marks_a_plus_shape() {
        let mut mask = OccupancyMask::new(9, 9);
        mask.mark_disk(Point::new(4.2, 3.9), 1);
        assert_eq!(mask.occupied_count(), 5);
        for (x, y) in [(4, 4), (3, 4), (5, 4), (4, 3), (4, 5)] {
            assert!(mask.is_occupied(x, y), "({x},{y})");
        }
        assert!(!mask.is_occupied(3, 3));
    }

    #[test]
    fn radius_two_disk_has_thirteen_cells() {
        let mut mask = OccupancyMask::new(9, 9);
        mask.mark_disk(Point::new(4.0, 4.0), 2);
        assert_eq!(mask.occupied_count(), 13);
        assert!(mask.is_occupied(4, 2));
        assert!(!mask.is_occupied(2, 2));
    }

    #[test]
    fn disks_are_clipped_at_the_border() {
        let mut mask = OccupancyMask::new(4, 4);
        mask.mark_disk(Point::new(0.0, 0.0), 1);
        assert_eq!(mask.occupied_count(), 3);
        assert!(!mask.is_occupied(-1, 0));
    }

    #[test]
    fn marks_accumulate_and_never_clear() {
        let mut mask = OccupancyMask::new(70, 2);
        mask.mark_disk(Point::new(65.0, 0.0), 0);
        mask.mark_disk(Point::new(65.0, 0.0), 0);
        mask.mark_disk(Point::new(1.0, 1.0), 0);
        assert_eq!(mask.occupied_count(), 2);
        assert!(mask.is_occupied(65, 0));
        assert!(mask.is_occupied(1, 1));
    }
}
