//! Seed selection: candidate starting pixels for stroke tracing.
//!
//! Seeds are taken from a regular grid over the interior of the
//! normalized-magnitude field. Low-contrast images that yield too few
//! candidates get a single denser, more permissive rescan. The returned
//! order (strongest first) decides which edges claim the occupancy mask
//! first.

use crate::field::ScalarField;

/// Pixels kept clear of the image border when scanning for seeds.
pub const SEED_MARGIN: u32 = 2;

/// Candidate count below which the collector rescans more densely.
pub const MIN_SEEDS: usize = 40;

/// Threshold multiplier applied on the densifying rescan.
pub const DENSIFY_THRESHOLD_FACTOR: f32 = 0.72;

/// A candidate start pixel and its normalized magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub x: u32,
    pub y: u32,
    pub strength: f32,
}

/// Seeds in trace order plus whether the densifying rescan ran.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeedSet {
    pub seeds: Vec<Seed>,
    pub densified: bool,
}

/// Scan the grid once, in row-major order.
fn scan(normalized: &ScalarField, threshold: f32, stride: u32) -> Vec<Seed> {
    let stride = stride.max(1) as usize;
    let (width, height) = (normalized.width(), normalized.height());
    if width <= 2 * SEED_MARGIN || height <= 2 * SEED_MARGIN {
        return Vec::new();
    }

    let mut seeds = Vec::new();
    for y in (SEED_MARGIN..height - SEED_MARGIN).step_by(stride) {
        for x in (SEED_MARGIN..width - SEED_MARGIN).step_by(stride) {
            let strength = normalized[(x, y)][0];
            if strength >= threshold {
                seeds.push(Seed { x, y, strength });
            }
        }
    }
    seeds
}

/// Collect seeds from `normalized` at `threshold` on a `stride` grid.
///
/// When fewer than [`MIN_SEEDS`] pixels qualify, the grid is rescanned
/// once with the threshold scaled by [`DENSIFY_THRESHOLD_FACTOR`] and the
/// stride reduced by one (never below 2); the rescan replaces the first
/// result. Seeds are sorted by descending strength, ties keeping scan
/// order.
#[must_use = "returns the collected seeds"]
pub fn collect_seeds(normalized: &ScalarField, threshold: f32, stride: u32) -> SeedSet {
    let mut seeds = scan(normalized, threshold, stride);
    let mut densified = false;

    if seeds.len() < MIN_SEEDS {
        let dense_stride = stride.saturating_sub(1).max(2);
        seeds = scan(normalized, threshold * DENSIFY_THRESHOLD_FACTOR, dense_stride);
        densified = true;
    }

    seeds.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    SeedSet { seeds, densified }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::scalar_field;

    #[test]
    fn flat_field_yields_no_seeds_even_after_densifying() {
        let set = collect_seeds(&ScalarField::new(32, 32), 10.0, 4);
        assert!(set.seeds.is_empty());
        assert!(set.densified);
    }

    #[test]
    fn margin_is_respected() {
        let field = scalar_field(12, 12, |_, _| 200.0);
        let set = collect_seeds(&field, 10.0, 1);
        assert!(!set.seeds.is_empty());
        for seed in &set.seeds {
            assert!((2..10).contains(&seed.x), "x = {}", seed.x);
            assert!((2..10).contains(&seed.y), "y = {}", seed.y);
        }
    }

    #[test]
    fn sorted_by_descending_strength_with_stable_ties() {
        // Strength grows with x; every row shares the same profile.
        let field = scalar_field(64, 64, |x, _| f32::from(u8::try_from(x).unwrap_or(0)));
        let set = collect_seeds(&field, 0.0, 3);
        assert!(!set.densified);
        assert!(set.seeds.windows(2).all(|w| w[0].strength >= w[1].strength));
        // Equal strengths keep row-major scan order.
        let strongest: Vec<_> = set
            .seeds
            .iter()
            .take_while(|s| (s.strength - set.seeds[0].strength).abs() < f32::EPSILON)
            .collect();
        assert!(strongest.len() > 1);
        assert!(strongest.windows(2).all(|w| w[0].y < w[1].y));
    }

    #[test]
    fn sparse_candidates_trigger_denser_rescan() {
        // One strong column at x = 12, invisible to a stride-6 grid
        // starting at x = 2 but hit by the stride-5 rescan.
        let field = scalar_field(32, 32, |x, _| if x == 12 { 255.0 } else { 0.0 });
        let set = collect_seeds(&field, 50.0, 6);
        assert!(set.densified);
        assert_eq!(set.seeds.len(), 6);
        assert!(set.seeds.iter().all(|s| s.x == 12));
    }

    #[test]
    fn rescan_uses_lowered_threshold() {
        // Magnitude 40 fails threshold 50 but passes 50 * 0.72 = 36.
        let field = scalar_field(20, 20, |_, _| 40.0);
        let set = collect_seeds(&field, 50.0, 4);
        assert!(set.densified);
        assert!(!set.seeds.is_empty());
    }

    #[test]
    fn raising_threshold_shrinks_a_single_scan() {
        let field = scalar_field(48, 48, |x, y| f32::from(u8::try_from((x * 13 + y * 7) % 256).unwrap_or(0)));
        let mut previous = usize::MAX;
        for threshold in [0.0, 40.0, 80.0, 120.0, 160.0, 200.0, 240.0] {
            let count = scan(&field, threshold, 2).len();
            assert!(count <= previous, "threshold {threshold}: {count} > {previous}");
            previous = count;
        }
    }

    #[test]
    fn densify_can_outnumber_a_lower_threshold() {
        // Uniform 100 on a 64x64 field: the stride-6 grid has 10 x 10
        // cells. At 100 all qualify; at 101 none do, and the stride-5
        // rescan at 101 * 0.72 takes its full 12 x 12 grid.
        let field = scalar_field(64, 64, |_, _| 100.0);
        let low = collect_seeds(&field, 100.0, 6);
        let high = collect_seeds(&field, 101.0, 6);
        assert!(!low.densified);
        assert_eq!(low.seeds.len(), 100);
        assert!(high.densified);
        assert_eq!(high.seeds.len(), 144);
    }

    #[test]
    fn dense_stride_floors_at_two() {
        let field = scalar_field(10, 10, |_, _| 100.0);
        let set = collect_seeds(&field, 255.0 / DENSIFY_THRESHOLD_FACTOR + 1.0, 2);
        assert!(set.densified);
        assert!(set.seeds.is_empty());

        // Stride 2 over the 6-pixel interior gives 3 x 3 seeds.
        let set = collect_seeds(&field, 90.0, 2);
        assert_eq!(set.seeds.len(), 9);
    }

    #[test]
    fn tiny_fields_have_no_interior() {
        for (w, h) in [(0, 0), (4, 4), (4, 40), (40, 3)] {
            let set = collect_seeds(&scalar_field(w, h, |_, _| 255.0), 0.0, 2);
            assert!(set.seeds.is_empty(), "{w}x{h}");
        }
    }
}
