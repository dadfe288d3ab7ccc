//! Stroke scoring, ranking, and paint ordering.
//!
//! Strokes are scored by length and strength, sorted best-first, given a
//! rank relative to the best stroke, then reordered for painting.
//!
//! # Strategy pattern
//!
//! The reorder step is pluggable through the [`StrokeOrderer`] trait and
//! selected at runtime with [`StrokeOrderKind`]. Every strategy keeps the
//! strongest stroke first and costs at most O(n · window).

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Stroke, Tuning};

/// Quality score: `length · (avg/255)^1.3 + peak · 0.04`.
#[must_use]
pub fn goodness(stroke: &Stroke) -> f64 {
    let avg = stroke.average_strength / 255.0;
    stroke
        .length
        .mul_add(avg.max(0.0).powf(1.3), stroke.peak_strength * 0.04)
}

/// Score every stroke and sort descending by goodness (stable).
#[must_use]
pub fn score_and_sort(mut strokes: Vec<Stroke>) -> Vec<Stroke> {
    for stroke in &mut strokes {
        stroke.goodness = goodness(stroke);
    }
    strokes.sort_by(|a, b| b.goodness.total_cmp(&a.goodness));
    strokes
}

/// Set each stroke's rank to its goodness relative to the first stroke,
/// clamped to 0-1. Expects goodness-sorted input.
pub fn assign_ranks(strokes: &mut [Stroke]) {
    let Some(best) = strokes.first().map(|s| s.goodness) else {
        return;
    };
    for stroke in strokes {
        stroke.strength_rank = if best > 0.0 {
            (stroke.goodness / best).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Selects how ranked strokes are ordered for painting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrokeOrderKind {
    /// Greedy nearest-centroid walk over a bounded lookahead window of
    /// the strongest remaining strokes.
    #[default]
    LocalityWindow,
    /// Pure goodness order.
    StrengthOnly,
}

impl fmt::Display for StrokeOrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalityWindow => f.write_str("LocalityWindow"),
            Self::StrengthOnly => f.write_str("StrengthOnly"),
        }
    }
}

/// Trait for paint-order strategies.
///
/// Input: strokes sorted by descending goodness. Output: the same
/// strokes in paint order.
pub trait StrokeOrderer {
    /// Reorder goodness-sorted strokes for painting.
    fn order(&self, strokes: Vec<Stroke>, tuning: &Tuning) -> Vec<Stroke>;
}

impl StrokeOrderer for StrokeOrderKind {
    fn order(&self, strokes: Vec<Stroke>, tuning: &Tuning) -> Vec<Stroke> {
        match *self {
            Self::LocalityWindow => locality_window(
                strokes,
                tuning.lookahead_window,
                tuning.window_index_penalty,
            ),
            Self::StrengthOnly => strokes,
        }
    }
}

/// Greedy walk: repeatedly pick, among the next `window` strongest
/// remaining strokes, the one minimizing centroid distance plus
/// `index · penalty`.
///
/// Picks always come from the front `window` of the pool, so each removal
/// shifts at most `window` strokes.
#[allow(clippy::cast_precision_loss)]
fn locality_window(strokes: Vec<Stroke>, window: usize, penalty: f64) -> Vec<Stroke> {
    let mut pool = VecDeque::from(strokes);
    let mut ordered = Vec::with_capacity(pool.len());
    let Some(mut last) = pool.pop_front() else {
        return ordered;
    };
    let window = window.max(1);

    while !pool.is_empty() {
        let from = last.centroid;
        let mut best = 0;
        let mut best_cost = f64::INFINITY;
        for (i, candidate) in pool.iter().take(window).enumerate() {
            let cost = from.distance(candidate.centroid) + i as f64 * penalty;
            if cost < best_cost {
                best_cost = cost;
                best = i;
            }
        }
        let Some(next) = pool.remove(best) else {
            break;
        };
        ordered.push(std::mem::replace(&mut last, next));
    }
    ordered.push(last);
    ordered
}

/// Score, rank, and order strokes for painting.
#[must_use = "returns the strokes in paint order"]
pub fn rank_strokes(strokes: Vec<Stroke>, kind: StrokeOrderKind, tuning: &Tuning) -> Vec<Stroke> {
    let mut sorted = score_and_sort(strokes);
    assign_ranks(&mut sorted);
    let ordered = kind.order(sorted, tuning);
    tracing::debug!(strokes = ordered.len(), order = %kind, "ranked strokes");
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, Rgb};

    fn stroke(length: f64, avg: f64, peak: f64, cx: f64, cy: f64) -> Stroke {
        Stroke {
            points: Vec::new(),
            length,
            average_strength: avg,
            peak_strength: peak,
            centroid: Point::new(cx, cy),
            color: Rgb::new(0, 0, 0),
            goodness: 0.0,
            strength_rank: 0.0,
        }
    }

    #[test]
    fn goodness_formula() {
        let s = stroke(10.0, 255.0, 255.0, 0.0, 0.0);
        assert!((goodness(&s) - (10.0 + 10.2)).abs() < 1e-9);
        let weak = stroke(10.0, 0.0, 100.0, 0.0, 0.0);
        assert!((goodness(&weak) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn sort_is_descending_and_ranks_are_relative() {
        let strokes = vec![
            stroke(5.0, 100.0, 100.0, 0.0, 0.0),
            stroke(40.0, 200.0, 255.0, 0.0, 0.0),
            stroke(20.0, 150.0, 180.0, 0.0, 0.0),
        ];
        let mut sorted = score_and_sort(strokes);
        assert!(sorted.windows(2).all(|w| w[0].goodness >= w[1].goodness));
        assign_ranks(&mut sorted);
        assert!((sorted[0].strength_rank - 1.0).abs() < f64::EPSILON);
        assert!(sorted.iter().all(|s| (0.0..=1.0).contains(&s.strength_rank)));
        assert!(sorted[1].strength_rank > sorted[2].strength_rank);
    }

    #[test]
    fn ties_keep_input_order() {
        let mut a = stroke(10.0, 100.0, 100.0, 1.0, 0.0);
        let mut b = stroke(10.0, 100.0, 100.0, 2.0, 0.0);
        a.color = Rgb::new(1, 0, 0);
        b.color = Rgb::new(2, 0, 0);
        let sorted = score_and_sort(vec![a, b]);
        assert_eq!(sorted[0].color, Rgb::new(1, 0, 0));
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(rank_strokes(Vec::new(), StrokeOrderKind::default(), &Tuning::default()).is_empty());
        let mut none: Vec<Stroke> = Vec::new();
        assign_ranks(&mut none);
    }

    #[test]
    fn locality_walk_prefers_nearby_strokes() {
        // Goodness order: A (0,0), B (100,0), C (1,0).
        let strokes = vec![
            stroke(50.0, 255.0, 255.0, 0.0, 0.0),
            stroke(40.0, 255.0, 255.0, 100.0, 0.0),
            stroke(30.0, 255.0, 255.0, 1.0, 0.0),
        ];
        let ordered = rank_strokes(strokes, StrokeOrderKind::LocalityWindow, &Tuning::default());
        let xs: Vec<f64> = ordered.iter().map(|s| s.centroid.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 100.0]);
        // Strongest stroke always leads.
        assert!((ordered[0].strength_rank - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn window_bounds_the_lookahead() {
        // The near stroke sits outside a window of 1, so order is pure strength.
        let strokes = vec![
            stroke(50.0, 255.0, 255.0, 0.0, 0.0),
            stroke(40.0, 255.0, 255.0, 100.0, 0.0),
            stroke(30.0, 255.0, 255.0, 1.0, 0.0),
        ];
        let tuning = Tuning {
            lookahead_window: 1,
            ..Tuning::default()
        };
        let ordered = rank_strokes(strokes, StrokeOrderKind::LocalityWindow, &tuning);
        let xs: Vec<f64> = ordered.iter().map(|s| s.centroid.x).collect();
        assert_eq!(xs, vec![0.0, 100.0, 1.0]);
    }

    #[test]
    fn index_penalty_breaks_distance_ties() {
        // B and C are equidistant from A; the earlier (stronger) one wins.
        let strokes = vec![
            stroke(50.0, 255.0, 255.0, 0.0, 0.0),
            stroke(40.0, 255.0, 255.0, 10.0, 0.0),
            stroke(30.0, 255.0, 255.0, -10.0, 0.0),
        ];
        let ordered = rank_strokes(strokes, StrokeOrderKind::LocalityWindow, &Tuning::default());
        assert!((ordered[1].centroid.x - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn long_walk_matches_exhaustive_window_scan() {
        // Scattered centroids with strictly decreasing strength.
        let strokes: Vec<Stroke> = (0..400u32)
            .map(|i| {
                let x = f64::from((i * 7919) % 211);
                let y = f64::from((i * 104_729) % 173);
                stroke(f64::from(1000 - i), 255.0, 255.0, x, y)
            })
            .collect();
        let tuning = Tuning::default();
        let sorted = score_and_sort(strokes);

        // Plain vector walk over the same window.
        let mut pool = sorted.clone();
        let mut expected = vec![pool.remove(0)];
        while !pool.is_empty() {
            let Some(from) = expected.last().map(|s| s.centroid) else {
                unreachable!()
            };
            let (best, _) = pool
                .iter()
                .take(tuning.lookahead_window)
                .enumerate()
                .map(|(i, s)| (i, from.distance(s.centroid) + i as f64 * tuning.window_index_penalty))
                .fold((0, f64::INFINITY), |acc, c| if c.1 < acc.1 { c } else { acc });
            expected.push(pool.remove(best));
        }

        let ordered = StrokeOrderKind::LocalityWindow.order(sorted, &tuning);
        assert_eq!(ordered.len(), 400);
        let got: Vec<Point> = ordered.iter().map(|s| s.centroid).collect();
        let want: Vec<Point> = expected.iter().map(|s| s.centroid).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn strength_only_keeps_goodness_order() {
        let strokes = vec![
            stroke(10.0, 255.0, 255.0, 0.0, 0.0),
            stroke(30.0, 255.0, 255.0, 100.0, 0.0),
            stroke(20.0, 255.0, 255.0, 1.0, 0.0),
        ];
        let ordered = rank_strokes(strokes, StrokeOrderKind::StrengthOnly, &Tuning::default());
        assert!(ordered.windows(2).all(|w| w[0].goodness >= w[1].goodness));
    }

    #[test]
    fn order_kind_display_and_default() {
        assert_eq!(StrokeOrderKind::default(), StrokeOrderKind::LocalityWindow);
        assert_eq!(StrokeOrderKind::StrengthOnly.to_string(), "StrengthOnly");
    }
}
