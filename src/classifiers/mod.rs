//! Geometric chart pattern classifiers
//!
//! Each classifier is an independent predicate over one scan position:
//! it assembles its pivot window from the precomputed [`PivotContext`],
//! fits the trend lines it needs, and either emits a
//! [`crate::PatternMatch`] or returns `None`.
//!
//! # Pattern Families
//!
//! - **Triangles (3)**: symmetric, ascending, descending
//! - **Channels (2)**: flag (parallel), wedge (converging)
//! - **Reversals (6)**: double/triple top and bottom, head-and-shoulders
//!   and its inverse
//! - **Curvature (1)**: rounding bottom

use crate::{pivots::PriceField, OHLCVExt, Pivot, PivotKind, OHLCV};

/// Generate `with_defaults()` -> `Self::default()` for multiple classifier types.
macro_rules! impl_with_defaults {
  ($($classifier:ty),* $(,)?) => {
    $(impl $classifier {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod channels;
pub mod reversals;
pub mod rounding;
pub mod triangles;

// Re-export all classifiers for convenience
pub use channels::*;
pub use reversals::*;
pub use rounding::*;
pub use triangles::*;

// ============================================================
// SHARED WINDOW ASSEMBLY
// ============================================================

/// Collect pivot highs and lows from `marks` over `start..=end`.
///
/// `High` marks contribute a pivot priced by `high_value(field)`, `Low`
/// marks by `low_value(field)`; `Both` marks (flat neighborhoods) are
/// skipped. Out-of-range positions are ignored rather than panicking, so
/// a window clipped by the series edge simply yields fewer pivots.
pub fn window_pivots<T: OHLCV>(
    bars: &[T],
    marks: &[PivotKind],
    start: usize,
    end: usize,
    field: PriceField,
) -> (Vec<Pivot>, Vec<Pivot>) {
    let mut highs = Vec::new();
    let mut lows = Vec::new();

    let stop = end.min(bars.len().saturating_sub(1)).min(marks.len().saturating_sub(1));
    if bars.is_empty() || marks.is_empty() || start > stop {
        return (highs, lows);
    }

    for i in start..=stop {
        match marks[i] {
            PivotKind::High => highs.push(Pivot {
                index: i,
                price: bars[i].high_value(field),
                kind: PivotKind::High,
            }),
            PivotKind::Low => lows.push(Pivot {
                index: i,
                price: bars[i].low_value(field),
                kind: PivotKind::Low,
            }),
            _ => {}
        }
    }

    (highs, lows)
}

/// Split pivots into parallel (x, y) arrays for line fitting
pub fn xs_ys(pivots: &[Pivot]) -> (Vec<f64>, Vec<f64>) {
    let xs = pivots.iter().map(|p| p.index as f64).collect();
    let ys = pivots.iter().map(|p| p.price).collect();
    (xs, ys)
}

/// Merge two index-sorted pivot lists into one, sorted by index
pub fn merge_pivots(highs: Vec<Pivot>, lows: Vec<Pivot>) -> Vec<Pivot> {
    let mut merged = highs;
    merged.extend(lows);
    merged.sort_by_key(|p| p.index);
    merged
}

/// True when `pivots` has at least one entry strictly before and one
/// strictly after `center` (centered-window patterns need material on
/// both sides of the candidate bar).
pub fn flanks_center(pivots: &[Pivot], center: usize) -> bool {
    pivots.iter().any(|p| p.index < center) && pivots.iter().any(|p| p.index > center)
}

/// Fetch the kind-mark at `index` of the context vector backing a
/// classifier, treating a missing or mismatched context as no mark.
#[inline]
pub(crate) fn mark_at(marks: &[PivotKind], index: usize) -> PivotKind {
    marks.get(index).copied().unwrap_or(PivotKind::None)
}

/// Shared guard for trailing-window classifiers: the scan index must have
/// a full lookback behind it plus the warmup bars in front of the series.
#[inline]
pub(crate) fn trailing_window_start(
    index: usize,
    series_len: usize,
    lookback: usize,
    warmup: usize,
) -> Option<usize> {
    if index >= series_len || index < lookback + warmup {
        return None;
    }
    Some(index - lookback)
}

/// Trailing pivot window with both trend lines fitted.
pub(crate) struct TrailingFit {
    pub start: usize,
    pub upper: crate::fit::TrendLine,
    pub lower: crate::fit::TrendLine,
    pub highs: Vec<Pivot>,
    pub lows: Vec<Pivot>,
}

/// Assemble the trailing window ending at `index` and fit a line through
/// its pivot highs and another through its pivot lows. Too few pivots or
/// a degenerate fit is a no-match, not an error.
pub(crate) fn fit_trailing<T: OHLCV>(
    bars: &[T],
    marks: &[PivotKind],
    index: usize,
    lookback: usize,
    warmup: usize,
    min_pivots: usize,
    field: PriceField,
) -> Option<TrailingFit> {
    let start = trailing_window_start(index, bars.len(), lookback, warmup)?;
    let (highs, lows) = window_pivots(bars, marks, start, index, field);
    if highs.len() < min_pivots || lows.len() < min_pivots {
        return None;
    }

    let (hx, hy) = xs_ys(&highs);
    let (lx, ly) = xs_ys(&lows);
    let upper = crate::fit::fit_line(&hx, &hy).ok()?;
    let lower = crate::fit::fit_line(&lx, &ly).ok()?;

    Some(TrailingFit { start, upper, lower, highs, lows })
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Bar {
        h: f64,
        l: f64,
        c: f64,
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.c
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }
    }

    #[test]
    fn test_window_pivots_skips_both() {
        let bars = vec![Bar { h: 10.0, l: 9.0, c: 9.5 }; 5];
        let marks = vec![
            PivotKind::None,
            PivotKind::High,
            PivotKind::Both,
            PivotKind::Low,
            PivotKind::None,
        ];

        let (highs, lows) = window_pivots(&bars, &marks, 0, 4, PriceField::HighLow);
        assert_eq!(highs.len(), 1);
        assert_eq!(highs[0].index, 1);
        assert_eq!(highs[0].price, 10.0);
        assert_eq!(lows.len(), 1);
        assert_eq!(lows[0].index, 3);
        assert_eq!(lows[0].price, 9.0);
    }

    #[test]
    fn test_window_pivots_close_field() {
        let bars = vec![Bar { h: 10.0, l: 9.0, c: 9.5 }; 3];
        let marks = vec![PivotKind::High, PivotKind::Low, PivotKind::None];

        let (highs, lows) = window_pivots(&bars, &marks, 0, 2, PriceField::Close);
        assert_eq!(highs[0].price, 9.5);
        assert_eq!(lows[0].price, 9.5);
    }

    #[test]
    fn test_window_pivots_clipped_range() {
        let bars = vec![Bar { h: 10.0, l: 9.0, c: 9.5 }; 3];
        let marks = vec![PivotKind::High; 3];

        // End past the series clips instead of panicking.
        let (highs, _) = window_pivots(&bars, &marks, 1, 99, PriceField::HighLow);
        assert_eq!(highs.len(), 2);

        let (highs, lows) = window_pivots(&bars, &marks, 5, 99, PriceField::HighLow);
        assert!(highs.is_empty() && lows.is_empty());
    }

    #[test]
    fn test_merge_pivots_sorted() {
        let highs = vec![
            Pivot { index: 4, price: 1.0, kind: PivotKind::High },
            Pivot { index: 9, price: 1.0, kind: PivotKind::High },
        ];
        let lows = vec![
            Pivot { index: 2, price: 0.5, kind: PivotKind::Low },
            Pivot { index: 7, price: 0.5, kind: PivotKind::Low },
        ];

        let merged = merge_pivots(highs, lows);
        let idx: Vec<usize> = merged.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![2, 4, 7, 9]);
    }

    #[test]
    fn test_flanks_center() {
        let pivots = vec![
            Pivot { index: 3, price: 1.0, kind: PivotKind::Low },
            Pivot { index: 8, price: 1.0, kind: PivotKind::Low },
        ];
        assert!(flanks_center(&pivots, 5));
        assert!(!flanks_center(&pivots, 3));
        assert!(!flanks_center(&pivots, 9));
    }

    #[test]
    fn test_with_defaults_matches_default() {
        fn same<T: serde::Serialize>(a: &T, b: &T) -> bool {
            serde_json::to_string(a).unwrap() == serde_json::to_string(b).unwrap()
        }

        assert!(same(&SymmetricTriangleClassifier::with_defaults(), &Default::default()));
        assert!(same(&AscendingTriangleClassifier::with_defaults(), &Default::default()));
        assert!(same(&DescendingTriangleClassifier::with_defaults(), &Default::default()));
        assert!(same(&FlagClassifier::with_defaults(), &Default::default()));
        assert!(same(&WedgeClassifier::with_defaults(), &Default::default()));
        assert!(same(&DoubleTopClassifier::with_defaults(), &Default::default()));
        assert!(same(&DoubleBottomClassifier::with_defaults(), &Default::default()));
        assert!(same(&TripleTopClassifier::with_defaults(), &Default::default()));
        assert!(same(&TripleBottomClassifier::with_defaults(), &Default::default()));
        assert!(same(&HeadAndShouldersClassifier::with_defaults(), &Default::default()));
        assert!(same(
            &InverseHeadAndShouldersClassifier::with_defaults(),
            &Default::default()
        ));
        assert!(same(&RoundingBottomClassifier::with_defaults(), &Default::default()));
    }

    #[test]
    fn test_trailing_window_start() {
        assert_eq!(trailing_window_start(30, 100, 20, 10), Some(10));
        assert_eq!(trailing_window_start(29, 100, 20, 10), None);
        assert_eq!(trailing_window_start(100, 100, 20, 10), None);
    }
}
