//! Pivot detection and local-extrema finding.
//!
//! Two pivot sources live here:
//!
//! - [`PivotDetector`] - window comparison against every bar in a
//!   `[center - n1, center + n2]` neighborhood. A bar near the series edge
//!   where the neighborhood does not fit is classified [`PivotKind::None`];
//!   that is a defined boundary policy, not an error.
//! - [`ExtremaFinder`] - strict single-bar local extrema, optionally on a
//!   smoothed series, then snapped onto the dominant bar of a wider
//!   neighborhood.

use crate::{OHLCVExt, Period, Pivot, PivotKind, OHLCV};

/// Which price field the pivot comparison reads.
///
/// `HighLow` compares the candidate's low against neighboring lows and its
/// high against neighboring highs. `Close` compares close both ways (used
/// for wedge detection). Same algorithm, different field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PriceField {
    #[default]
    HighLow,
    Close,
}

/// Window-comparison pivot detector
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PivotDetector {
    /// Bars to the left of the candidate
    pub n1: Period,
    /// Bars to the right of the candidate
    pub n2: Period,
    pub field: PriceField,
}

impl PivotDetector {
    pub fn new(n1: Period, n2: Period, field: PriceField) -> Self {
        Self { n1, n2, field }
    }

    /// Classify the bar at `center`.
    ///
    /// Starts from both flags set and clears them against every other bar
    /// in the neighborhood: a higher low anywhere clears the low flag, a
    /// lower high clears the high flag. `Both` survives only over a flat
    /// neighborhood. Pure function of the window.
    pub fn classify<T: OHLCV>(&self, bars: &[T], center: usize) -> PivotKind {
        let n1 = self.n1.get();
        let n2 = self.n2.get();

        if center < n1 || center + n2 >= bars.len() {
            return PivotKind::None;
        }

        let center_low = bars[center].low_value(self.field);
        let center_high = bars[center].high_value(self.field);

        let mut pivot_low = true;
        let mut pivot_high = true;

        for i in (center - n1)..=(center + n2) {
            if i == center {
                continue;
            }
            if center_low > bars[i].low_value(self.field) {
                pivot_low = false;
            }
            if center_high < bars[i].high_value(self.field) {
                pivot_high = false;
            }
        }

        match (pivot_low, pivot_high) {
            (true, true) => PivotKind::Both,
            (true, false) => PivotKind::Low,
            (false, true) => PivotKind::High,
            (false, false) => PivotKind::None,
        }
    }

    /// Classify every bar of the series
    pub fn mark_all<T: OHLCV>(&self, bars: &[T]) -> Vec<PivotKind> {
        (0..bars.len()).map(|i| self.classify(bars, i)).collect()
    }
}

/// Mark strict single-bar local extrema: `High` where the value exceeds
/// both neighbors, `Low` where it is below both. Endpoints are never
/// extrema.
pub fn strict_extrema_marks(values: &[f64]) -> Vec<PivotKind> {
    let mut marks = vec![PivotKind::None; values.len()];
    for i in 1..values.len().saturating_sub(1) {
        if values[i] > values[i - 1] && values[i] > values[i + 1] {
            marks[i] = PivotKind::High;
        } else if values[i] < values[i - 1] && values[i] < values[i + 1] {
            marks[i] = PivotKind::Low;
        }
    }
    marks
}

/// Centered rolling mean of width `period`. Positions where the full
/// window does not fit keep the raw value, so indices stay aligned with
/// the input series.
fn centered_rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let half_left = period / 2;
    let half_right = period - half_left - 1;

    values
        .iter()
        .enumerate()
        .map(|(i, &raw)| {
            if i < half_left || i + half_right >= values.len() {
                return raw;
            }
            let window = &values[i - half_left..=i + half_right];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Strict local-extrema pivot source with neighborhood refinement.
///
/// Raw extrema are single-bar features and land on noise easily; the
/// refinement pass replaces each raw extremum at `i` with the index of the
/// true extreme of `[i - window, i + window)`, drops extrema too close to
/// the series edge for the refinement window, and collapses collisions
/// (two raw extrema snapping to the same bar) into one entry.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ExtremaFinder {
    pub smooth: bool,
    /// Centered rolling-mean width applied before extremum detection
    pub smoothing_period: Period,
    /// Neighborhood half-width of the refinement pass
    pub refine_window: Period,
}

impl Default for ExtremaFinder {
    fn default() -> Self {
        Self {
            smooth: false,
            smoothing_period: Period::new_const(10),
            refine_window: Period::new_const(10),
        }
    }
}

impl ExtremaFinder {
    /// Find refined local extrema of `values`, sorted by index.
    ///
    /// The returned pivots carry the raw (unsmoothed) price at the refined
    /// index and `High`/`Low` kind. When a refined index is claimed by both
    /// a maximum and a minimum (flat stretch), the maximum wins.
    pub fn find_extrema(&self, values: &[f64]) -> Vec<Pivot> {
        let (maxima, minima) = self.find_extrema_split(values);

        let mut merged: Vec<Pivot> = maxima
            .into_iter()
            .map(|i| Pivot {
                index: i,
                price: values[i],
                kind: PivotKind::High,
            })
            .chain(minima.into_iter().map(|i| Pivot {
                index: i,
                price: values[i],
                kind: PivotKind::Low,
            }))
            .collect();

        merged.sort_by_key(|p| p.index);
        merged.dedup_by_key(|p| p.index);
        merged
    }

    /// Find refined maxima and minima indices separately.
    pub fn find_extrema_split(&self, values: &[f64]) -> (Vec<usize>, Vec<usize>) {
        let smoothed;
        let detect: &[f64] = if self.smooth {
            smoothed = centered_rolling_mean(values, self.smoothing_period.get());
            &smoothed
        } else {
            values
        };

        let marks = strict_extrema_marks(detect);
        let window = self.refine_window.get();

        let mut maxima = Vec::new();
        let mut minima = Vec::new();

        for (i, mark) in marks.iter().enumerate() {
            // Refinement needs the full neighborhood; edge extrema are dropped.
            if i <= window || i + window >= values.len() {
                continue;
            }
            let neighborhood = &values[i - window..i + window];
            match mark {
                PivotKind::High => {
                    let offset = arg_max(neighborhood);
                    maxima.push(i - window + offset);
                }
                PivotKind::Low => {
                    let offset = arg_min(neighborhood);
                    minima.push(i - window + offset);
                }
                _ => {}
            }
        }

        maxima.sort_unstable();
        maxima.dedup();
        minima.sort_unstable();
        minima.dedup();

        (maxima, minima)
    }
}

fn arg_max(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn arg_min(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v < values[best] {
            best = i;
        }
    }
    best
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

    fn bar(h: f64, l: f64) -> Bar {
        Bar {
            h,
            l,
            c: (h + l) / 2.0,
        }
    }

    /// V-shape with a peak at 2 and a trough at 6
    fn v_bars() -> Vec<Bar> {
        [
            (101.0, 99.0),
            (103.0, 101.0),
            (105.0, 103.0),
            (103.0, 101.0),
            (101.0, 99.0),
            (99.0, 97.0),
            (97.0, 95.0),
            (99.0, 97.0),
            (101.0, 99.0),
            (103.0, 101.0),
        ]
        .iter()
        .map(|&(h, l)| bar(h, l))
        .collect()
    }

    #[test]
    fn test_pivot_high_detected() {
        let bars = v_bars();
        let det = PivotDetector::new(Period::new_const(2), Period::new_const(2), PriceField::HighLow);
        assert_eq!(det.classify(&bars, 2), PivotKind::High);
    }

    #[test]
    fn test_pivot_low_detected() {
        let bars = v_bars();
        let det = PivotDetector::new(Period::new_const(2), Period::new_const(2), PriceField::HighLow);
        assert_eq!(det.classify(&bars, 6), PivotKind::Low);
    }

    #[test]
    fn test_boundary_returns_none() {
        let bars = v_bars();
        let det = PivotDetector::new(Period::new_const(3), Period::new_const(3), PriceField::HighLow);

        // Window cannot fit on either edge - never an error, never a panic.
        assert_eq!(det.classify(&bars, 0), PivotKind::None);
        assert_eq!(det.classify(&bars, 2), PivotKind::None);
        assert_eq!(det.classify(&bars, bars.len() - 1), PivotKind::None);
        assert_eq!(det.classify(&bars, bars.len() - 3), PivotKind::None);
    }

    #[test]
    fn test_flat_neighborhood_is_both() {
        let bars: Vec<Bar> = (0..9).map(|_| bar(100.0, 98.0)).collect();
        let det = PivotDetector::new(Period::new_const(2), Period::new_const(2), PriceField::HighLow);
        assert_eq!(det.classify(&bars, 4), PivotKind::Both);
    }

    #[test]
    fn test_classify_deterministic() {
        let bars = v_bars();
        let det = PivotDetector::new(Period::new_const(2), Period::new_const(2), PriceField::HighLow);
        let first = det.mark_all(&bars);
        let second = det.mark_all(&bars);
        assert_eq!(first, second);
    }

    #[test]
    fn test_close_field_pivot() {
        // Closes spike at index 3; highs/lows are flat so only the close
        // field sees the pivot.
        let bars: Vec<Bar> = (0..7)
            .map(|i| Bar {
                h: 110.0,
                l: 90.0,
                c: if i == 3 { 105.0 } else { 100.0 },
            })
            .collect();
        let close_det =
            PivotDetector::new(Period::new_const(2), Period::new_const(2), PriceField::Close);
        let hl_det =
            PivotDetector::new(Period::new_const(2), Period::new_const(2), PriceField::HighLow);

        assert_eq!(close_det.classify(&bars, 3), PivotKind::High);
        assert_eq!(hl_det.classify(&bars, 3), PivotKind::Both);
    }

    #[test]
    fn test_strict_extrema_marks() {
        let values = [1.0, 3.0, 2.0, 0.5, 2.5, 2.5];
        let marks = strict_extrema_marks(&values);
        assert_eq!(marks[1], PivotKind::High);
        assert_eq!(marks[3], PivotKind::Low);
        assert_eq!(marks[0], PivotKind::None);
        assert_eq!(marks[4], PivotKind::None); // tie with the right neighbor
    }

    #[test]
    fn test_extrema_refinement_snaps_to_dominant_bar() {
        // Noisy single-bar bump at 5, dominant peak at 8.
        let mut values = vec![0.0; 20];
        values[4] = 0.2;
        values[5] = 0.5;
        values[6] = 0.1;
        values[7] = 0.8;
        values[8] = 1.5;
        values[9] = 0.9;

        let finder = ExtremaFinder {
            smooth: false,
            smoothing_period: Period::new_const(10),
            refine_window: Period::new_const(4),
        };
        let (maxima, _) = finder.find_extrema_split(&values);
        assert!(maxima.contains(&8));
        assert!(!maxima.contains(&5));
    }

    #[test]
    fn test_extrema_collisions_deduplicated() {
        // Two raw maxima close together snap to the same dominant index.
        let mut values = vec![0.0; 24];
        values[8] = 1.0;
        values[9] = 0.4;
        values[10] = 2.0;
        values[11] = 0.4;
        values[12] = 1.0;

        let finder = ExtremaFinder {
            smooth: false,
            smoothing_period: Period::new_const(10),
            refine_window: Period::new_const(4),
        };
        let extrema = finder.find_extrema(&values);
        let at_ten: Vec<_> = extrema.iter().filter(|p| p.index == 10).collect();
        assert_eq!(at_ten.len(), 1);
    }

    #[test]
    fn test_extrema_sorted_by_index() {
        let values: Vec<f64> = (0..60)
            .map(|i| ((i as f64) * 0.7).sin() * 3.0)
            .collect();
        let finder = ExtremaFinder {
            smooth: false,
            smoothing_period: Period::new_const(10),
            refine_window: Period::new_const(3),
        };
        let extrema = finder.find_extrema(&values);
        assert!(extrema.windows(2).all(|w| w[0].index < w[1].index));
    }

    #[test]
    fn test_smoothing_reduces_extrema_count() {
        // Sawtooth noise on a slow sine: smoothing should not increase the
        // number of detected extrema.
        let values: Vec<f64> = (0..120)
            .map(|i| ((i as f64) * 0.1).sin() * 5.0 + if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();

        let raw = ExtremaFinder {
            smooth: false,
            smoothing_period: Period::new_const(10),
            refine_window: Period::new_const(5),
        };
        let smoothed = ExtremaFinder {
            smooth: true,
            ..raw
        };

        let n_raw = raw.find_extrema(&values).len();
        let n_smooth = smoothed.find_extrema(&values).len();
        assert!(n_smooth <= n_raw);
    }
}
