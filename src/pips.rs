//! Perceptually Important Points (PIPS) curve reduction.
//!
//! Greedy refinement: start from the two endpoints, then repeatedly add
//! the interior point with the greatest distance from the chord of its
//! current segment, until `n_pips` points are selected. Distance is
//! pluggable via [`DistanceMeasure`].

use crate::{PatternError, Result};

/// How far a point is from the chord of its segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DistanceMeasure {
    /// Sum of the straight-line distances to both chord endpoints.
    ///
    /// Favors points far from both anchors rather than far from the chord
    /// itself; kept as a selectable measure because existing calibrations
    /// were tuned against it.
    Euclidean,
    /// Perpendicular distance to the chord
    #[default]
    Perpendicular,
    /// Vertical distance to the chord
    Vertical,
}

impl DistanceMeasure {
    /// Distance of `(x, y)` from the chord through `(x1, y1)` and `(x2, y2)`.
    fn distance(self, x: f64, y: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
        match self {
            DistanceMeasure::Euclidean => {
                let d1 = ((x - x1).powi(2) + (y - y1).powi(2)).sqrt();
                let d2 = ((x - x2).powi(2) + (y - y2).powi(2)).sqrt();
                d1 + d2
            }
            DistanceMeasure::Perpendicular => {
                let slope = (y2 - y1) / (x2 - x1);
                let intercept = y1 - slope * x1;
                (slope * x + intercept - y).abs() / (slope * slope + 1.0).sqrt()
            }
            DistanceMeasure::Vertical => {
                let slope = (y2 - y1) / (x2 - x1);
                let intercept = y1 - slope * x1;
                (slope * x + intercept - y).abs()
            }
        }
    }
}

/// Selected PIPS, parallel arrays sorted by index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PipsResult {
    /// Strictly increasing positions into the source series
    pub indices: Vec<usize>,
    /// Source values at those positions
    pub values: Vec<f64>,
}

impl PipsResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Reduce `data` to its `n_pips` most important points.
///
/// The endpoints are always the first two selections, so the result always
/// contains `0` and `data.len() - 1`; indices come back strictly
/// increasing with exactly `n_pips` entries.
pub fn find_pips(data: &[f64], n_pips: usize, measure: DistanceMeasure) -> Result<PipsResult> {
    if n_pips < 2 {
        return Err(PatternError::InvalidValue("n_pips must be >= 2"));
    }
    if n_pips > data.len() {
        return Err(PatternError::InsufficientData {
            need: n_pips,
            got: data.len(),
        });
    }

    let mut indices = vec![0, data.len() - 1];

    while indices.len() < n_pips {
        // Global maximum over the interiors of every current segment. The
        // best-tracking starts empty so flat (zero-distance) data still
        // selects a point each round and the exact-count invariant holds.
        let mut best: Option<(f64, usize, usize)> = None;

        for seg in 0..indices.len() - 1 {
            let left = indices[seg];
            let right = indices[seg + 1];
            let (x1, y1) = (left as f64, data[left]);
            let (x2, y2) = (right as f64, data[right]);

            for i in left + 1..right {
                let d = measure.distance(i as f64, data[i], x1, y1, x2, y2);
                if best.map_or(true, |(bd, _, _)| d > bd) {
                    best = Some((d, i, seg + 1));
                }
            }
        }

        match best {
            Some((_, index, insert_at)) => indices.insert(insert_at, index),
            // Every segment interior is exhausted; n_pips <= len rules
            // this out, but do not loop forever if it ever happens.
            None => break,
        }
    }

    let values = indices.iter().map(|&i| data[i]).collect();
    Ok(PipsResult { indices, values })
}

/// Total distance of the non-selected points from the PIPS chords.
///
/// With `Vertical` or `Perpendicular` this is the approximation error of
/// the reduced curve; adding pips to a fixed series never increases it.
pub fn approximation_error(data: &[f64], pips: &PipsResult, measure: DistanceMeasure) -> f64 {
    let mut total = 0.0;
    for seg in pips.indices.windows(2) {
        let (left, right) = (seg[0], seg[1]);
        let (x1, y1) = (left as f64, data[left]);
        let (x2, y2) = (right as f64, data[right]);
        for i in left + 1..right {
            total += measure.distance(i as f64, data[i], x1, y1, x2, y2);
        }
    }
    total
}

/// Reusable PIPS extraction configuration.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PipsExtractor {
    pub n_pips: usize,
    pub measure: DistanceMeasure,
}

impl Default for PipsExtractor {
    fn default() -> Self {
        Self {
            n_pips: 5,
            measure: DistanceMeasure::default(),
        }
    }
}

impl PipsExtractor {
    pub fn new(n_pips: usize, measure: DistanceMeasure) -> Self {
        Self { n_pips, measure }
    }

    pub fn extract(&self, data: &[f64]) -> Result<PipsResult> {
        find_pips(data, self.n_pips, self.measure)
    }

    pub fn error(&self, data: &[f64], pips: &PipsResult) -> f64 {
        approximation_error(data, pips, self.measure)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { 0.0 } else { 1.0 } + i as f64 * 0.01)
            .collect()
    }

    #[test]
    fn test_rejects_too_few_pips() {
        let data = zigzag(10);
        assert!(matches!(
            find_pips(&data, 1, DistanceMeasure::Vertical),
            Err(PatternError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_rejects_short_data() {
        let data = zigzag(4);
        assert!(matches!(
            find_pips(&data, 5, DistanceMeasure::Vertical),
            Err(PatternError::InsufficientData { need: 5, got: 4 })
        ));
    }

    #[test]
    fn test_endpoints_always_included() {
        let data = zigzag(30);
        for measure in [
            DistanceMeasure::Euclidean,
            DistanceMeasure::Perpendicular,
            DistanceMeasure::Vertical,
        ] {
            let pips = find_pips(&data, 6, measure).unwrap();
            assert_eq!(pips.indices[0], 0);
            assert_eq!(*pips.indices.last().unwrap(), data.len() - 1);
        }
    }

    #[test]
    fn test_exact_count_and_ordering() {
        let data = zigzag(40);
        let pips = find_pips(&data, 9, DistanceMeasure::Perpendicular).unwrap();
        assert_eq!(pips.len(), 9);
        assert!(pips.indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(pips.values.len(), pips.indices.len());
    }

    #[test]
    fn test_flat_data_still_selects_exact_count() {
        // Every candidate has distance 0; selection must still complete.
        let data = vec![5.0; 25];
        let pips = find_pips(&data, 7, DistanceMeasure::Vertical).unwrap();
        assert_eq!(pips.len(), 7);
        assert!(pips.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_spike_selected_first() {
        let mut data = vec![0.0; 21];
        data[13] = 10.0;
        let pips = find_pips(&data, 3, DistanceMeasure::Vertical).unwrap();
        assert_eq!(pips.indices, vec![0, 13, 20]);
        assert_eq!(pips.values[1], 10.0);
    }

    #[test]
    fn test_n_pips_equals_len() {
        let data = zigzag(6);
        let pips = find_pips(&data, 6, DistanceMeasure::Vertical).unwrap();
        assert_eq!(pips.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    fn max_deviation(data: &[f64], pips: &PipsResult) -> f64 {
        let mut worst: f64 = 0.0;
        for seg in pips.indices.windows(2) {
            let (left, right) = (seg[0], seg[1]);
            let (x1, y1) = (left as f64, data[left]);
            let (x2, y2) = (right as f64, data[right]);
            for i in left + 1..right {
                let d =
                    DistanceMeasure::Vertical.distance(i as f64, data[i], x1, y1, x2, y2);
                worst = worst.max(d);
            }
        }
        worst
    }

    #[test]
    fn test_deviation_shrinks_with_more_pips() {
        // More pips on a smooth series never make the worst chord
        // deviation larger.
        let data: Vec<f64> = (0..64).map(|i| ((i as f64) * 0.25).sin() * 10.0).collect();

        let mut prev = f64::INFINITY;
        for n in 3..11 {
            let pips = find_pips(&data, n, DistanceMeasure::Vertical).unwrap();
            let dev = max_deviation(&data, &pips);
            assert!(dev <= prev + 1e-9, "deviation grew at n_pips = {n}");
            prev = dev;
        }
    }

    #[test]
    fn test_extractor_wrapper() {
        let data = zigzag(20);
        let extractor = PipsExtractor::new(5, DistanceMeasure::Perpendicular);
        let pips = extractor.extract(&data).unwrap();
        assert_eq!(pips.len(), 5);
        assert!(extractor.error(&data, &pips) >= 0.0);
    }
}
