//! Horizontal support and resistance level extraction.
//!
//! A level is a pivot bar whose low (support) or high (resistance) acted
//! as a price floor or ceiling for its neighborhood. Extraction sweeps
//! the series with the same window-comparison pivot test the classifiers
//! use, then skips a cooldown stretch after each confirmed level so one
//! congestion zone does not emit a cluster of near-identical levels.

use crate::pivots::{PivotDetector, PriceField};
use crate::{Period, PivotKind, OHLCV};

/// Whether a level bounds price from below or above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LevelKind {
    Support,
    Resistance,
}

/// One horizontal level: the bar that confirmed it and its price.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Level {
    /// Bar index where the level was confirmed
    pub index: usize,
    /// Low of the bar for support, high for resistance
    pub price: f64,
    pub kind: LevelKind,
}

impl Level {
    #[inline]
    pub fn is_support(&self) -> bool {
        self.kind == LevelKind::Support
    }

    #[inline]
    pub fn is_resistance(&self) -> bool {
        self.kind == LevelKind::Resistance
    }
}

/// Support/resistance extractor.
///
/// Candidates are pivot bars under an asymmetric `(n1, n2)` window on the
/// high/low fields. Bars within `n1 + n2` of either series edge are never
/// candidates, and after a hit the scan jumps `cooldown` bars forward. A
/// flat neighborhood qualifies both ways and is recorded as support, the
/// order the tests run in.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LevelExtractor {
    /// Bars to the left of a candidate
    pub n1: Period,
    /// Bars to the right of a candidate
    pub n2: Period,
    /// Bars skipped after a confirmed level before scanning resumes
    pub cooldown: Period,
}

impl Default for LevelExtractor {
    fn default() -> Self {
        Self {
            n1: Period::new_const(3),
            n2: Period::new_const(2),
            cooldown: Period::new_const(10),
        }
    }
}

impl LevelExtractor {
    pub fn new(n1: Period, n2: Period, cooldown: Period) -> Self {
        Self { n1, n2, cooldown }
    }

    /// Extract every level of the series, sorted by index.
    pub fn extract<T: OHLCV>(&self, bars: &[T]) -> Vec<Level> {
        let detector = PivotDetector::new(self.n1, self.n2, PriceField::HighLow);
        let margin = self.n1.get() + self.n2.get();
        let cooldown = self.cooldown.get();

        let mut levels = Vec::new();
        let mut i = margin + 1;
        while i + margin < bars.len() {
            match detector.classify(bars, i) {
                PivotKind::Low | PivotKind::Both => {
                    levels.push(Level {
                        index: i,
                        price: bars[i].low(),
                        kind: LevelKind::Support,
                    });
                    i += cooldown;
                }
                PivotKind::High => {
                    levels.push(Level {
                        index: i,
                        price: bars[i].high(),
                        kind: LevelKind::Resistance,
                    });
                    i += cooldown;
                }
                PivotKind::None => i += 1,
            }
        }

        levels
    }
}

/// The `(support, resistance)` pair confirmed closest together in time,
/// or `None` unless at least one level of each kind exists.
///
/// The nearest pair is the one most likely to describe a single trading
/// range rather than two unrelated regimes.
pub fn closest_pair(levels: &[Level]) -> Option<(Level, Level)> {
    let mut best: Option<(usize, Level, Level)> = None;

    for sup in levels.iter().filter(|l| l.is_support()) {
        for res in levels.iter().filter(|l| l.is_resistance()) {
            let distance = sup.index.abs_diff(res.index);
            if best.map_or(true, |(d, _, _)| distance < d) {
                best = Some((distance, *sup, *res));
            }
        }
    }

    best.map(|(_, sup, res)| (sup, res))
}

// ============================================================
// TESTS
// ============================================================
