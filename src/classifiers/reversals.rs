//! Reversal patterns: double and triple tops/bottoms, head-and-shoulders
//!
//! The double patterns read the refined close-extrema sequence directly;
//! the triples and head-and-shoulders work on short-arm pivot marks over
//! a window centered on the candidate bar, so they can only fire once
//! the right-hand side of the window exists.

use std::collections::HashMap;

use crate::params::{get_period, get_tolerance, ParamMeta, ParameterizedClassifier};
use crate::pivots::{PivotDetector, PriceField};
use crate::{
    fit, Direction, PatternClassifier, PatternId, PatternMatch, Period, Pivot, PivotContext,
    Result, Tolerance, OHLCV,
};

use super::{flanks_center, mark_at, window_pivots, xs_ys};

impl_with_defaults!(
    DoubleTopClassifier,
    DoubleBottomClassifier,
    TripleTopClassifier,
    TripleBottomClassifier,
    HeadAndShouldersClassifier,
    InverseHeadAndShouldersClassifier,
);

/// Position of the highest-priced pivot (first occurrence on ties)
fn arg_max_price(pivots: &[Pivot]) -> usize {
    let mut best = 0;
    for (i, p) in pivots.iter().enumerate() {
        if p.price > pivots[best].price {
            best = i;
        }
    }
    best
}

/// Position of the lowest-priced pivot (first occurrence on ties)
fn arg_min_price(pivots: &[Pivot]) -> usize {
    let mut best = 0;
    for (i, p) in pivots.iter().enumerate() {
        if p.price < pivots[best].price {
            best = i;
        }
    }
    best
}

fn sorted_by_index(mut pivots: Vec<Pivot>) -> Vec<Pivot> {
    pivots.sort_by_key(|p| p.index);
    pivots
}

// ============================================================
// DOUBLE TOP / DOUBLE BOTTOM
// ============================================================

/// Double top: five consecutive refined extrema forming
/// trough-peak-trough-peak-trough with the first peak above the second.
///
/// Fires at the bar of the fifth extremum; the whole figure must play
/// out within `max_span` bars.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DoubleTopClassifier {
    /// Maximum bars between the first and fifth extremum
    pub max_span: Period,
}

impl Default for DoubleTopClassifier {
    fn default() -> Self {
        Self { max_span: Period::new_const(50) }
    }
}

impl PatternClassifier for DoubleTopClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_DOUBLETOP")
    }

    fn min_bars(&self) -> usize {
        5
    }

    fn detect<T: OHLCV>(
        &self,
        _bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let pos = ctx.extremum_position(index)?;
        if pos < 4 {
            return None;
        }

        let w = &ctx.extrema[pos - 4..=pos];
        if w[4].index - w[0].index > self.max_span.get() {
            return None;
        }
        let alternating = w[0].kind.is_low()
            && w[1].kind.is_high()
            && w[2].kind.is_low()
            && w[3].kind.is_high()
            && w[4].kind.is_low();
        if !alternating {
            return None;
        }

        let (a, b, c, d, e) = (w[0].price, w[1].price, w[2].price, w[3].price, w[4].price);
        if !(a < b && a < d && c < b && c < d && e < b && e < d && b > d) {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bearish,
            anchor: index,
            start: w[0].index,
            end: w[4].index,
            upper: None,
            lower: None,
            pivots: w.to_vec(),
        })
    }
}

impl ParameterizedClassifier for DoubleTopClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 1] = [ParamMeta::period(
            "max_span",
            50.0,
            (20.0, 100.0, 10.0),
            "Maximum bars across the five extrema",
        )];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self { max_span: get_period(params, "max_span", 50)? })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_DOUBLETOP"
    }
}

/// Double bottom: the mirrored figure, peak-trough-peak-trough-peak with
/// the first trough below the second.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DoubleBottomClassifier {
    pub max_span: Period,
}

impl Default for DoubleBottomClassifier {
    fn default() -> Self {
        Self { max_span: Period::new_const(50) }
    }
}

impl PatternClassifier for DoubleBottomClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_DOUBLEBOTTOM")
    }

    fn min_bars(&self) -> usize {
        5
    }

    fn detect<T: OHLCV>(
        &self,
        _bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let pos = ctx.extremum_position(index)?;
        if pos < 4 {
            return None;
        }

        let w = &ctx.extrema[pos - 4..=pos];
        if w[4].index - w[0].index > self.max_span.get() {
            return None;
        }
        let alternating = w[0].kind.is_high()
            && w[1].kind.is_low()
            && w[2].kind.is_high()
            && w[3].kind.is_low()
            && w[4].kind.is_high();
        if !alternating {
            return None;
        }

        let (a, b, c, d, e) = (w[0].price, w[1].price, w[2].price, w[3].price, w[4].price);
        if !(a > b && a > d && c > b && c > d && e > b && e > d && b < d) {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bullish,
            anchor: index,
            start: w[0].index,
            end: w[4].index,
            upper: None,
            lower: None,
            pivots: w.to_vec(),
        })
    }
}

impl ParameterizedClassifier for DoubleBottomClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 1] = [ParamMeta::period(
            "max_span",
            50.0,
            (20.0, 100.0, 10.0),
            "Maximum bars across the five extrema",
        )];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self { max_span: get_period(params, "max_span", 50)? })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_DOUBLEBOTTOM"
    }
}

// ============================================================
// TRIPLE TOP / TRIPLE BOTTOM
// ============================================================

/// Triple top: three short-arm pivot highs of near-equal price, the
/// middle one the window maximum, with intervening troughs and a
/// near-flat support line through the window's lows.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TripleTopClassifier {
    /// Half-width of the centered window
    pub back: Period,
    /// Extra bars at the series start that never anchor a match
    pub warmup: Period,
    /// Maximum price difference between the three tops
    pub equal_tolerance: Tolerance,
    /// Maximum absolute slope of the support line
    pub flat_tolerance: Tolerance,
}

impl Default for TripleTopClassifier {
    fn default() -> Self {
        Self {
            back: Period::new_const(14),
            warmup: Period::new_const(20),
            equal_tolerance: Tolerance::new_const(1e-3),
            flat_tolerance: Tolerance::new_const(1e-4),
        }
    }
}

impl PatternClassifier for TripleTopClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_TRIPLETOP")
    }

    fn min_bars(&self) -> usize {
        2 * self.back.get() + self.warmup.get() + 1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let back = self.back.get();
        if index < back + self.warmup.get() || index + back > bars.len() {
            return None;
        }

        let (maxima, minima) =
            window_pivots(bars, &ctx.short_marks, index - back, index + back - 1, PriceField::HighLow);
        if !flanks_center(&maxima, index) || !flanks_center(&minima, index) {
            return None;
        }

        let head = arg_max_price(&maxima);
        if head == 0 || head + 1 >= maxima.len() || minima.len() < 2 {
            return None;
        }
        let (left, top, right) = (maxima[head - 1], maxima[head], maxima[head + 1]);

        let tol = self.equal_tolerance.get();
        if (left.price - top.price).abs() >= tol || (right.price - top.price).abs() >= tol {
            return None;
        }

        // First trough after the left top, second after the middle and
        // right tops.
        if !(minima[0].index > left.index
            && minima[1].index > top.index
            && minima[1].index > right.index)
        {
            return None;
        }

        let (mx, my) = xs_ys(&minima);
        let support = fit::fit_line(&mx, &my).ok()?;
        if support.slope.abs() > self.flat_tolerance.get() {
            return None;
        }
        let (hx, hy) = xs_ys(&maxima);
        let resistance = fit::fit_line(&hx, &hy).ok()?;

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bearish,
            anchor: index,
            start: index - back,
            end: index + back - 1,
            upper: Some(resistance),
            lower: Some(support),
            pivots: sorted_by_index(vec![left, top, right, minima[0], minima[1]]),
        })
    }
}

impl ParameterizedClassifier for TripleTopClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 4] = [
            ParamMeta::period("back", 14.0, (8.0, 30.0, 2.0), "Centered window half-width"),
            ParamMeta::period("warmup", 20.0, (0.0, 40.0, 5.0), "Bars skipped at series start"),
            ParamMeta::tolerance(
                "equal_tolerance",
                1e-3,
                (1e-4, 1e-2, 1e-4),
                "Maximum price spread of the three tops",
            ),
            ParamMeta::tolerance(
                "flat_tolerance",
                1e-4,
                (1e-5, 1e-3, 1e-5),
                "Maximum support line slope",
            ),
        ];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            back: get_period(params, "back", 14)?,
            warmup: get_period(params, "warmup", 20)?,
            equal_tolerance: get_tolerance(params, "equal_tolerance", 1e-3)?,
            flat_tolerance: get_tolerance(params, "flat_tolerance", 1e-4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_TRIPLETOP"
    }
}

/// Triple bottom: the mirrored figure over short-arm pivot lows, with
/// the second peak strictly between the middle and right troughs and a
/// near-flat resistance line through the window's highs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TripleBottomClassifier {
    pub back: Period,
    pub warmup: Period,
    pub equal_tolerance: Tolerance,
    pub flat_tolerance: Tolerance,
}

impl Default for TripleBottomClassifier {
    fn default() -> Self {
        Self {
            back: Period::new_const(14),
            warmup: Period::new_const(20),
            equal_tolerance: Tolerance::new_const(1e-3),
            flat_tolerance: Tolerance::new_const(1e-4),
        }
    }
}

impl PatternClassifier for TripleBottomClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_TRIPLEBOTTOM")
    }

    fn min_bars(&self) -> usize {
        2 * self.back.get() + self.warmup.get() + 1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let back = self.back.get();
        if index < back + self.warmup.get() || index + back > bars.len() {
            return None;
        }

        let (maxima, minima) =
            window_pivots(bars, &ctx.short_marks, index - back, index + back - 1, PriceField::HighLow);
        if !flanks_center(&maxima, index) || !flanks_center(&minima, index) {
            return None;
        }

        let head = arg_min_price(&minima);
        if head == 0 || head + 1 >= minima.len() || maxima.len() < 3 {
            return None;
        }
        let (left, bottom, right) = (minima[head - 1], minima[head], minima[head + 1]);

        let tol = self.equal_tolerance.get();
        if (left.price - bottom.price).abs() >= tol || (right.price - bottom.price).abs() >= tol {
            return None;
        }

        // Peaks interleave the troughs; the second peak sits strictly
        // between the middle and right troughs.
        if !(maxima[0].index > left.index
            && maxima[1].index > bottom.index
            && maxima[1].index < right.index
            && maxima[2].index > right.index)
        {
            return None;
        }

        let (hx, hy) = xs_ys(&maxima);
        let resistance = fit::fit_line(&hx, &hy).ok()?;
        if resistance.slope.abs() > self.flat_tolerance.get() {
            return None;
        }
        let (mx, my) = xs_ys(&minima);
        let support = fit::fit_line(&mx, &my).ok()?;

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bullish,
            anchor: index,
            start: index - back,
            end: index + back - 1,
            upper: Some(resistance),
            lower: Some(support),
            pivots: sorted_by_index(vec![left, bottom, right, maxima[0], maxima[1]]),
        })
    }
}

impl ParameterizedClassifier for TripleBottomClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 4] = [
            ParamMeta::period("back", 14.0, (8.0, 30.0, 2.0), "Centered window half-width"),
            ParamMeta::period("warmup", 20.0, (0.0, 40.0, 5.0), "Bars skipped at series start"),
            ParamMeta::tolerance(
                "equal_tolerance",
                1e-3,
                (1e-4, 1e-2, 1e-4),
                "Maximum price spread of the three bottoms",
            ),
            ParamMeta::tolerance(
                "flat_tolerance",
                1e-4,
                (1e-5, 1e-3, 1e-5),
                "Maximum resistance line slope",
            ),
        ];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            back: get_period(params, "back", 14)?,
            warmup: get_period(params, "warmup", 20)?,
            equal_tolerance: get_tolerance(params, "equal_tolerance", 1e-3)?,
            flat_tolerance: get_tolerance(params, "flat_tolerance", 1e-4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_TRIPLEBOTTOM"
    }
}

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Head-and-shoulders: the candidate bar is a pivot high under both the
/// short and a long arm, the window's tallest peak rises above both its
/// neighboring peaks by `min_prominence`, and the neckline through the
/// window's troughs is near-flat.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HeadAndShouldersClassifier {
    /// Half-width of the centered window
    pub back: Period,
    /// Extra bars at the series start that never anchor a match
    pub warmup: Period,
    /// Arm length of the long pivot confirmation at the candidate bar
    pub long_arm: Period,
    /// Minimum height of the head above each shoulder
    pub min_prominence: Tolerance,
    /// Maximum absolute slope of the neckline
    pub flat_tolerance: Tolerance,
}

impl Default for HeadAndShouldersClassifier {
    fn default() -> Self {
        Self {
            back: Period::new_const(14),
            warmup: Period::new_const(20),
            long_arm: Period::new_const(15),
            min_prominence: Tolerance::new_const(1.5e-3),
            flat_tolerance: Tolerance::new_const(1e-4),
        }
    }
}

impl PatternClassifier for HeadAndShouldersClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_HEADSHOULDERS")
    }

    fn min_bars(&self) -> usize {
        2 * self.long_arm.get().max(self.back.get()) + 1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let back = self.back.get();
        if index < back + self.warmup.get() || index + back > bars.len() {
            return None;
        }

        if !mark_at(&ctx.short_marks, index).is_high() {
            return None;
        }
        let long = PivotDetector::new(self.long_arm, self.long_arm, PriceField::HighLow);
        if !long.classify(bars, index).is_high() {
            return None;
        }

        let (maxima, minima) =
            window_pivots(bars, &ctx.short_marks, index - back, index + back - 1, PriceField::HighLow);
        if !flanks_center(&maxima, index) || !flanks_center(&minima, index) {
            return None;
        }

        let head = arg_max_price(&maxima);
        if head == 0 || head + 1 >= maxima.len() {
            return None;
        }
        let prominence = self.min_prominence.get();
        if !(maxima[head].price - maxima[head - 1].price > prominence
            && maxima[head].price - maxima[head + 1].price > prominence)
        {
            return None;
        }

        let (mx, my) = xs_ys(&minima);
        let neckline = fit::fit_line(&mx, &my).ok()?;
        if neckline.slope.abs() > self.flat_tolerance.get() {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bearish,
            anchor: index,
            start: index - back,
            end: index + back - 1,
            upper: None,
            lower: Some(neckline),
            pivots: sorted_by_index(vec![
                maxima[head - 1],
                maxima[head],
                maxima[head + 1],
                minima[0],
                minima[1],
            ]),
        })
    }
}

impl ParameterizedClassifier for HeadAndShouldersClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 5] = [
            ParamMeta::period("back", 14.0, (8.0, 30.0, 2.0), "Centered window half-width"),
            ParamMeta::period("warmup", 20.0, (0.0, 40.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("long_arm", 15.0, (10.0, 30.0, 5.0), "Long pivot confirmation arm"),
            ParamMeta::tolerance(
                "min_prominence",
                1.5e-3,
                (5e-4, 1e-2, 5e-4),
                "Head height above each shoulder",
            ),
            ParamMeta::tolerance(
                "flat_tolerance",
                1e-4,
                (1e-5, 1e-3, 1e-5),
                "Maximum neckline slope",
            ),
        ];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            back: get_period(params, "back", 14)?,
            warmup: get_period(params, "warmup", 20)?,
            long_arm: get_period(params, "long_arm", 15)?,
            min_prominence: get_tolerance(params, "min_prominence", 1.5e-3)?,
            flat_tolerance: get_tolerance(params, "flat_tolerance", 1e-4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_HEADSHOULDERS"
    }
}

/// Inverse head-and-shoulders: mirrored over pivot lows, with the
/// neckline through the window's peaks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InverseHeadAndShouldersClassifier {
    pub back: Period,
    pub warmup: Period,
    pub long_arm: Period,
    pub min_prominence: Tolerance,
    pub flat_tolerance: Tolerance,
}

impl Default for InverseHeadAndShouldersClassifier {
    fn default() -> Self {
        Self {
            back: Period::new_const(14),
            warmup: Period::new_const(20),
            long_arm: Period::new_const(15),
            min_prominence: Tolerance::new_const(1.5e-3),
            flat_tolerance: Tolerance::new_const(1e-4),
        }
    }
}

impl PatternClassifier for InverseHeadAndShouldersClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_INVHEADSHOULDERS")
    }

    fn min_bars(&self) -> usize {
        2 * self.long_arm.get().max(self.back.get()) + 1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let back = self.back.get();
        if index < back + self.warmup.get() || index + back > bars.len() {
            return None;
        }

        if !mark_at(&ctx.short_marks, index).is_low() {
            return None;
        }
        let long = PivotDetector::new(self.long_arm, self.long_arm, PriceField::HighLow);
        if !long.classify(bars, index).is_low() {
            return None;
        }

        let (maxima, minima) =
            window_pivots(bars, &ctx.short_marks, index - back, index + back - 1, PriceField::HighLow);
        if !flanks_center(&maxima, index) || !flanks_center(&minima, index) {
            return None;
        }

        let head = arg_min_price(&minima);
        if head == 0 || head + 1 >= minima.len() {
            return None;
        }
        let prominence = self.min_prominence.get();
        if !(minima[head - 1].price - minima[head].price > prominence
            && minima[head + 1].price - minima[head].price > prominence)
        {
            return None;
        }

        let (hx, hy) = xs_ys(&maxima);
        let neckline = fit::fit_line(&hx, &hy).ok()?;
        if neckline.slope.abs() > self.flat_tolerance.get() {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bullish,
            anchor: index,
            start: index - back,
            end: index + back - 1,
            upper: Some(neckline),
            lower: None,
            pivots: sorted_by_index(vec![
                minima[head - 1],
                minima[head],
                minima[head + 1],
                maxima[0],
                maxima[1],
            ]),
        })
    }
}

impl ParameterizedClassifier for InverseHeadAndShouldersClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        HeadAndShouldersClassifier::param_meta()
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            back: get_period(params, "back", 14)?,
            warmup: get_period(params, "warmup", 20)?,
            long_arm: get_period(params, "long_arm", 15)?,
            min_prominence: get_tolerance(params, "min_prominence", 1.5e-3)?,
            flat_tolerance: get_tolerance(params, "flat_tolerance", 1e-4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_INVHEADSHOULDERS"
    }
}

// ============================================================
// TESTS
// ============================================================
