//! Channel patterns: flag (parallel lines) and wedge (converging lines)
//!
//! Both demand two well-correlated lines trending in the same direction;
//! they differ in the slope-ratio band and in the wedge's additional
//! apex test, which requires the lines to meet shortly ahead of the
//! window. The wedge works on close-field pivots, the flag on high/low
//! pivots.

use std::collections::HashMap;

use crate::params::{get_period, get_ratio, get_tolerance, ParamMeta, ParameterizedClassifier};
use crate::pivots::PriceField;
use crate::{
    Direction, PatternClassifier, PatternError, PatternId, PatternMatch, Period, PivotContext,
    Ratio, Result, Tolerance, OHLCV,
};

use super::{fit_trailing, merge_pivots, TrailingFit};

impl_with_defaults!(FlagClassifier, WedgeClassifier);

/// Both lines trend in the same direction with at least `min_slope`
/// magnitude and `min_r` correlation. Returns the shared sign (+1/-1).
fn parallel_trend(f: &TrailingFit, min_slope: f64, min_r: f64) -> Option<f64> {
    if f.lower.r.abs() < min_r || f.upper.r.abs() < min_r {
        return None;
    }
    if f.lower.slope >= min_slope && f.upper.slope >= min_slope {
        Some(1.0)
    } else if f.lower.slope <= -min_slope && f.upper.slope <= -min_slope {
        Some(-1.0)
    } else {
        None
    }
}

// ============================================================
// FLAG
// ============================================================

/// Flag: a tight parallel channel sloping against the prior move.
///
/// A rising channel is read as a bearish flag and a falling channel as a
/// bullish flag; the breakout side ultimately depends on the preceding
/// trend, which is the caller's context.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FlagClassifier {
    pub lookback: Period,
    pub warmup: Period,
    pub min_pivots: Period,
    /// Correlation gate applied to both lines
    pub min_abs_r: Ratio,
    /// Minimum slope magnitude of both lines
    pub min_slope: Tolerance,
    /// Lower bound of the lows/highs slope ratio (exclusive)
    pub ratio_low: Tolerance,
    /// Upper bound of the lows/highs slope ratio (exclusive)
    pub ratio_high: Tolerance,
}

impl Default for FlagClassifier {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            warmup: Period::new_const(10),
            min_pivots: Period::new_const(3),
            min_abs_r: Ratio::new_const(0.9),
            min_slope: Tolerance::new_const(1e-3),
            ratio_low: Tolerance::new_const(0.9),
            ratio_high: Tolerance::new_const(1.05),
        }
    }
}

impl PatternClassifier for FlagClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_FLAG")
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + self.warmup.get() + 1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let f = fit_trailing(
            bars,
            &ctx.marks,
            index,
            self.lookback.get(),
            self.warmup.get(),
            self.min_pivots.get(),
            PriceField::HighLow,
        )?;

        let sign = parallel_trend(&f, self.min_slope.get(), self.min_abs_r.get())?;

        let ratio = f.lower.slope / f.upper.slope;
        if ratio <= self.ratio_low.get() || ratio >= self.ratio_high.get() {
            return None;
        }

        let direction = if sign > 0.0 { Direction::Bearish } else { Direction::Bullish };

        Some(PatternMatch {
            pattern_id: self.id(),
            direction,
            anchor: index,
            start: f.start,
            end: index,
            upper: Some(f.upper),
            lower: Some(f.lower),
            pivots: merge_pivots(f.highs, f.lows),
        })
    }

    fn validate_config(&self) -> Result<()> {
        if self.ratio_low.get() >= self.ratio_high.get() {
            return Err(PatternError::InvalidConfig(format!(
                "ratio_low ({}) must be below ratio_high ({})",
                self.ratio_low.get(),
                self.ratio_high.get()
            )));
        }
        Ok(())
    }
}

impl ParameterizedClassifier for FlagClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 7] = [
            ParamMeta::period("lookback", 20.0, (10.0, 60.0, 5.0), "Trailing window length"),
            ParamMeta::period("warmup", 10.0, (0.0, 30.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("min_pivots", 3.0, (2.0, 6.0, 1.0), "Minimum pivots per side"),
            ParamMeta::ratio("min_abs_r", 0.9, (0.7, 0.99, 0.01), "Correlation gate, both lines"),
            ParamMeta::tolerance("min_slope", 1e-3, (1e-4, 1e-2, 1e-4), "Minimum slope magnitude"),
            ParamMeta::tolerance("ratio_low", 0.9, (0.7, 0.99, 0.01), "Slope ratio lower bound"),
            ParamMeta::tolerance("ratio_high", 1.05, (1.01, 1.3, 0.01), "Slope ratio upper bound"),
        ];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", 20)?,
            warmup: get_period(params, "warmup", 10)?,
            min_pivots: get_period(params, "min_pivots", 3)?,
            min_abs_r: get_ratio(params, "min_abs_r", 0.9)?,
            min_slope: get_tolerance(params, "min_slope", 1e-3)?,
            ratio_low: get_tolerance(params, "ratio_low", 0.9)?,
            ratio_high: get_tolerance(params, "ratio_high", 1.05)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_FLAG"
    }
}

// ============================================================
// WEDGE
// ============================================================

/// Wedge: two same-direction lines converging shortly ahead of the
/// window.
///
/// The apex `x* = (b_low - b_high) / (s_high - s_low)` must lie strictly
/// past the last pivot and within `convergence_factor` times the pivot
/// span. A rising wedge is read as bearish, a falling wedge as bullish.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WedgeClassifier {
    pub lookback: Period,
    pub warmup: Period,
    pub min_pivots: Period,
    /// Correlation gate applied to both lines
    pub min_abs_r: Ratio,
    /// Minimum slope magnitude of both lines
    pub min_slope: Tolerance,
    /// Lower bound of the lows/highs slope ratio (exclusive)
    pub ratio_low: Tolerance,
    /// Upper bound of the lows/highs slope ratio (exclusive)
    pub ratio_high: Tolerance,
    /// Apex must fall within this multiple of the pivot span
    pub convergence_factor: Tolerance,
}

impl Default for WedgeClassifier {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            warmup: Period::new_const(10),
            min_pivots: Period::new_const(3),
            min_abs_r: Ratio::new_const(0.9),
            min_slope: Tolerance::new_const(1e-3),
            ratio_low: Tolerance::new_const(0.75),
            ratio_high: Tolerance::new_const(1.25),
            convergence_factor: Tolerance::new_const(3.0),
        }
    }
}

impl PatternClassifier for WedgeClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_WEDGE")
    }

    fn min_bars(&self) -> usize {
        self.lookback.get() + self.warmup.get() + 1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        let f = fit_trailing(
            bars,
            &ctx.close_marks,
            index,
            self.lookback.get(),
            self.warmup.get(),
            self.min_pivots.get(),
            PriceField::Close,
        )?;

        let sign = parallel_trend(&f, self.min_slope.get(), self.min_abs_r.get())?;

        let ratio = f.lower.slope / f.upper.slope;
        if ratio <= self.ratio_low.get() || ratio >= self.ratio_high.get() {
            return None;
        }

        // Apex of the two lines; equal slopes push it to infinity and the
        // span test below rejects it.
        let apex = (f.lower.intercept - f.upper.intercept) / (f.upper.slope - f.lower.slope);
        let first = f.upper.start.min(f.lower.start);
        let last = f.upper.end.max(f.lower.end);
        let ahead = apex - last;
        if !(ahead > 0.0 && ahead < self.convergence_factor.get() * (last - first)) {
            return None;
        }

        let direction = if sign > 0.0 { Direction::Bearish } else { Direction::Bullish };

        Some(PatternMatch {
            pattern_id: self.id(),
            direction,
            anchor: index,
            start: f.start,
            end: index,
            upper: Some(f.upper),
            lower: Some(f.lower),
            pivots: merge_pivots(f.highs, f.lows),
        })
    }

    fn validate_config(&self) -> Result<()> {
        if self.ratio_low.get() >= self.ratio_high.get() {
            return Err(PatternError::InvalidConfig(format!(
                "ratio_low ({}) must be below ratio_high ({})",
                self.ratio_low.get(),
                self.ratio_high.get()
            )));
        }
        Ok(())
    }
}

impl ParameterizedClassifier for WedgeClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 8] = [
            ParamMeta::period("lookback", 20.0, (10.0, 60.0, 5.0), "Trailing window length"),
            ParamMeta::period("warmup", 10.0, (0.0, 30.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("min_pivots", 3.0, (2.0, 6.0, 1.0), "Minimum pivots per side"),
            ParamMeta::ratio("min_abs_r", 0.9, (0.7, 0.99, 0.01), "Correlation gate, both lines"),
            ParamMeta::tolerance("min_slope", 1e-3, (1e-4, 1e-2, 1e-4), "Minimum slope magnitude"),
            ParamMeta::tolerance("ratio_low", 0.75, (0.5, 0.99, 0.01), "Slope ratio lower bound"),
            ParamMeta::tolerance("ratio_high", 1.25, (1.01, 1.5, 0.01), "Slope ratio upper bound"),
            ParamMeta::tolerance(
                "convergence_factor",
                3.0,
                (1.0, 6.0, 0.5),
                "Apex distance bound in pivot spans",
            ),
        ];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            lookback: get_period(params, "lookback", 20)?,
            warmup: get_period(params, "warmup", 10)?,
            min_pivots: get_period(params, "min_pivots", 3)?,
            min_abs_r: get_ratio(params, "min_abs_r", 0.9)?,
            min_slope: get_tolerance(params, "min_slope", 1e-3)?,
            ratio_low: get_tolerance(params, "ratio_low", 0.75)?,
            ratio_high: get_tolerance(params, "ratio_high", 1.25)?,
            convergence_factor: get_tolerance(params, "convergence_factor", 3.0)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_WEDGE"
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PivotKind;

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

    /// Channel with pivot highs on the `top` line and pivot lows on the
    /// `bottom` line (slope, level-at-zero). Highs land at i % 5 == 4,
    /// lows at i % 5 == 2; both marks vectors carry the same positions so
    /// the fixture serves flag (high/low) and wedge (close) alike.
    fn channel_ctx(len: usize, top: (f64, f64), bottom: (f64, f64)) -> (Vec<Bar>, PivotContext) {
        let top_at = |i: usize| top.1 + top.0 * i as f64;
        let bottom_at = |i: usize| bottom.1 + bottom.0 * i as f64;

        let mut marks = vec![PivotKind::None; len];
        let bars: Vec<Bar> = (0..len)
            .map(|i| {
                let mid = (top_at(i) + bottom_at(i)) / 2.0;
                let (h, l, c) = if i % 5 == 4 {
                    marks[i] = PivotKind::High;
                    (top_at(i), top_at(i) - 0.8, top_at(i))
                } else if i % 5 == 2 {
                    marks[i] = PivotKind::Low;
                    (bottom_at(i) + 0.8, bottom_at(i), bottom_at(i))
                } else {
                    (mid + 0.2, mid - 0.2, mid)
                };
                Bar { h, l, c }
            })
            .collect();

        let ctx = PivotContext {
            marks: marks.clone(),
            close_marks: marks,
            ..Default::default()
        };
        (bars, ctx)
    }

    #[test]
    fn test_flag_fires_on_parallel_rising_channel() {
        let (bars, ctx) = channel_ctx(35, (0.5, 100.0), (0.5, 95.0));
        let m = FlagClassifier::default().detect(&bars, 34, &ctx).expect("should match");
        assert_eq!(m.pattern_id, PatternId("CHT_FLAG"));
        assert_eq!(m.direction, Direction::Bearish);

        let ratio = m.lower.unwrap().slope / m.upper.unwrap().slope;
        assert!(ratio > 0.9 && ratio < 1.05);
    }

    #[test]
    fn test_flag_falling_channel_is_bullish() {
        let (bars, ctx) = channel_ctx(35, (-0.5, 120.0), (-0.5, 115.0));
        let m = FlagClassifier::default().detect(&bars, 34, &ctx).expect("should match");
        assert_eq!(m.direction, Direction::Bullish);
    }

    #[test]
    fn test_flag_rejects_opposing_slopes() {
        let (bars, ctx) = channel_ctx(35, (-0.3, 110.0), (0.3, 90.0));
        assert!(FlagClassifier::default().detect(&bars, 34, &ctx).is_none());
    }

    #[test]
    fn test_flag_rejects_diverging_ratio() {
        // Lows rising twice as fast as highs: ratio 2.0, out of band.
        let (bars, ctx) = channel_ctx(35, (0.25, 100.0), (0.5, 80.0));
        assert!(FlagClassifier::default().detect(&bars, 34, &ctx).is_none());
    }

    #[test]
    fn test_wedge_fires_on_converging_rise() {
        // Lows rise faster than highs; lines meet shortly past the
        // window, inside the span bound.
        let (bars, ctx) = channel_ctx(35, (0.40, 105.0), (0.48, 100.0));
        let m = WedgeClassifier::default().detect(&bars, 34, &ctx).expect("should match");
        assert_eq!(m.pattern_id, PatternId("CHT_WEDGE"));
        assert_eq!(m.direction, Direction::Bearish);
    }

    #[test]
    fn test_wedge_rejects_parallel_channel() {
        // Identical slopes never meet.
        let (bars, ctx) = channel_ctx(35, (0.5, 108.0), (0.5, 100.0));
        assert!(WedgeClassifier::default().detect(&bars, 34, &ctx).is_none());
    }

    #[test]
    fn test_wedge_rejects_distant_apex() {
        // Slopes differ so slightly the apex lands far past the span
        // bound, while the ratio stays inside (0.75, 1.25).
        let (bars, ctx) = channel_ctx(35, (0.50, 104.0), (0.51, 100.0));
        assert!(WedgeClassifier::default().detect(&bars, 34, &ctx).is_none());
    }

    #[test]
    fn test_flag_validate_config() {
        let c = FlagClassifier {
            ratio_low: Tolerance::new_const(1.2),
            ..Default::default()
        };
        assert!(c.validate_config().is_err());
    }

    #[test]
    fn test_wedge_with_params() {
        let mut params = HashMap::new();
        params.insert("convergence_factor", 2.0);

        let c = WedgeClassifier::with_params(&params).unwrap();
        assert!((c.convergence_factor.get() - 2.0).abs() < f64::EPSILON);
        assert_eq!(c.lookback.get(), 20);
    }
}
