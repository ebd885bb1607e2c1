//! Triangle patterns: symmetric, ascending, descending
//!
//! All three fit a line through the pivot highs and another through the
//! pivot lows of the trailing window, then test slope and correlation
//! gates. A converging pair of trending lines is a symmetric triangle; a
//! flat line against a trending one is an ascending or descending
//! triangle depending on which side is flat.

use std::collections::HashMap;

use crate::params::{get_period, get_ratio, get_tolerance, ParamMeta, ParameterizedClassifier};
use crate::pivots::PriceField;
use crate::{
    Direction, PatternClassifier, PatternError, PatternId, PatternMatch, Period, PivotContext,
    Ratio, Result, Tolerance, OHLCV,
};

use super::{fit_trailing, merge_pivots};

impl_with_defaults!(
    SymmetricTriangleClassifier,
    AscendingTriangleClassifier,
    DescendingTriangleClassifier,
);

// ============================================================
// SYMMETRIC TRIANGLE
// ============================================================

/// Symmetric triangle: rising support meeting falling resistance.
///
/// Both lines must trend (lows up, highs down) with a tight correlation
/// on each side.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SymmetricTriangleClassifier {
    /// Trailing window length
    pub lookback: Period,
    /// Bars at the start of the series that never anchor a match
    pub warmup: Period,
    /// Minimum pivot highs and pivot lows inside the window
    pub min_pivots: Period,
    /// Correlation gate applied to both fitted lines
    pub min_abs_r: Ratio,
    /// Minimum absolute slope for a line to count as trending
    pub min_slope: Tolerance,
}

impl Default for SymmetricTriangleClassifier {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            warmup: Period::new_const(10),
            min_pivots: Period::new_const(3),
            min_abs_r: Ratio::new_const(0.9),
            min_slope: Tolerance::new_const(1e-3),
        }
    }
}

impl PatternClassifier for SymmetricTriangleClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_SYMTRIANGLE")
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

        let min_slope = self.min_slope.get();
        let min_r = self.min_abs_r.get();

        let converging = f.lower.slope >= min_slope && f.upper.slope <= -min_slope;
        let aligned = f.lower.r.abs() >= min_r && f.upper.r.abs() >= min_r;
        if !(converging && aligned) {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Neutral,
            anchor: index,
            start: f.start,
            end: index,
            upper: Some(f.upper),
            lower: Some(f.lower),
            pivots: merge_pivots(f.highs, f.lows),
        })
    }
}

impl ParameterizedClassifier for SymmetricTriangleClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 5] = [
            ParamMeta::period("lookback", 20.0, (10.0, 60.0, 5.0), "Trailing window length"),
            ParamMeta::period("warmup", 10.0, (0.0, 30.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("min_pivots", 3.0, (2.0, 6.0, 1.0), "Minimum pivots per side"),
            ParamMeta::ratio("min_abs_r", 0.9, (0.7, 0.99, 0.01), "Correlation gate, both lines"),
            ParamMeta::tolerance("min_slope", 1e-3, (1e-4, 1e-2, 1e-4), "Minimum trending slope"),
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
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_SYMTRIANGLE"
    }
}

// ============================================================
// ASCENDING TRIANGLE
// ============================================================

/// Ascending triangle: flat resistance over rising support.
///
/// The correlation gate applies only to the trending lows line; a flat
/// resistance has no defined correlation (r reported as 0) and is judged
/// by its slope alone.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AscendingTriangleClassifier {
    pub lookback: Period,
    pub warmup: Period,
    pub min_pivots: Period,
    /// Correlation gate applied to the rising lows line
    pub min_abs_r: Ratio,
    /// Minimum slope of the rising lows line
    pub min_slope: Tolerance,
    /// Maximum absolute slope for the highs line to count as flat
    pub flat_tolerance: Tolerance,
}

impl Default for AscendingTriangleClassifier {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            warmup: Period::new_const(10),
            min_pivots: Period::new_const(3),
            min_abs_r: Ratio::new_const(0.9),
            min_slope: Tolerance::new_const(1e-3),
            flat_tolerance: Tolerance::new_const(1e-5),
        }
    }
}

impl PatternClassifier for AscendingTriangleClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_ASCTRIANGLE")
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

        let flat_top = f.upper.is_flat(self.flat_tolerance.get());
        let rising_bottom =
            f.lower.slope >= self.min_slope.get() && f.lower.r.abs() >= self.min_abs_r.get();
        if !(flat_top && rising_bottom) {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bullish,
            anchor: index,
            start: f.start,
            end: index,
            upper: Some(f.upper),
            lower: Some(f.lower),
            pivots: merge_pivots(f.highs, f.lows),
        })
    }

    fn validate_config(&self) -> Result<()> {
        if self.flat_tolerance.get() >= self.min_slope.get() {
            return Err(PatternError::InvalidConfig(format!(
                "flat_tolerance ({}) must be below min_slope ({})",
                self.flat_tolerance.get(),
                self.min_slope.get()
            )));
        }
        Ok(())
    }
}

impl ParameterizedClassifier for AscendingTriangleClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 6] = [
            ParamMeta::period("lookback", 20.0, (10.0, 60.0, 5.0), "Trailing window length"),
            ParamMeta::period("warmup", 10.0, (0.0, 30.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("min_pivots", 3.0, (2.0, 6.0, 1.0), "Minimum pivots per side"),
            ParamMeta::ratio("min_abs_r", 0.9, (0.7, 0.99, 0.01), "Correlation gate, lows line"),
            ParamMeta::tolerance("min_slope", 1e-3, (1e-4, 1e-2, 1e-4), "Minimum rising slope"),
            ParamMeta::tolerance("flat_tolerance", 1e-5, (1e-6, 1e-4, 1e-6), "Flat line band"),
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
            flat_tolerance: get_tolerance(params, "flat_tolerance", 1e-5)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_ASCTRIANGLE"
    }
}

// ============================================================
// DESCENDING TRIANGLE
// ============================================================

/// Descending triangle: falling resistance over flat support.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DescendingTriangleClassifier {
    pub lookback: Period,
    pub warmup: Period,
    pub min_pivots: Period,
    /// Correlation gate applied to the falling highs line
    pub min_abs_r: Ratio,
    /// Minimum magnitude of the falling highs slope
    pub min_slope: Tolerance,
    /// Maximum absolute slope for the lows line to count as flat
    pub flat_tolerance: Tolerance,
}

impl Default for DescendingTriangleClassifier {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            warmup: Period::new_const(10),
            min_pivots: Period::new_const(3),
            min_abs_r: Ratio::new_const(0.9),
            min_slope: Tolerance::new_const(1e-3),
            flat_tolerance: Tolerance::new_const(1e-5),
        }
    }
}

impl PatternClassifier for DescendingTriangleClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_DESCTRIANGLE")
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

        let flat_bottom = f.lower.is_flat(self.flat_tolerance.get());
        let falling_top =
            f.upper.slope <= -self.min_slope.get() && f.upper.r.abs() >= self.min_abs_r.get();
        if !(flat_bottom && falling_top) {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bearish,
            anchor: index,
            start: f.start,
            end: index,
            upper: Some(f.upper),
            lower: Some(f.lower),
            pivots: merge_pivots(f.highs, f.lows),
        })
    }

    fn validate_config(&self) -> Result<()> {
        if self.flat_tolerance.get() >= self.min_slope.get() {
            return Err(PatternError::InvalidConfig(format!(
                "flat_tolerance ({}) must be below min_slope ({})",
                self.flat_tolerance.get(),
                self.min_slope.get()
            )));
        }
        Ok(())
    }
}

impl ParameterizedClassifier for DescendingTriangleClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 6] = [
            ParamMeta::period("lookback", 20.0, (10.0, 60.0, 5.0), "Trailing window length"),
            ParamMeta::period("warmup", 10.0, (0.0, 30.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("min_pivots", 3.0, (2.0, 6.0, 1.0), "Minimum pivots per side"),
            ParamMeta::ratio("min_abs_r", 0.9, (0.7, 0.99, 0.01), "Correlation gate, highs line"),
            ParamMeta::tolerance("min_slope", 1e-3, (1e-4, 1e-2, 1e-4), "Minimum falling slope"),
            ParamMeta::tolerance("flat_tolerance", 1e-5, (1e-6, 1e-4, 1e-6), "Flat line band"),
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
            flat_tolerance: get_tolerance(params, "flat_tolerance", 1e-5)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "CHT_DESCTRIANGLE"
    }
}

// ============================================================
// TESTS
// ============================================================
