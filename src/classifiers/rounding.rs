//! Curvature pattern: rounding bottom
//!
//! Unlike the straight-line families this classifier fits a parabola to
//! the close-extrema troughs of a trailing window and gates on its
//! coefficients, so a gradual saucer registers even when no pair of
//! trend lines describes it.

use std::collections::HashMap;

use crate::params::{get_period, get_tolerance, get_value, ParamMeta, ParameterizedClassifier};
use crate::pivots::PriceField;
use crate::{
    fit, Direction, PatternClassifier, PatternError, PatternId, PatternMatch, Period,
    PivotContext, Result, Tolerance, OHLCV,
};

use super::{trailing_window_start, window_pivots};

impl_with_defaults!(RoundingBottomClassifier);

/// Rounding bottom: the closes' troughs over the trailing window lie on
/// an upward-opening parabola that is still falling at the window start.
///
/// The quadratic is fitted over window-relative bar offsets, so the
/// linear-coefficient gate reads the same regardless of where in the
/// series the window sits. The curvature and linear-coefficient bounds
/// are calibration constants; retune them per instrument and timeframe.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RoundingBottomClassifier {
    /// Trailing window length
    pub lookback: Period,
    /// Extra bars at the series start that never anchor a match
    pub warmup: Period,
    /// Minimum trough count for the quadratic fit
    pub min_lows: Period,
    /// Minimum quadratic coefficient (how tight the saucer curls up)
    pub min_curvature: Tolerance,
    /// Maximum linear coefficient; must be negative so the window
    /// opens with the price still falling
    pub max_linear_coeff: f64,
}

impl Default for RoundingBottomClassifier {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            warmup: Period::new_const(10),
            min_lows: Period::new_const(3),
            min_curvature: Tolerance::new_const(2.19388889e-4),
            max_linear_coeff: -3.52871667e-2,
        }
    }
}

impl PatternClassifier for RoundingBottomClassifier {
    fn id(&self) -> PatternId {
        PatternId("CHT_ROUNDINGBOTTOM")
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
        let start =
            trailing_window_start(index, bars.len(), self.lookback.get(), self.warmup.get())?;

        let (maxima, minima) =
            window_pivots(bars, &ctx.close_extrema_marks, start, index, PriceField::Close);
        if minima.len() < self.min_lows.get() || maxima.is_empty() {
            return None;
        }

        let xs: Vec<f64> = minima.iter().map(|p| (p.index - start) as f64).collect();
        let ys: Vec<f64> = minima.iter().map(|p| p.price).collect();
        let q = fit::fit_quadratic(&xs, &ys).ok()?;

        if !q.opens_upward() || q.derivative_at(xs[0]) >= 0.0 {
            return None;
        }
        if q.a < self.min_curvature.get() || q.b > self.max_linear_coeff {
            return None;
        }

        Some(PatternMatch {
            pattern_id: self.id(),
            direction: Direction::Bullish,
            anchor: index,
            start,
            end: index,
            upper: None,
            lower: None,
            pivots: minima,
        })
    }

    fn validate_config(&self) -> Result<()> {
        if !self.max_linear_coeff.is_finite() || self.max_linear_coeff >= 0.0 {
            return Err(PatternError::InvalidConfig(format!(
                "max_linear_coeff must be finite and negative, got {}",
                self.max_linear_coeff
            )));
        }
        Ok(())
    }
}

impl ParameterizedClassifier for RoundingBottomClassifier {
    fn param_meta() -> &'static [ParamMeta] {
        static META: [ParamMeta; 5] = [
            ParamMeta::period("lookback", 20.0, (10.0, 40.0, 5.0), "Trailing window length"),
            ParamMeta::period("warmup", 10.0, (0.0, 30.0, 5.0), "Bars skipped at series start"),
            ParamMeta::period("min_lows", 3.0, (3.0, 6.0, 1.0), "Minimum trough count"),
            ParamMeta::tolerance(
                "min_curvature",
                2.19388889e-4,
                (1e-4, 1e-3, 1e-4),
                "Minimum quadratic coefficient",
            ),
            ParamMeta::value(
                "max_linear_coeff",
                -3.52871667e-2,
                (-1e-1, -1e-2, 5e-3),
                "Maximum (most shallow) linear coefficient",
            ),
        ];
        &META
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        let max_linear_coeff = get_value(params, "max_linear_coeff", -3.52871667e-2);
        let classifier = Self {
            lookback: get_period(params, "lookback", 20)?,
            warmup: get_period(params, "warmup", 10)?,
            min_lows: get_period(params, "min_lows", 3)?,
            min_curvature: get_tolerance(params, "min_curvature", 2.19388889e-4)?,
            max_linear_coeff,
        };
        classifier.validate_config()?;
        Ok(classifier)
    }

    fn pattern_id_str() -> &'static str {
        "CHT_ROUNDINGBOTTOM"
    }
}

// ============================================================
// TESTS
// ============================================================
