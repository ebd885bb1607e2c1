//! Least-squares fitting over pivot points.
//!
//! [`fit_line`] is ordinary least squares with the Pearson correlation of
//! the sample attached; [`fit_quadratic`] solves the 3x3 normal equations
//! for a parabola (rounding-bottom curvature). Both reject degenerate
//! samples with [`PatternError::DegenerateFit`] instead of emitting lines
//! with NaN coefficients.

use crate::{PatternError, Result};

/// A fitted straight line `y = slope * x + intercept` over pivot points.
///
/// `r` is the Pearson correlation of the sample the line was fitted to; a
/// flat sample (zero variance in y) fits with `r = 0`, not an error.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient of the fitted sample
    pub r: f64,
    /// Smallest x of the fitted sample
    pub start: f64,
    /// Largest x of the fitted sample
    pub end: f64,
}

impl TrendLine {
    /// Evaluate the line at `x`
    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// True when `|slope|` is at or below `tolerance`
    #[inline]
    pub fn is_flat(&self, tolerance: f64) -> bool {
        self.slope.abs() <= tolerance
    }
}

/// Fit a straight line through `(xs, ys)` by ordinary least squares.
///
/// Needs at least 2 points and at least two distinct x values; a vertical
/// sample is a `DegenerateFit`. Constant ys are fine and yield `r = 0`.
pub fn fit_line(xs: &[f64], ys: &[f64]) -> Result<TrendLine> {
    if xs.len() != ys.len() {
        return Err(PatternError::InvalidValue("xs and ys lengths differ"));
    }
    if xs.len() < 2 {
        return Err(PatternError::InsufficientData {
            need: 2,
            got: xs.len(),
        });
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }

    if ss_xx == 0.0 {
        return Err(PatternError::DegenerateFit("all x values identical"));
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;

    // Zero variance in y means no correlation is defined; report 0 rather
    // than NaN so correlation gates simply fail to pass.
    let r = if ss_yy <= f64::EPSILON * ss_xx.max(1.0) {
        0.0
    } else {
        ss_xy / (ss_xx * ss_yy).sqrt()
    };

    let mut start = xs[0];
    let mut end = xs[0];
    for &x in xs {
        if x < start {
            start = x;
        }
        if x > end {
            end = x;
        }
    }

    Ok(TrendLine {
        slope,
        intercept,
        r,
        start,
        end,
    })
}

/// A fitted parabola `y = a * x^2 + b * x + c`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuadraticFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl QuadraticFit {
    /// Evaluate the parabola at `x`
    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }

    /// Slope of the parabola at `x` (`2ax + b`)
    #[inline]
    pub fn derivative_at(&self, x: f64) -> f64 {
        2.0 * self.a * x + self.b
    }

    /// True when the parabola opens upward
    #[inline]
    pub fn opens_upward(&self) -> bool {
        self.a > 0.0
    }
}

/// Fit a parabola through `(xs, ys)` by least squares.
///
/// Solves the 3x3 normal equations with Cramer's rule. Needs at least 3
/// points; a near-singular system (fewer than 3 distinct x values) is a
/// `DegenerateFit`.
pub fn fit_quadratic(xs: &[f64], ys: &[f64]) -> Result<QuadraticFit> {
    if xs.len() != ys.len() {
        return Err(PatternError::InvalidValue("xs and ys lengths differ"));
    }
    if xs.len() < 3 {
        return Err(PatternError::InsufficientData {
            need: 3,
            got: xs.len(),
        });
    }

    let n = xs.len() as f64;
    let mut s1 = 0.0;
    let mut s2 = 0.0;
    let mut s3 = 0.0;
    let mut s4 = 0.0;
    let mut t0 = 0.0;
    let mut t1 = 0.0;
    let mut t2 = 0.0;

    for (&x, &y) in xs.iter().zip(ys) {
        let x2 = x * x;
        s1 += x;
        s2 += x2;
        s3 += x2 * x;
        s4 += x2 * x2;
        t0 += y;
        t1 += x * y;
        t2 += x2 * y;
    }

    // Normal equations, unknowns ordered (a, b, c):
    //   s4 a + s3 b + s2 c = t2
    //   s3 a + s2 b + s1 c = t1
    //   s2 a + s1 b + n  c = t0
    let det = s4 * (s2 * n - s1 * s1) - s3 * (s3 * n - s1 * s2) + s2 * (s3 * s1 - s2 * s2);

    // Scale-aware singularity check; xs in the hundreds push the raw
    // determinant magnitude far above 1 even for healthy systems.
    let scale = s4.abs().max(n).max(1.0);
    if det.abs() <= f64::EPSILON * scale * scale {
        return Err(PatternError::DegenerateFit(
            "quadratic normal equations are singular",
        ));
    }

    let det_a = t2 * (s2 * n - s1 * s1) - s3 * (t1 * n - s1 * t0) + s2 * (t1 * s1 - s2 * t0);
    let det_b = s4 * (t1 * n - s1 * t0) - t2 * (s3 * n - s1 * s2) + s2 * (s3 * t0 - t1 * s2);
    let det_c = s4 * (s2 * t0 - t1 * s1) - s3 * (s3 * t0 - t1 * s2) + t2 * (s3 * s1 - s2 * s2);

    Ok(QuadraticFit {
        a: det_a / det,
        b: det_b / det,
        c: det_c / det,
    })
}

// ============================================================
// TESTS
// ============================================================
