//! # trendscan - geometric chart pattern detection
//!
//! Pivot extraction, trend-line fitting, and rule-based classification of
//! geometric chart patterns (triangles, wedges, flags, double/triple
//! tops and bottoms, head-and-shoulders, rounding bottoms) over OHLC bars.
//!
//! ## Quick Start
//!
//! ```rust
//! use trendscan::prelude::*;
//!
//! // Define your OHLC data
//! struct Bar { o: f64, h: f64, l: f64, c: f64 }
//!
//! impl OHLCV for Bar {
//!     fn open(&self) -> f64 { self.o }
//!     fn high(&self) -> f64 { self.h }
//!     fn low(&self) -> f64 { self.l }
//!     fn close(&self) -> f64 { self.c }
//! }
//!
//! // Create an engine with every builtin classifier
//! let engine = EngineBuilder::new()
//!     .with_all_defaults()
//!     .build()
//!     .unwrap();
//!
//! // Scan your series
//! let bars: Vec<Bar> = vec![];
//! let matches = engine.scan(&bars).unwrap();
//! ```

pub mod classifiers;
pub mod fit;
pub mod levels;
pub mod params;
pub mod pips;
pub mod pivots;

pub mod prelude {
    pub use crate::{
        // Classifiers
        classifiers::*,
        // Fits
        fit::{fit_line, fit_quadratic, QuadraticFit, TrendLine},
        // Levels
        levels::{closest_pair, Level, LevelExtractor, LevelKind},
        // Parameters
        params::{
            get_period, get_ratio, get_tolerance, get_value, ParamMeta, ParamType,
            ParameterizedClassifier,
        },
        // PIPS
        pips::{approximation_error, find_pips, DistanceMeasure, PipsExtractor, PipsResult},
        // Pivots
        pivots::{strict_extrema_marks, ExtremaFinder, PivotDetector, PriceField},
        // Parallel
        scan_parallel,
        // Engine
        BuiltinClassifier,
        DefaultPivotProvider,
        Direction,
        // Core traits
        DynPatternClassifier,
        EngineBuilder,
        OHLCVExt,
        PatternClassifier,
        // Errors
        PatternError,
        PatternId,
        PatternMatch,
        Period,
        Pivot,
        PivotContext,
        PivotKind,
        PivotProvider,
        Ratio,
        Result,
        ScanEngine,
        ScanError,
        ScanResult,
        Tolerance,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during pattern detection
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} points, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Degenerate fit: {0}")]
    DegenerateFit(&'static str),

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0 (correlation gates and ratios)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0) - window sizes, lookbacks, pivot arms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

/// Strictly positive finite threshold (slope bounds, price tolerances).
///
/// Calibration constants vary by instrument and timeframe, so classifiers
/// take them as injectable values rather than hard-coded literals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Tolerance(f64);

impl Tolerance {
    /// Create a new Tolerance, validating the value is finite and > 0
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(PatternError::InvalidValue(
                "Tolerance cannot be NaN or infinite",
            ));
        }
        if value <= 0.0 {
            return Err(PatternError::InvalidValue("Tolerance must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Tolerance {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Tolerance {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Tolerance::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLC bar trait. Bar index is the slice position; the series is
/// assumed dense (no gaps). Volume filtering is an upstream concern.
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn timestamp(&self) -> Option<i64> {
        (*self).timestamp()
    }
}

/// Extension trait with computed properties for OHLC data
pub trait OHLCVExt: OHLCV {
    /// Price used for pivot-low comparison under the given field
    #[inline]
    fn low_value(&self, field: pivots::PriceField) -> f64 {
        match field {
            pivots::PriceField::HighLow => self.low(),
            pivots::PriceField::Close => self.close(),
        }
    }

    /// Price used for pivot-high comparison under the given field
    #[inline]
    fn high_value(&self, field: pivots::PriceField) -> f64 {
        match field {
            pivots::PriceField::HighLow => self.high(),
            pivots::PriceField::Close => self.close(),
        }
    }

    /// Validate OHLC data consistency
    fn validate(&self) -> Result<()> {
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// PIVOTS - derived, recomputed per detection run
// ============================================================

/// Pivot classification of a single bar within its neighborhood.
///
/// `Both` only occurs when the bar is simultaneously the extreme of both
/// directions over the same neighborhood (a flat neighborhood).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PivotKind {
    #[default]
    None,
    Low,
    High,
    Both,
}

impl PivotKind {
    #[inline]
    pub fn is_low(self) -> bool {
        matches!(self, PivotKind::Low)
    }

    #[inline]
    pub fn is_high(self) -> bool {
        matches!(self, PivotKind::High)
    }
}

/// A bar whose price is locally extreme within its neighborhood
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

// ============================================================
// PATTERN MATCH
// ============================================================

/// Unique identifier for a pattern type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct PatternId(pub &'static str);

impl<'de> serde::Deserialize<'de> for PatternId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(d)?;
        // Map onto the known static ids so the &'static str invariant holds
        let id = match value.as_str() {
            "CHT_SYMTRIANGLE" => "CHT_SYMTRIANGLE",
            "CHT_ASCTRIANGLE" => "CHT_ASCTRIANGLE",
            "CHT_DESCTRIANGLE" => "CHT_DESCTRIANGLE",
            "CHT_FLAG" => "CHT_FLAG",
            "CHT_WEDGE" => "CHT_WEDGE",
            "CHT_DOUBLETOP" => "CHT_DOUBLETOP",
            "CHT_DOUBLEBOTTOM" => "CHT_DOUBLEBOTTOM",
            "CHT_TRIPLETOP" => "CHT_TRIPLETOP",
            "CHT_TRIPLEBOTTOM" => "CHT_TRIPLEBOTTOM",
            "CHT_HEADSHOULDERS" => "CHT_HEADSHOULDERS",
            "CHT_INVHEADSHOULDERS" => "CHT_INVHEADSHOULDERS",
            "CHT_ROUNDINGBOTTOM" => "CHT_ROUNDINGBOTTOM",
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown pattern id: {other}"
                )))
            }
        };
        Ok(PatternId(id))
    }
}

impl PatternId {
    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Returns the typical/expected direction of this pattern.
    ///
    /// - `Some(Direction::Bullish)` - pattern typically resolves upward
    /// - `Some(Direction::Bearish)` - pattern typically resolves downward
    /// - `Some(Direction::Neutral)` - no directional bias
    /// - `None` - bidirectional (depends on the preceding trend)
    pub fn typical_direction(&self) -> Option<Direction> {
        match self.0 {
            "CHT_ASCTRIANGLE" | "CHT_DOUBLEBOTTOM" | "CHT_TRIPLEBOTTOM"
            | "CHT_INVHEADSHOULDERS" | "CHT_ROUNDINGBOTTOM" => Some(Direction::Bullish),
            "CHT_DESCTRIANGLE" | "CHT_DOUBLETOP" | "CHT_TRIPLETOP" | "CHT_HEADSHOULDERS" => {
                Some(Direction::Bearish)
            }
            "CHT_SYMTRIANGLE" => Some(Direction::Neutral),
            // Flags and wedges break with or against the prior trend
            "CHT_FLAG" | "CHT_WEDGE" => None,
            _ => None,
        }
    }

    /// Returns true if this pattern can resolve in either direction
    pub fn is_bidirectional(&self) -> bool {
        self.typical_direction().is_none()
    }

    /// Returns true if this pattern typically resolves upward
    pub fn is_typically_bullish(&self) -> bool {
        matches!(self.typical_direction(), Some(Direction::Bullish))
    }

    /// Returns true if this pattern typically resolves downward
    pub fn is_typically_bearish(&self) -> bool {
        matches!(self.typical_direction(), Some(Direction::Bearish))
    }
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Result of pattern detection - read-only once emitted
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub direction: Direction,
    /// Bar index where the classifier fired
    pub anchor: usize,
    /// First bar of the lookback window
    pub start: usize,
    /// Last bar of the lookback window
    pub end: usize,
    /// Fitted line through the pivot highs, when the pattern uses one
    pub upper: Option<fit::TrendLine>,
    /// Fitted line through the pivot lows, when the pattern uses one
    pub lower: Option<fit::TrendLine>,
    /// The pivots that triggered the match, in index order
    pub pivots: Vec<Pivot>,
}

// ============================================================
// PIVOT CONTEXT
// ============================================================

/// Precomputed pivot material for a whole bar series.
///
/// Built once per scan and shared read-only by every classifier; a fresh
/// context is computed whenever the series or the provider configuration
/// changes, so no state leaks between scan positions.
#[derive(Debug, Clone, Default)]
pub struct PivotContext {
    /// Per-bar pivot marks on high/low with the provider's (n1, n2) arms
    pub marks: Vec<PivotKind>,
    /// Per-bar pivot marks on close with the same arms (wedge detection)
    pub close_marks: Vec<PivotKind>,
    /// Per-bar pivot marks on high/low with short arms
    /// (head-and-shoulders and triple top/bottom)
    pub short_marks: Vec<PivotKind>,
    /// Strict single-bar local extrema on close (rounding bottom)
    pub close_extrema_marks: Vec<PivotKind>,
    /// Refined local extrema on close, sorted by index (double top/bottom)
    pub extrema: Vec<Pivot>,
}

impl PivotContext {
    /// Position of `index` in the refined extrema list, if it is one
    #[inline]
    pub fn extremum_position(&self, index: usize) -> Option<usize> {
        self.extrema.binary_search_by_key(&index, |p| p.index).ok()
    }
}

/// Provider of pivot context - precomputes pivot marks for all bars
pub trait PivotProvider: Send + Sync {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> PivotContext;
}

/// Default pivot provider mirroring the detection setup the classifiers
/// were calibrated against: (3, 3) arms for triangle/flag/wedge pivots,
/// (5, 5) short arms for reversal patterns, and refined close extrema for
/// the double patterns.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DefaultPivotProvider {
    /// Bars to the left of a pivot candidate
    pub n1: Period,
    /// Bars to the right of a pivot candidate
    pub n2: Period,
    /// Arm length of the short pivot marks
    pub short_arm: Period,
    /// Neighborhood half-width used to refine raw close extrema
    pub refine_window: Period,
    /// Smooth the close series before extrema detection
    pub smooth: bool,
    /// Centered rolling-mean width used when `smooth` is set
    pub smoothing_period: Period,
}

impl Default for DefaultPivotProvider {
    fn default() -> Self {
        Self {
            n1: Period::new_const(3),
            n2: Period::new_const(3),
            short_arm: Period::new_const(5),
            refine_window: Period::new_const(10),
            smooth: false,
            smoothing_period: Period::new_const(10),
        }
    }
}

impl PivotProvider for DefaultPivotProvider {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> PivotContext {
        let hl = pivots::PivotDetector::new(self.n1, self.n2, pivots::PriceField::HighLow);
        let close = pivots::PivotDetector::new(self.n1, self.n2, pivots::PriceField::Close);
        let short =
            pivots::PivotDetector::new(self.short_arm, self.short_arm, pivots::PriceField::HighLow);

        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();

        let finder = pivots::ExtremaFinder {
            smooth: self.smooth,
            smoothing_period: self.smoothing_period,
            refine_window: self.refine_window,
        };

        PivotContext {
            marks: hl.mark_all(bars),
            close_marks: close.mark_all(bars),
            short_marks: short.mark_all(bars),
            close_extrema_marks: pivots::strict_extrema_marks(&closes),
            extrema: finder.find_extrema(&closes),
        }
    }
}

// ============================================================
// PATTERN CLASSIFIER TRAITS
// ============================================================

/// Generic pattern classifier trait - for concrete types.
///
/// A classifier is a pure predicate over one scan position: it assembles
/// its pivot window from the precomputed context, fits the trend lines it
/// needs, and either emits a match or returns `None`. "No match" is the
/// overwhelmingly common, non-exceptional outcome.
pub trait PatternClassifier: Send + Sync {
    fn id(&self) -> PatternId;

    /// Minimum series length before this classifier can fire at all
    fn min_bars(&self) -> usize;

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe pattern classifier trait - for custom classifiers
pub trait DynPatternClassifier: Send + Sync {
    fn id(&self) -> PatternId;
    fn min_bars(&self) -> usize;
    fn detect(
        &self,
        bars: &[&dyn OHLCV],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch>;
    fn validate_config(&self) -> Result<()>;
}

impl<C: PatternClassifier> DynPatternClassifier for C {
    fn id(&self) -> PatternId {
        PatternClassifier::id(self)
    }

    fn min_bars(&self) -> usize {
        PatternClassifier::min_bars(self)
    }

    fn detect(
        &self,
        bars: &[&dyn OHLCV],
        index: usize,
        ctx: &PivotContext,
    ) -> Option<PatternMatch> {
        PatternClassifier::detect(self, bars, index, ctx)
    }

    fn validate_config(&self) -> Result<()> {
        PatternClassifier::validate_config(self)
    }
}

// ============================================================
// BUILTIN CLASSIFIERS - generated via macro
// ============================================================

use classifiers::*;

/// Macro to generate the BuiltinClassifier enum without boilerplate
macro_rules! define_builtin_classifiers {
    (
        $(
            $variant:ident($classifier:ty)
        ),* $(,)?
    ) => {
        /// All builtin classifiers - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinClassifier {
            $($variant($classifier)),*
        }

        impl BuiltinClassifier {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                index: usize,
                ctx: &PivotContext,
            ) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(c) => PatternClassifier::detect(c, bars, index, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(c) => PatternClassifier::id(c)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(c) => PatternClassifier::min_bars(c)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(c) => PatternClassifier::validate_config(c)),*
                }
            }
        }
    };
}

define_builtin_classifiers! {
    // Triangles
    SymmetricTriangle(SymmetricTriangleClassifier),
    AscendingTriangle(AscendingTriangleClassifier),
    DescendingTriangle(DescendingTriangleClassifier),

    // Parallel / converging channels
    Flag(FlagClassifier),
    Wedge(WedgeClassifier),

    // Reversals
    DoubleTop(DoubleTopClassifier),
    DoubleBottom(DoubleBottomClassifier),
    TripleTop(TripleTopClassifier),
    TripleBottom(TripleBottomClassifier),
    HeadAndShoulders(HeadAndShouldersClassifier),
    InverseHeadAndShoulders(InverseHeadAndShouldersClassifier),

    // Curvature
    RoundingBottom(RoundingBottomClassifier),
}

// ============================================================
// SCAN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub validate_data: bool,
    pub pattern_filter: Option<Vec<PatternId>>,
}

/// Main pattern scanning engine.
///
/// Slides over the bar series, invoking every registered classifier at
/// each index against a context computed once per scan. Overlapping
/// windows may yield adjacent matches; no deduplication is performed.
pub struct ScanEngine<P: PivotProvider = DefaultPivotProvider> {
    builtin: Vec<BuiltinClassifier>,
    custom: Vec<Box<dyn DynPatternClassifier>>,
    provider: P,
    config: EngineConfig,
}

impl<P: PivotProvider> ScanEngine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
            provider,
            config: EngineConfig::default(),
        }
    }

    // ===========================================
    // LOW-LEVEL: Primitives
    // ===========================================

    /// Precompute the pivot context for a series.
    /// Callers doing repeated partial scans store and reuse the result.
    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> PivotContext {
        self.provider.compute_all(bars)
    }

    // ===========================================
    // MID-LEVEL: Single position / range
    // ===========================================

    /// Detect patterns anchored at a single bar index.
    pub fn scan_at<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PivotContext,
    ) -> Vec<PatternMatch> {
        if self.custom.is_empty() {
            self.scan_at_internal(bars, &[], index, ctx)
        } else {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            self.scan_at_internal(bars, &bar_refs, index, ctx)
        }
    }

    /// Detect patterns anchored inside a range of bar indices.
    pub fn scan_range<T: OHLCV>(
        &self,
        bars: &[T],
        range: std::ops::Range<usize>,
        ctx: &PivotContext,
    ) -> Vec<PatternMatch> {
        let mut results = Vec::new();

        if self.custom.is_empty() {
            for i in range {
                results.extend(self.scan_at_internal(bars, &[], i, ctx));
            }
        } else {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            for i in range {
                results.extend(self.scan_at_internal(bars, &bar_refs, i, ctx));
            }
        }

        results
    }

    // ===========================================
    // HIGH-LEVEL: Full series
    // ===========================================

    /// Scan the whole series and return the matches in anchor order.
    pub fn scan<T: OHLCV>(&self, bars: &[T]) -> Result<Vec<PatternMatch>> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }

        let ctx = self.compute_context(bars);
        Ok(self.scan_range(bars, 0..bars.len(), &ctx))
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn scan_at_internal<T: OHLCV>(
        &self,
        bars: &[T],
        bar_refs: &[&dyn OHLCV],
        index: usize,
        ctx: &PivotContext,
    ) -> Vec<PatternMatch> {
        let mut results = Vec::new();

        // Fast path: builtin classifiers (enum dispatch, no vtable)
        for classifier in &self.builtin {
            if bars.len() >= classifier.min_bars() {
                if let Some(m) = classifier.detect(bars, index, ctx) {
                    if self.should_include(&m) {
                        results.push(m);
                    }
                }
            }
        }

        // Slow path: custom classifiers (vtable)
        if !self.custom.is_empty() && !bar_refs.is_empty() {
            for classifier in &self.custom {
                if bars.len() >= classifier.min_bars() {
                    if let Some(m) = classifier.detect(bar_refs, index, ctx) {
                        if self.should_include(&m) {
                            results.push(m);
                        }
                    }
                }
            }
        }

        results
    }

    fn should_include(&self, m: &PatternMatch) -> bool {
        if let Some(ref filter) = self.config.pattern_filter {
            if !filter.contains(&m.pattern_id) {
                return false;
            }
        }
        true
    }

    fn validate_bars<T: OHLCV>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                PatternError::InvalidOHLCV { reason, .. } => {
                    PatternError::InvalidOHLCV { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for c in &self.builtin {
            c.validate_config()?;
        }
        for c in &self.custom {
            c.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating ScanEngine instances
pub struct EngineBuilder<P: PivotProvider = DefaultPivotProvider> {
    provider: P,
    builtin: Vec<BuiltinClassifier>,
    custom: Vec<Box<dyn DynPatternClassifier>>,
    config: EngineConfig,
}

impl Default for EngineBuilder<DefaultPivotProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultPivotProvider> {
    pub fn new() -> Self {
        Self {
            provider: DefaultPivotProvider::default(),
            builtin: Vec::new(),
            custom: Vec::new(),
            config: EngineConfig::default(),
        }
    }
}

/// Generate an array of `BuiltinClassifier` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinClassifier::$variant(Default::default())),*]
  };
}

impl<P: PivotProvider> EngineBuilder<P> {
    /// Change pivot provider
    pub fn pivot_provider<P2: PivotProvider>(self, provider: P2) -> EngineBuilder<P2> {
        EngineBuilder {
            provider,
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
        }
    }

    /// Add all builtin classifiers with default thresholds
    pub fn with_all_defaults(self) -> Self {
        self.with_triangle_defaults()
            .with_channel_defaults()
            .with_reversal_defaults()
            .with_rounding_default()
    }

    /// Add the three triangle classifiers with defaults
    pub fn with_triangle_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            SymmetricTriangle,
            AscendingTriangle,
            DescendingTriangle,
        ]);
        self
    }

    /// Add the flag and wedge classifiers with defaults
    pub fn with_channel_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![Flag, Wedge]);
        self
    }

    /// Add the double/triple top-bottom and head-and-shoulders classifiers
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            DoubleTop,
            DoubleBottom,
            TripleTop,
            TripleBottom,
            HeadAndShoulders,
            InverseHeadAndShoulders,
        ]);
        self
    }

    /// Add the rounding bottom classifier with defaults
    pub fn with_rounding_default(mut self) -> Self {
        self.builtin.extend(builtin_defaults![RoundingBottom]);
        self
    }

    /// Add a builtin classifier
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, classifier: BuiltinClassifier) -> Self {
        self.builtin.push(classifier);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, classifier: BuiltinClassifier) -> Result<Self> {
        classifier.validate_config()?;
        self.builtin.push(classifier);
        Ok(self)
    }

    /// Add a custom classifier (slow path)
    pub fn add_custom<C: DynPatternClassifier + 'static>(mut self, classifier: C) -> Self {
        self.custom.push(Box::new(classifier));
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.config.pattern_filter = Some(ids.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<ScanEngine<P>> {
        let engine = ScanEngine {
            builtin: self.builtin,
            custom: self.custom,
            provider: self.provider,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<PatternMatch>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel scanning of multiple instruments.
///
/// Each instrument is scanned independently on its own read-only slice, so
/// no ordering or locking is needed between workers; the per-instrument
/// match lists keep their deterministic anchor order.
pub fn scan_parallel<'a, T, I, P>(
    engine: &ScanEngine<P>,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    P: PivotProvider + Sync,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(bars)
                .map(|patterns| ScanResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Default engine with DefaultPivotProvider
pub type DefaultEngine = ScanEngine<DefaultPivotProvider>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Test OHLC bar
    #[derive(Debug, Clone)]
    struct Bar {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
    }

    impl Bar {
        fn new(o: f64, h: f64, l: f64, c: f64) -> Self {
            Self { o, h, l, c }
        }
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.o
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

    fn make_oscillating_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + ((i % 7) as f64 - 3.0).abs();
                Bar::new(base, base + 1.0, base - 1.0, base + 0.2)
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_tolerance_validation() {
        assert!(Tolerance::new(1e-3).is_ok());
        assert!(Tolerance::new(0.0).is_err());
        assert!(Tolerance::new(-1.0).is_err());
        assert!(Tolerance::new(f64::NAN).is_err());
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_empty_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars: Vec<Bar> = vec![];
        let matches = engine.scan(&bars).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_all_defaults_count() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        assert_eq!(engine.builtin.len(), 12);
    }

    #[test]
    fn test_builder_add_with_defaults() {
        // Hand-picked registration path: each classifier constructed via
        // its with_defaults() constructor rather than the family presets.
        let engine = EngineBuilder::new()
            .add(BuiltinClassifier::AscendingTriangle(
                AscendingTriangleClassifier::with_defaults(),
            ))
            .add(BuiltinClassifier::Flag(FlagClassifier::with_defaults()))
            .add(BuiltinClassifier::DoubleTop(DoubleTopClassifier::with_defaults()))
            .add(BuiltinClassifier::HeadAndShoulders(
                HeadAndShouldersClassifier::with_defaults(),
            ))
            .add(BuiltinClassifier::RoundingBottom(
                RoundingBottomClassifier::with_defaults(),
            ))
            .build()
            .unwrap();

        assert_eq!(engine.builtin.len(), 5);

        let bars = make_oscillating_bars(120);
        let matches = engine.scan(&bars).unwrap();
        let full = EngineBuilder::new()
            .only_patterns([
                PatternId("CHT_ASCTRIANGLE"),
                PatternId("CHT_FLAG"),
                PatternId("CHT_DOUBLETOP"),
                PatternId("CHT_HEADSHOULDERS"),
                PatternId("CHT_ROUNDINGBOTTOM"),
            ])
            .with_all_defaults()
            .build()
            .unwrap();
        assert_eq!(matches, full.scan(&bars).unwrap());
    }

    #[test]
    fn test_validate_data_rejects_nan() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .validate_data(true)
            .build()
            .unwrap();

        let mut bars = make_oscillating_bars(10);
        bars[4].c = f64::NAN;

        assert!(engine.scan(&bars).is_err());
    }

    #[test]
    fn test_validate_data_reports_index() {
        let engine = EngineBuilder::new()
            .with_all_defaults()
            .validate_data(true)
            .build()
            .unwrap();

        let mut bars = make_oscillating_bars(10);
        bars[7].h = bars[7].l - 1.0; // high < low

        match engine.scan(&bars) {
            Err(PatternError::InvalidOHLCV { index, .. }) => assert_eq!(index, 7),
            other => panic!("expected InvalidOHLCV, got {other:?}"),
        }
    }

    #[test]
    fn test_compute_context_lengths() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars = make_oscillating_bars(50);
        let ctx = engine.compute_context(&bars);

        assert_eq!(ctx.marks.len(), bars.len());
        assert_eq!(ctx.close_marks.len(), bars.len());
        assert_eq!(ctx.short_marks.len(), bars.len());
        assert_eq!(ctx.close_extrema_marks.len(), bars.len());
    }

    #[test]
    fn test_scan_deterministic() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars = make_oscillating_bars(120);

        let first = engine.scan(&bars).unwrap();
        let second = engine.scan(&bars).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parallel_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

        let bars1 = make_oscillating_bars(80);
        let bars2 = make_oscillating_bars(90);

        let instruments: Vec<(&str, &[Bar])> = vec![("EURUSD", &bars1), ("GBPUSD", &bars2)];

        let (results, errors) = scan_parallel(&engine, instruments);
        assert_eq!(results.len(), 2);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_pattern_id_directions() {
        assert!(PatternId("CHT_DOUBLETOP").is_typically_bearish());
        assert!(PatternId("CHT_ROUNDINGBOTTOM").is_typically_bullish());
        assert!(PatternId("CHT_WEDGE").is_bidirectional());
        assert_eq!(
            PatternId("CHT_SYMTRIANGLE").typical_direction(),
            Some(Direction::Neutral)
        );
    }
}
