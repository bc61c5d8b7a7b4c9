//! Analysis parameters
//!
//! Every tunable of the engine lives here, grouped the way the analyzers
//! consume them. A [`Parameters`] value is validated once at construction
//! and then shared read-only across the pipeline; analyzers never mutate it.
//!
//! # Example
//!
//! ```rust
//! use marketflow::params::Parameters;
//!
//! let params = Parameters::default();
//! assert!(params.validate().is_ok());
//!
//! // Parameters round-trip through JSON config documents.
//! let json = params.to_json_string().unwrap();
//! let reloaded = Parameters::from_json_str(&json).unwrap();
//! assert_eq!(reloaded.volume.lookback_period, params.volume.lookback_period);
//! ```

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Result};

// ============================================================
// TIMEFRAMES
// ============================================================

/// A single timeframe request: bar interval plus lookback period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
  /// Bar interval, e.g. `"1d"`, `"1h"`, `"15m"`.
  pub interval: String,
  /// Lookback period, e.g. `"60d"`, `"10d"`.
  pub period: String,
}

impl Timeframe {
  pub fn new(interval: impl Into<String>, period: impl Into<String>) -> Self {
    Self { interval: interval.into(), period: period.into() }
  }
}

// ============================================================
// PARAMETER SECTIONS
// ============================================================

/// Volume classification thresholds, applied to the volume ratio
/// (`volume / rolling_mean(volume, lookback_period)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeThresholds {
  /// Ratio at or above this is `VeryHigh`.
  pub very_high_threshold: f64,
  /// Ratio at or above this is `High`.
  pub high_threshold: f64,
  /// Ratio below this (and above very_low) is `Low`.
  pub low_threshold: f64,
  /// Ratio below this is `VeryLow`.
  pub very_low_threshold: f64,
  /// Rolling window for the average-volume baseline.
  pub lookback_period: usize,
}

impl Default for VolumeThresholds {
  fn default() -> Self {
    Self {
      very_high_threshold: 2.0,
      high_threshold: 1.3,
      low_threshold: 0.6,
      very_low_threshold: 0.3,
      lookback_period: 10,
    }
  }
}

/// Candle classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleThresholds {
  /// Minimum body fraction of the bar range for a wide candle.
  pub wide_body_threshold: f64,
  /// Maximum body fraction of the bar range for a narrow candle.
  pub narrow_body_threshold: f64,
  /// Spread must exceed this multiple of the rolling mean spread to be wide.
  pub wide_spread_threshold: f64,
  /// Spread must stay under this multiple of the rolling mean spread to be narrow.
  pub narrow_spread_threshold: f64,
  /// A wick at least this multiple of the spread marks a wick candle.
  pub wick_ratio: f64,
  /// Rolling window for the average-spread baseline.
  pub lookback_period: usize,
}

impl Default for CandleThresholds {
  fn default() -> Self {
    Self {
      wide_body_threshold: 0.6,
      narrow_body_threshold: 0.3,
      wide_spread_threshold: 1.3,
      narrow_spread_threshold: 0.6,
      wick_ratio: 1.5,
      lookback_period: 10,
    }
  }
}

/// Trend analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParameters {
  /// Window (in bars) for trend and direction calculations.
  pub lookback_period: usize,
  /// Percent change above which a trend is a full `Up`/`Down`.
  pub strong_threshold_pct: f64,
  /// Percent change above which a trend is at least `SlightUp`/`SlightDown`.
  pub slight_threshold_pct: f64,
  /// Percent threshold for a significant OBV move.
  pub volume_change_threshold_pct: f64,
  /// Percent threshold (ATR-scaled) for per-bar price direction.
  pub direction_threshold_pct: f64,
  /// Replace raw close readings with EMA(close, lookback) for direction.
  pub use_ema: bool,
  /// ATR window.
  pub atr_period: usize,
}

impl Default for TrendParameters {
  fn default() -> Self {
    Self {
      lookback_period: 5,
      strong_threshold_pct: 5.0,
      slight_threshold_pct: 2.0,
      volume_change_threshold_pct: 10.0,
      direction_threshold_pct: 5.0,
      use_ema: false,
      atr_period: 14,
    }
  }
}

/// Pattern recognition parameters shared by the window-based detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParameters {
  /// Trailing window length for all pattern detectors.
  pub pattern_window: usize,
  /// Max (high-low range / mean close) for a window to count as sideways.
  pub sideways_pct: f64,
  /// Relative tolerance for a low/high to count as touching a level.
  pub touch_tolerance_pct: f64,
  /// Minimum high-volume bars for accumulation/distribution.
  pub min_high_vol: usize,
  /// Minimum support/resistance tests for accumulation/distribution.
  pub min_tests: usize,
  /// Close must be within this fraction of the window extreme for a climax.
  pub climax_band_pct: f64,
  /// Divisor applied to the accumulation/distribution vote count.
  pub strength_scale: usize,
  /// Cap on the testing-pattern strength.
  pub max_tests: usize,
}

impl Default for PatternParameters {
  fn default() -> Self {
    Self {
      pattern_window: 20,
      sideways_pct: 0.08,
      touch_tolerance_pct: 0.01,
      min_high_vol: 2,
      min_tests: 1,
      climax_band_pct: 0.03,
      strength_scale: 2,
      max_tests: 5,
    }
  }
}

/// Support/resistance derivation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportResistanceParameters {
  /// Symmetric pivot window: a pivot beats `pivot_window` closes on each side.
  pub pivot_window: usize,
  /// Pivots within this relative distance merge into one level.
  pub cluster_tolerance_pct: f64,
  /// Retained levels per side.
  pub max_levels: usize,
  /// Trailing bars examined for pivots.
  pub lookback: usize,
}

impl Default for SupportResistanceParameters {
  fn default() -> Self {
    Self { pivot_window: 2, cluster_tolerance_pct: 0.01, max_levels: 5, lookback: 50 }
  }
}

/// Signal synthesis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParameters {
  /// Alignment fraction required for a strong signal.
  pub strong_alignment_pct: f64,
  /// Alignment fraction required for a moderate signal.
  pub moderate_alignment_pct: f64,
}

impl Default for SignalParameters {
  fn default() -> Self {
    Self { strong_alignment_pct: 0.6, moderate_alignment_pct: 0.3 }
  }
}

/// Risk assessment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParameters {
  /// Fraction of account equity risked per trade. Must be in (0, 0.10).
  pub default_risk_percent: f64,
  /// Target reward multiple used by percent fallbacks. Must be >= 1.0.
  pub default_risk_reward: f64,
  /// Buffer pushed beyond a support/resistance stop level.
  pub stop_buffer_pct: f64,
  /// Percent stop distance when no usable level exists.
  pub default_stop_pct: f64,
}

impl Default for RiskParameters {
  fn default() -> Self {
    Self {
      default_risk_percent: 0.01,
      default_risk_reward: 2.0,
      stop_buffer_pct: 0.005,
      default_stop_pct: 0.02,
    }
  }
}

/// Account sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountParameters {
  pub account_equity: f64,
}

impl Default for AccountParameters {
  fn default() -> Self {
    Self { account_equity: 10_000.0 }
  }
}

/// Wyckoff analyzer tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WyckoffParameters {
  /// Rolling window for volume/range baselines.
  pub vol_lookback: usize,
  /// Symmetric swing-point window.
  pub swing_n: usize,
  /// Volume spike multiple required for a climax bar.
  pub climax_vol_multiplier: f64,
  /// Range spike multiple required for a climax bar.
  pub climax_range_multiplier: f64,
  /// Volume spike multiple required for a SOS/SOW breakout.
  pub breakout_vol_multiplier: f64,
  /// Max relative depth of a spring/upthrust pierce.
  pub spring_pct: f64,
  /// Volume spike multiple required to qualify a spring.
  pub spring_vol_multiplier: f64,
  /// Max bars between a climax and its automatic rally/reaction.
  pub ar_window: usize,
  /// Relative band around the climax price for a secondary test.
  pub test_band_pct: f64,
  /// Minimum bars a trading range must span before breakout events count.
  pub range_min_length: usize,
  /// Breakout gap above resistance that earns a JAC tag alongside SOS.
  pub jac_gap_pct: f64,
}

impl Default for WyckoffParameters {
  fn default() -> Self {
    Self {
      vol_lookback: 20,
      swing_n: 5,
      climax_vol_multiplier: 2.0,
      climax_range_multiplier: 1.5,
      breakout_vol_multiplier: 1.5,
      spring_pct: 0.01,
      spring_vol_multiplier: 1.0,
      ar_window: 15,
      test_band_pct: 0.03,
      range_min_length: 5,
      jac_gap_pct: 0.02,
    }
  }
}

/// Point-in-time analysis parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointInTimeParameters {
  /// Minimum bars a truncated series must retain post-warmup.
  pub min_required_bars: usize,
}

impl Default for PointInTimeParameters {
  fn default() -> Self {
    Self { min_required_bars: 30 }
  }
}

// ============================================================
// PARAMETERS
// ============================================================

/// Immutable configuration for a full analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
  pub volume: VolumeThresholds,
  pub candle: CandleThresholds,
  pub trend: TrendParameters,
  pub pattern: PatternParameters,
  pub support_resistance: SupportResistanceParameters,
  pub signal: SignalParameters,
  pub risk: RiskParameters,
  pub account: AccountParameters,
  pub wyckoff: WyckoffParameters,
  pub timeframes: Vec<Timeframe>,
  pub point_in_time: PointInTimeParameters,
}

impl Default for Parameters {
  fn default() -> Self {
    Self {
      volume: VolumeThresholds::default(),
      candle: CandleThresholds::default(),
      trend: TrendParameters::default(),
      pattern: PatternParameters::default(),
      support_resistance: SupportResistanceParameters::default(),
      signal: SignalParameters::default(),
      risk: RiskParameters::default(),
      account: AccountParameters::default(),
      wyckoff: WyckoffParameters::default(),
      timeframes: vec![
        Timeframe::new("1d", "60d"),
        Timeframe::new("1h", "30d"),
        Timeframe::new("15m", "10d"),
      ],
      point_in_time: PointInTimeParameters::default(),
    }
  }
}

impl Parameters {
  /// Build validated parameters. Prefer this over mutating a `Default`
  /// value when the thresholds come from user input.
  pub fn new() -> Result<Self> {
    let params = Self::default();
    params.validate()?;
    Ok(params)
  }

  /// Parse parameters from a JSON configuration document and validate them.
  pub fn from_json_str(json: &str) -> Result<Self> {
    let params: Self = serde_json::from_str(json)
      .map_err(|e| AnalysisError::InvalidConfig(format!("bad parameter document: {e}")))?;
    params.validate()?;
    Ok(params)
  }

  /// Serialize the parameters back to a JSON configuration document.
  pub fn to_json_string(&self) -> Result<String> {
    serde_json::to_string_pretty(self)
      .map_err(|e| AnalysisError::Internal(format!("parameter serialization failed: {e}")))
  }

  /// The primary timeframe interval: first in the list, `"1d"` when empty.
  pub fn primary_timeframe(&self) -> &str {
    self.timeframes.first().map(|tf| tf.interval.as_str()).unwrap_or("1d")
  }

  /// Minimum aligned series length any analyzer will accept.
  pub fn min_required_bars(&self) -> usize {
    let warmup = self
      .volume
      .lookback_period
      .max(self.wyckoff.vol_lookback)
      .max(self.trend.atr_period);
    warmup + self.wyckoff.swing_n
  }

  /// Validate all sections and cross-parameter invariants.
  pub fn validate(&self) -> Result<()> {
    let v = &self.volume;
    // Strict ordering: very_high > high > 1.0 > low > very_low > 0.
    if !(v.very_high_threshold > v.high_threshold
      && v.high_threshold > 1.0
      && 1.0 > v.low_threshold
      && v.low_threshold > v.very_low_threshold
      && v.very_low_threshold > 0.0)
    {
      return Err(AnalysisError::InvalidConfig(format!(
        "volume thresholds must satisfy very_high > high > 1.0 > low > very_low > 0, got \
         ({}, {}, {}, {})",
        v.very_high_threshold, v.high_threshold, v.low_threshold, v.very_low_threshold
      )));
    }
    if v.lookback_period == 0 {
      return Err(AnalysisError::InvalidConfig("volume.lookback_period must be > 0".into()));
    }

    let c = &self.candle;
    if !(0.0..=1.0).contains(&c.wide_body_threshold)
      || !(0.0..=1.0).contains(&c.narrow_body_threshold)
    {
      return Err(AnalysisError::OutOfRange {
        field: "candle body thresholds",
        value: c.wide_body_threshold,
        min: 0.0,
        max: 1.0,
      });
    }
    if c.narrow_body_threshold > c.wide_body_threshold {
      return Err(AnalysisError::InvalidConfig(
        "candle.narrow_body_threshold must not exceed candle.wide_body_threshold".into(),
      ));
    }
    if c.lookback_period == 0 {
      return Err(AnalysisError::InvalidConfig("candle.lookback_period must be > 0".into()));
    }

    let t = &self.trend;
    if t.lookback_period == 0 || t.atr_period == 0 {
      return Err(AnalysisError::InvalidConfig(
        "trend.lookback_period and trend.atr_period must be > 0".into(),
      ));
    }
    if t.slight_threshold_pct > t.strong_threshold_pct {
      return Err(AnalysisError::InvalidConfig(
        "trend.slight_threshold_pct must not exceed trend.strong_threshold_pct".into(),
      ));
    }

    let p = &self.pattern;
    if p.pattern_window == 0 {
      return Err(AnalysisError::InvalidConfig("pattern.pattern_window must be > 0".into()));
    }
    if p.strength_scale == 0 {
      return Err(AnalysisError::InvalidConfig("pattern.strength_scale must be > 0".into()));
    }

    let sr = &self.support_resistance;
    if sr.pivot_window == 0 || sr.lookback == 0 {
      return Err(AnalysisError::InvalidConfig(
        "support_resistance.pivot_window and lookback must be > 0".into(),
      ));
    }

    let s = &self.signal;
    for (field, value) in [
      ("signal.strong_alignment_pct", s.strong_alignment_pct),
      ("signal.moderate_alignment_pct", s.moderate_alignment_pct),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(AnalysisError::OutOfRange { field, value, min: 0.0, max: 1.0 });
      }
    }
    if s.moderate_alignment_pct > s.strong_alignment_pct {
      return Err(AnalysisError::InvalidConfig(
        "signal.moderate_alignment_pct must not exceed signal.strong_alignment_pct".into(),
      ));
    }

    let r = &self.risk;
    if !(r.default_risk_percent > 0.0 && r.default_risk_percent < 0.10) {
      return Err(AnalysisError::OutOfRange {
        field: "risk.default_risk_percent",
        value: r.default_risk_percent,
        min: 0.0,
        max: 0.10,
      });
    }
    if r.default_risk_reward < 1.0 {
      return Err(AnalysisError::OutOfRange {
        field: "risk.default_risk_reward",
        value: r.default_risk_reward,
        min: 1.0,
        max: f64::INFINITY,
      });
    }
    if r.default_stop_pct <= 0.0 || r.stop_buffer_pct < 0.0 {
      return Err(AnalysisError::InvalidConfig(
        "risk.default_stop_pct must be > 0 and risk.stop_buffer_pct >= 0".into(),
      ));
    }

    if self.account.account_equity <= 0.0 {
      return Err(AnalysisError::InvalidConfig("account.account_equity must be > 0".into()));
    }

    let w = &self.wyckoff;
    if w.vol_lookback == 0 || w.swing_n == 0 {
      return Err(AnalysisError::InvalidConfig(
        "wyckoff.vol_lookback and wyckoff.swing_n must be > 0".into(),
      ));
    }
    if w.climax_vol_multiplier <= 1.0 || w.climax_range_multiplier <= 1.0 {
      return Err(AnalysisError::InvalidConfig(
        "wyckoff climax multipliers must exceed 1.0".into(),
      ));
    }
    if w.spring_pct <= 0.0 || w.test_band_pct <= 0.0 || w.jac_gap_pct <= 0.0 {
      return Err(AnalysisError::InvalidConfig(
        "wyckoff.spring_pct, test_band_pct and jac_gap_pct must be > 0".into(),
      ));
    }

    Ok(())
  }
}

// ============================================================
// TESTS
// ============================================================
