//! # MarketFlow
//!
//! Deterministic multi-timeframe volume-price analysis (VPA) and Wyckoff
//! engine. The engine consumes aligned OHLCV series through an injected
//! [`DataProvider`] and emits structured analysis: candle and volume
//! classifications, trend descriptions, pattern detections,
//! support/resistance levels, Wyckoff events and phases, a consolidated
//! signal and a risk assessment.
//!
//! ## Quick Start
//!
//! ```rust
//! use marketflow::prelude::*;
//!
//! // Feed the engine deterministic data through the provider capability.
//! let provider = InMemoryProvider::new();
//! let mut price = BarSeries::new();
//! let mut volume = VolumeSeries::new();
//! for i in 0..60i64 {
//!     let base = 100.0 + i as f64 * 0.4;
//!     price.push(i, base, base + 1.0, base - 1.0, base + 0.3);
//!     volume.push(i, 1_000.0);
//! }
//! provider.insert("ACME", "1d", price, volume);
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let timeframes = vec![Timeframe::new("1d", "60d")];
//! let result = engine
//!     .analyze(&provider, "ACME", Some(&timeframes), &CancelToken::new())
//!     .unwrap();
//!
//! assert_eq!(result.ticker, "ACME");
//! assert!(result.current_price.is_some());
//! ```
//!
//! The engine is a pure library: no I/O, no global state, deterministic for
//! a given input and parameter set. Analyses of different tickers share
//! nothing but the read-only [`Parameters`] and may run in parallel via
//! [`analyze_parallel`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub mod analyzers;
pub mod multi_timeframe;
pub mod params;
pub mod point_in_time;
pub mod processor;
pub mod provider;
pub mod series;
pub mod signals;
pub mod wyckoff;

pub mod prelude {
    pub use crate::{
        analyze_parallel,
        analyzers::{
            BarSignal, CandleAnalyzer, Level, LevelTest, PatternAnalysis, PatternDetection,
            PatternRecognizer, SupportResistance, SupportResistanceAnalyzer, TestingDetection,
            TrendAnalyzer, TrendResult,
        },
        multi_timeframe::{
            Confirmations, MultiTimeframeAnalyzer, MultiTimeframeReport, TimeframeAnalysis,
        },
        params::{Parameters, Timeframe},
        point_in_time::{PointInTimeAnalyzer, PointInTimeReport, PointInTimeSignal},
        processor::DataProcessor,
        provider::{DataProvider, InMemoryProvider, ProviderError},
        series::{BarSeries, Processed, VolumeSeries},
        signals::{RiskAssessment, RiskAssessor, Signal, SignalEvidence, SignalGenerator},
        wyckoff::{
            MarketContext, PhaseSpan, RangeKind, TradingRange, WyckoffAnalyzer, WyckoffEvent,
            WyckoffEventKind, WyckoffPhase, WyckoffResult,
        },
        scan_for_signals, AnalysisError, AnalysisResult, BatchError, CancelToken, CandleClass,
        EngineBuilder, LevelTestKind, MarketflowEngine, PriceDirection, Result, SignalBias,
        SignalStrength, SignalSummary, SignalType, TrendDirection, TrendSignal, VolumeClass,
        VolumeDirection,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors surfaced at the analysis boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("data integrity violation at index {index}: {reason}")]
    DataIntegrity { index: usize, reason: &'static str },

    #[error("index {index} out of range for series of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Provider(#[from] provider::ProviderError),

    #[error("analysis cancelled")]
    Cancelled,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

// ============================================================
// CLASSIFICATION ENUMS
// ============================================================

/// Final signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Buy,
    Sell,
    NoAction,
}

/// Final signal strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Strong,
    Moderate,
    Neutral,
}

/// Bullish/bearish lean of an individual analysis facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalBias {
    Bullish,
    Bearish,
    Neutral,
}

/// Volume classification relative to its rolling baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeClass {
    VeryHigh,
    High,
    Average,
    Low,
    VeryLow,
}

impl VolumeClass {
    /// Ordinal rank; classes of higher ratios rank higher.
    #[inline]
    pub fn rank(self) -> u8 {
        match self {
            VolumeClass::VeryLow => 0,
            VolumeClass::Low => 1,
            VolumeClass::Average => 2,
            VolumeClass::High => 3,
            VolumeClass::VeryHigh => 4,
        }
    }

    #[inline]
    pub fn is_high(self) -> bool {
        matches!(self, VolumeClass::High | VolumeClass::VeryHigh)
    }

    #[inline]
    pub fn is_low(self) -> bool {
        matches!(self, VolumeClass::Low | VolumeClass::VeryLow)
    }
}

/// Candle classification from spread, body and wicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandleClass {
    Wide,
    Narrow,
    Wick,
    Neutral,
}

/// Graded trend direction over a lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Up,
    SlightUp,
    Sideways,
    SlightDown,
    Down,
}

impl TrendDirection {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, TrendDirection::Up | TrendDirection::SlightUp)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, TrendDirection::Down | TrendDirection::SlightDown)
    }
}

/// Per-bar price direction against an ATR-scaled threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceDirection {
    Up,
    Down,
    Sideways,
}

/// Volume direction from the OBV slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeDirection {
    Increasing,
    Decreasing,
    Flat,
}

/// Trend/volume agreement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendSignal {
    TrendValidation,
    TrendAnomaly,
    Consolidation,
}

/// Kind of level test found by the pattern recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelTestKind {
    SupportTest,
    ResistanceTest,
}

// ============================================================
// CANCELLATION
// ============================================================

/// Cooperative cancellation signal, observed between timeframes and
/// between the primary analysis phases.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================
// ANALYSIS RESULT
// ============================================================

use analyzers::SupportResistance;
use multi_timeframe::{Confirmations, MultiTimeframeAnalyzer, TimeframeAnalysis};
use params::{Parameters, Timeframe};
use point_in_time::{PointInTimeAnalyzer, PointInTimeReport};
use provider::DataProvider;
use series::{BarSeries, VolumeSeries};
use signals::{RiskAssessment, RiskAssessor, Signal, SignalGenerator};
use wyckoff::{WyckoffAnalyzer, WyckoffResult};

/// Everything a single call to [`MarketflowEngine::analyze`] produces.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub ticker: String,
    pub current_price: Option<f64>,
    /// Per-timeframe analyses in request order.
    pub timeframe_analyses: Vec<(String, TimeframeAnalysis)>,
    /// Timeframes that failed to fetch or analyze, with their errors.
    pub failed_timeframes: Vec<(String, AnalysisError)>,
    pub confirmations: Confirmations,
    pub signal: Signal,
    /// Absent when the signal is `NO_ACTION` or no price was available.
    pub risk_assessment: Option<RiskAssessment>,
    /// Wyckoff events/phases/ranges per timeframe, in request order.
    pub wyckoff: Vec<(String, WyckoffResult)>,
}

impl AnalysisResult {
    /// Human-readable multi-line explanation of the signal and its
    /// supporting evidence.
    pub fn explain(&self) -> String {
        let mut out = format!(
            "Analysis for {}:\n\nSignal: {:?} ({:?})\nDetails: {}\n",
            self.ticker, self.signal.signal_type, self.signal.strength, self.signal.details
        );

        if !self.signal.evidence.per_timeframe.is_empty() {
            out.push_str("\nSupporting evidence:\n");
            for tf in &self.signal.evidence.per_timeframe {
                out.push_str(&format!(
                    "  {}: trend {:?}, volume {:?}, candle {:?}",
                    tf.timeframe, tf.trend_direction, tf.volume_class, tf.candle_signal
                ));
                if !tf.patterns.is_empty() {
                    out.push_str(&format!(", patterns: {}", tf.patterns.join(", ")));
                }
                out.push('\n');
            }
        }

        if let Some(price) = self.current_price {
            out.push_str(&format!("\nCurrent price: {price:.2}\n"));
        }
        if let Some(risk) = &self.risk_assessment {
            out.push_str(&format!(
                "Stop loss: {:.2}\nTake profit: {:.2}\nRisk/reward: {:.2}\nPosition size: {:.0} \
                 shares\n",
                risk.stop_loss, risk.take_profit, risk.risk_reward_ratio, risk.position_size
            ));
        }
        out
    }
}

/// Signal-only projection of an [`AnalysisResult`].
#[derive(Debug, Clone)]
pub struct SignalSummary {
    pub ticker: String,
    pub current_price: Option<f64>,
    pub signal: Signal,
    pub risk_assessment: Option<RiskAssessment>,
}

impl From<&AnalysisResult> for SignalSummary {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            ticker: result.ticker.clone(),
            current_price: result.current_price,
            signal: result.signal.clone(),
            risk_assessment: result.risk_assessment.clone(),
        }
    }
}

/// Filter batch results by signal type and/or strength.
pub fn scan_for_signals<'a>(
    results: &'a [AnalysisResult],
    signal_type: Option<SignalType>,
    strength: Option<SignalStrength>,
) -> Vec<&'a AnalysisResult> {
    results
        .iter()
        .filter(|result| {
            signal_type.map_or(true, |t| result.signal.signal_type == t)
                && strength.map_or(true, |s| result.signal.strength == s)
        })
        .collect()
}

// ============================================================
// ENGINE
// ============================================================

/// Facade wiring the whole pipeline: fetch, preprocess, per-timeframe
/// analysis, signal synthesis, risk assessment and Wyckoff annotation.
#[derive(Debug, Clone)]
pub struct MarketflowEngine {
    params: Arc<Parameters>,
    multi_timeframe: MultiTimeframeAnalyzer,
    signal_generator: SignalGenerator,
    risk_assessor: RiskAssessor,
    wyckoff: WyckoffAnalyzer,
    point_in_time: PointInTimeAnalyzer,
}

impl MarketflowEngine {
    /// Build an engine from validated parameters.
    pub fn new(params: Parameters) -> Result<Self> {
        params.validate()?;
        let params = Arc::new(params);
        Ok(Self {
            multi_timeframe: MultiTimeframeAnalyzer::new(Arc::clone(&params)),
            signal_generator: SignalGenerator::new(Arc::clone(&params)),
            risk_assessor: RiskAssessor::new(Arc::clone(&params)),
            wyckoff: WyckoffAnalyzer::new(Arc::clone(&params)),
            point_in_time: PointInTimeAnalyzer::new(Arc::clone(&params)),
            params,
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Analyze one ticker end-to-end.
    ///
    /// Per-timeframe failures (fetch or analysis) are isolated and recorded
    /// in the result; the call fails outright only when no timeframe
    /// succeeds, on invalid configuration, or on cancellation.
    pub fn analyze<P: DataProvider>(
        &self,
        provider: &P,
        ticker: &str,
        timeframes: Option<&[Timeframe]>,
        cancel: &CancelToken,
    ) -> Result<AnalysisResult> {
        let requested: Vec<Timeframe> = match timeframes {
            Some(list) => list.to_vec(),
            None => self.params.timeframes.clone(),
        };
        if requested.is_empty() {
            return Err(AnalysisError::InvalidConfig("no timeframes requested".into()));
        }

        // Fetch phase.
        let mut data = Vec::new();
        let mut failures: Vec<(String, AnalysisError)> = Vec::new();
        for tf in &requested {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            match provider.fetch(ticker, &tf.interval, &tf.period) {
                Ok(pair) => data.push((tf.interval.clone(), pair)),
                Err(error) => {
                    warn!(ticker, timeframe = %tf.interval, %error, "fetch failed");
                    failures.push((tf.interval.clone(), AnalysisError::Provider(error)));
                }
            }
        }
        if data.is_empty() {
            return Err(match failures.into_iter().next() {
                Some((_, error)) => error,
                None => AnalysisError::InsufficientData { need: 1, got: 0 },
            });
        }

        // Preprocess + per-timeframe analysis.
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let mut report = self.multi_timeframe.analyze(&data, cancel)?;
        failures.append(&mut report.failures);
        if report.analyses.is_empty() {
            return Err(match failures.into_iter().next() {
                Some((_, error)) => error,
                None => AnalysisError::InsufficientData { need: 1, got: 0 },
            });
        }

        // Signal synthesis and risk.
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        let mut signal = self.signal_generator.generate(&report);
        let current_price =
            report.primary().and_then(|(_, analysis)| analysis.processed_data.last_close());
        let risk_assessment = match (current_price, report.primary()) {
            (Some(price), Some((_, primary))) => {
                self.risk_assessor.assess(&signal, price, &primary.support_resistance)
            }
            _ => {
                signal.details.push_str(" (current price unavailable for risk assessment)");
                None
            }
        };

        // Wyckoff annotation per timeframe. A failed run leaves that
        // timeframe's annotation empty rather than failing the analysis.
        let mut wyckoff = Vec::new();
        for (timeframe, analysis) in &report.analyses {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            match self.wyckoff.run(&analysis.processed_data) {
                Ok(result) => wyckoff.push((timeframe.clone(), result)),
                Err(error) => {
                    warn!(ticker, %timeframe, %error, "wyckoff analysis failed");
                    wyckoff.push((timeframe.clone(), WyckoffResult::default()));
                }
            }
        }

        debug!(ticker, signal = ?signal.signal_type, "analysis complete");
        Ok(AnalysisResult {
            ticker: ticker.to_string(),
            current_price,
            timeframe_analyses: report.analyses,
            failed_timeframes: failures,
            confirmations: report.confirmations,
            signal,
            risk_assessment,
            wyckoff,
        })
    }

    /// Signal-only projection of [`analyze`](Self::analyze).
    pub fn get_signals<P: DataProvider>(
        &self,
        provider: &P,
        ticker: &str,
        timeframes: Option<&[Timeframe]>,
        cancel: &CancelToken,
    ) -> Result<SignalSummary> {
        self.analyze(provider, ticker, timeframes, cancel).map(|result| (&result).into())
    }

    /// Historical reconstruction: analyze raw series truncated at `cutoff`.
    pub fn analyze_at(
        &self,
        data_by_timeframe: &[(String, (BarSeries, VolumeSeries))],
        cutoff: i64,
    ) -> Result<PointInTimeReport> {
        self.point_in_time.analyze_at(data_by_timeframe, cutoff)
    }

    /// Risk assessment for an externally supplied signal and level set.
    pub fn assess_risk(
        &self,
        signal: &Signal,
        current_price: f64,
        support_resistance: &SupportResistance,
    ) -> Option<RiskAssessment> {
        self.risk_assessor.assess(signal, current_price, support_resistance)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`MarketflowEngine`] instances.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    params: Option<Parameters>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit parameters instead of the defaults.
    pub fn params(mut self, params: Parameters) -> Self {
        self.params = Some(params);
        self
    }

    /// Load parameters from a JSON configuration document.
    pub fn params_json(mut self, json: &str) -> Result<Self> {
        self.params = Some(Parameters::from_json_str(json)?);
        Ok(self)
    }

    /// Build the engine, validating the parameters.
    pub fn build(self) -> Result<MarketflowEngine> {
        MarketflowEngine::new(self.params.unwrap_or_default())
    }
}

// ============================================================
// PARALLEL BATCH ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Error from analyzing a single ticker in a batch.
#[derive(Debug)]
pub struct BatchError {
    pub ticker: String,
    pub error: AnalysisError,
}

/// Analyze multiple tickers in parallel. Each analysis is an independent
/// subgraph over its own data.
pub fn analyze_parallel<'a, P, I>(
    engine: &MarketflowEngine,
    provider: &P,
    tickers: I,
    cancel: &CancelToken,
) -> (Vec<AnalysisResult>, Vec<BatchError>)
where
    P: DataProvider,
    I: IntoParallelIterator<Item = &'a str>,
{
    let outcomes: Vec<_> = tickers
        .into_par_iter()
        .map(|ticker| {
            engine
                .analyze(provider, ticker, None, cancel)
                .map_err(|error| BatchError { ticker: ticker.to_string(), error })
        })
        .collect();

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(error) => errors.push(error),
        }
    }
    (results, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;

    fn make_series(n: usize, slope: f64) -> (BarSeries, VolumeSeries) {
        let mut price = BarSeries::new();
        let mut volume = VolumeSeries::new();
        for i in 0..n {
            let base = 100.0 + slope * i as f64;
            price.push(i as i64, base, base + 1.0, base - 1.0, base + 0.3);
            volume.push(i as i64, 1_000.0);
        }
        (price, volume)
    }

    fn fixture_provider() -> InMemoryProvider {
        let provider = InMemoryProvider::new();
        let (price, volume) = make_series(60, 0.4);
        provider.insert("ACME", "1d", price, volume);
        let (price, volume) = make_series(60, 0.0);
        provider.insert("FLAT", "1d", price, volume);
        provider
    }

    fn daily() -> Vec<Timeframe> {
        vec![Timeframe::new("1d", "60d")]
    }

    #[test]
    fn test_engine_builder_defaults() {
        assert!(EngineBuilder::new().build().is_ok());
    }

    #[test]
    fn test_engine_rejects_invalid_params() {
        let mut params = Parameters::default();
        params.volume.very_low_threshold = 5.0;
        assert!(MarketflowEngine::new(params).is_err());
    }

    #[test]
    fn test_analyze_end_to_end() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider();
        let result =
            engine.analyze(&provider, "ACME", Some(&daily()), &CancelToken::new()).unwrap();

        assert_eq!(result.ticker, "ACME");
        assert_eq!(result.timeframe_analyses.len(), 1);
        assert!(result.failed_timeframes.is_empty());
        assert!(result.current_price.is_some());
        assert_eq!(result.wyckoff.len(), 1);
        // Risk assessment is present exactly when the signal is actionable.
        assert_eq!(
            result.risk_assessment.is_some(),
            result.signal.signal_type != SignalType::NoAction
        );
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider();
        let first =
            engine.analyze(&provider, "ACME", Some(&daily()), &CancelToken::new()).unwrap();
        let second =
            engine.analyze(&provider, "ACME", Some(&daily()), &CancelToken::new()).unwrap();
        assert_eq!(first.signal, second.signal);
        assert_eq!(first.current_price, second.current_price);
        assert_eq!(first.risk_assessment, second.risk_assessment);
    }

    #[test]
    fn test_missing_ticker_surfaces_provider_error() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider();
        let err = engine
            .analyze(&provider, "NOPE", Some(&daily()), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Provider(_)));
    }

    #[test]
    fn test_cancellation_honored() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            engine.analyze(&provider, "ACME", Some(&daily()), &cancel),
            Err(AnalysisError::Cancelled)
        ));
    }

    #[test]
    fn test_partial_timeframe_failure_is_isolated() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider(); // only has 1d data
        let timeframes = vec![Timeframe::new("1d", "60d"), Timeframe::new("1h", "30d")];
        let result = engine
            .analyze(&provider, "ACME", Some(&timeframes), &CancelToken::new())
            .unwrap();
        assert_eq!(result.timeframe_analyses.len(), 1);
        assert_eq!(result.failed_timeframes.len(), 1);
        assert_eq!(result.failed_timeframes[0].0, "1h");
    }

    #[test]
    fn test_parallel_batch() {
        let mut params = Parameters::default();
        params.timeframes = daily();
        let engine = MarketflowEngine::new(params).unwrap();
        let provider = fixture_provider();

        let (results, errors) = analyze_parallel(
            &engine,
            &provider,
            vec!["ACME", "FLAT", "NOPE"],
            &CancelToken::new(),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].ticker, "NOPE");
    }

    #[test]
    fn test_scan_for_signals_filters() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider();
        let result =
            engine.analyze(&provider, "FLAT", Some(&daily()), &CancelToken::new()).unwrap();
        let results = vec![result];

        let no_action = scan_for_signals(&results, Some(SignalType::NoAction), None);
        let buys = scan_for_signals(&results, Some(SignalType::Buy), None);
        assert_eq!(no_action.len() + buys.len(), 1);
    }

    #[test]
    fn test_explain_mentions_signal_and_ticker() {
        let engine = EngineBuilder::new().build().unwrap();
        let provider = fixture_provider();
        let result =
            engine.analyze(&provider, "ACME", Some(&daily()), &CancelToken::new()).unwrap();
        let text = result.explain();
        assert!(text.contains("ACME"));
        assert!(text.contains("Signal:"));
    }

    #[test]
    fn test_volume_class_rank_ordering() {
        assert!(VolumeClass::VeryLow.rank() < VolumeClass::Low.rank());
        assert!(VolumeClass::Low.rank() < VolumeClass::Average.rank());
        assert!(VolumeClass::Average.rank() < VolumeClass::High.rank());
        assert!(VolumeClass::High.rank() < VolumeClass::VeryHigh.rank());
    }

    #[test]
    fn test_wire_identifiers_are_stable() {
        assert_eq!(serde_json::to_string(&SignalType::NoAction).unwrap(), "\"NO_ACTION\"");
        assert_eq!(serde_json::to_string(&VolumeClass::VeryHigh).unwrap(), "\"VERY_HIGH\"");
        assert_eq!(serde_json::to_string(&TrendDirection::SlightUp).unwrap(), "\"SLIGHT_UP\"");
        assert_eq!(
            serde_json::to_string(&wyckoff::WyckoffEventKind::AutoReaction).unwrap(),
            "\"AUTO_REACTION\""
        );
        assert_eq!(
            serde_json::to_string(&wyckoff::MarketContext::Undetermined).unwrap(),
            "\"UNDETERMINED\""
        );
    }
}
