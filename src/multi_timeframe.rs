//! Multi-timeframe dispatch and cross-timeframe confirmations.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::analyzers::{
    BarSignal, CandleAnalyzer, PatternAnalysis, PatternRecognizer, SupportResistance,
    SupportResistanceAnalyzer, TrendAnalyzer, TrendResult,
};
use crate::params::Parameters;
use crate::processor::DataProcessor;
use crate::series::{BarSeries, Processed, VolumeSeries};
use crate::{AnalysisError, CancelToken, Result, SignalType, TrendDirection, VolumeClass};

/// Everything the engine derives for a single timeframe.
#[derive(Debug, Clone)]
pub struct TimeframeAnalysis {
    pub candle_analysis: BarSignal,
    pub trend_analysis: TrendResult,
    pub pattern_analysis: PatternAnalysis,
    pub support_resistance: SupportResistance,
    pub processed_data: Processed,
}

/// Cross-timeframe agreement measures feeding the signal generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmations {
    /// Fraction of timeframes trending up with a buy-side candle signal.
    pub bullish_alignment: f64,
    /// Fraction of timeframes trending down with a sell-side candle signal.
    pub bearish_alignment: f64,
    /// Majority of timeframes closed their last bar on high volume.
    pub volume_confirmation: bool,
    /// Any timeframe detected accumulation.
    pub bullish_pattern_confirmation: bool,
    /// Any timeframe detected distribution.
    pub bearish_pattern_confirmation: bool,
}

/// Per-timeframe analyses in request order, plus isolated failures.
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframeReport {
    pub analyses: Vec<(String, TimeframeAnalysis)>,
    pub failures: Vec<(String, AnalysisError)>,
    pub confirmations: Confirmations,
}

impl MultiTimeframeReport {
    pub fn get(&self, timeframe: &str) -> Option<&TimeframeAnalysis> {
        self.analyses
            .iter()
            .find(|(key, _)| key == timeframe)
            .map(|(_, analysis)| analysis)
    }

    /// The first successfully analyzed timeframe.
    pub fn primary(&self) -> Option<(&str, &TimeframeAnalysis)> {
        self.analyses.first().map(|(key, analysis)| (key.as_str(), analysis))
    }
}

/// Runs the per-timeframe analyzers and derives confirmations.
#[derive(Debug, Clone)]
pub struct MultiTimeframeAnalyzer {
    processor: DataProcessor,
    candle: CandleAnalyzer,
    trend: TrendAnalyzer,
    patterns: PatternRecognizer,
    support_resistance: SupportResistanceAnalyzer,
}

impl MultiTimeframeAnalyzer {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self {
            processor: DataProcessor::new(Arc::clone(&params)),
            candle: CandleAnalyzer::new(),
            trend: TrendAnalyzer::new(Arc::clone(&params)),
            patterns: PatternRecognizer::new(Arc::clone(&params)),
            support_resistance: SupportResistanceAnalyzer::new(params),
        }
    }

    /// Analyze every timeframe in request order. Failures are isolated per
    /// timeframe; the report carries both outcomes. Cancellation is honored
    /// between timeframes.
    pub fn analyze(
        &self,
        data_by_timeframe: &[(String, (BarSeries, VolumeSeries))],
        cancel: &CancelToken,
    ) -> Result<MultiTimeframeReport> {
        let mut report = MultiTimeframeReport::default();

        for (timeframe, (price, volume)) in data_by_timeframe {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            match self.analyze_series(price, volume) {
                Ok(analysis) => {
                    debug!(%timeframe, "timeframe analysis complete");
                    report.analyses.push((timeframe.clone(), analysis));
                }
                Err(error) => {
                    warn!(%timeframe, %error, "timeframe analysis failed, continuing");
                    report.failures.push((timeframe.clone(), error));
                }
            }
        }

        report.confirmations = self.identify_confirmations(&report.analyses);
        Ok(report)
    }

    /// Preprocess one timeframe's raw series and analyze its last bar.
    pub fn analyze_series(
        &self,
        price: &BarSeries,
        volume: &VolumeSeries,
    ) -> Result<TimeframeAnalysis> {
        let processed = self.processor.preprocess(price, volume)?;
        self.analyze_processed(processed)
    }

    /// Analyze an already-processed bundle at its last bar.
    pub fn analyze_processed(&self, processed: Processed) -> Result<TimeframeAnalysis> {
        let last = processed
            .last_index()
            .ok_or(AnalysisError::InsufficientData { need: 1, got: 0 })?;

        Ok(TimeframeAnalysis {
            candle_analysis: self.candle.analyze_bar(last, &processed)?,
            trend_analysis: self.trend.analyze_trend(&processed, last, None)?,
            pattern_analysis: self.patterns.identify_patterns(&processed, last)?,
            support_resistance: self.support_resistance.analyze(&processed)?,
            processed_data: processed,
        })
    }

    /// Cross-timeframe agreement, per the alignment/voting rules.
    fn identify_confirmations(&self, analyses: &[(String, TimeframeAnalysis)]) -> Confirmations {
        if analyses.is_empty() {
            return Confirmations::default();
        }
        let total = analyses.len() as f64;

        let bullish = analyses
            .iter()
            .filter(|(_, a)| {
                matches!(
                    a.trend_analysis.trend_direction,
                    TrendDirection::Up | TrendDirection::SlightUp
                ) && a.candle_analysis.signal_type == SignalType::Buy
            })
            .count() as f64;
        let bearish = analyses
            .iter()
            .filter(|(_, a)| {
                matches!(
                    a.trend_analysis.trend_direction,
                    TrendDirection::Down | TrendDirection::SlightDown
                ) && a.candle_analysis.signal_type == SignalType::Sell
            })
            .count() as f64;

        let high_volume_closes = analyses
            .iter()
            .filter(|(_, a)| {
                a.processed_data
                    .volume_class
                    .last()
                    .is_some_and(|c| matches!(c, VolumeClass::High | VolumeClass::VeryHigh))
            })
            .count();

        Confirmations {
            bullish_alignment: bullish / total,
            bearish_alignment: bearish / total,
            volume_confirmation: high_volume_closes * 2 > analyses.len(),
            bullish_pattern_confirmation: analyses
                .iter()
                .any(|(_, a)| a.pattern_analysis.accumulation.detected),
            bearish_pattern_confirmation: analyses
                .iter()
                .any(|(_, a)| a.pattern_analysis.distribution.detected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize, trend: f64, volume: f64) -> (BarSeries, VolumeSeries) {
        let mut price = BarSeries::new();
        let mut vol = VolumeSeries::new();
        for i in 0..n {
            let base = 100.0 + trend * i as f64;
            price.push(i as i64, base, base + 1.0, base - 1.0, base + 0.3);
            vol.push(i as i64, volume);
        }
        (price, vol)
    }

    fn analyzer() -> MultiTimeframeAnalyzer {
        let mut params = Parameters::default();
        params.volume.lookback_period = 5;
        params.candle.lookback_period = 5;
        params.trend.atr_period = 5;
        params.wyckoff.vol_lookback = 5;
        params.wyckoff.swing_n = 2;
        MultiTimeframeAnalyzer::new(Arc::new(params))
    }

    #[test]
    fn test_failures_are_isolated() {
        let good = series(40, 0.5, 1000.0);
        let bad = series(3, 0.5, 1000.0); // below minimum length

        let data = vec![
            ("1d".to_string(), good),
            ("1h".to_string(), bad),
        ];
        let report = analyzer().analyze(&data, &CancelToken::new()).unwrap();
        assert_eq!(report.analyses.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "1h");
        assert!(matches!(report.failures[0].1, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_request_order_preserved() {
        let data = vec![
            ("1d".to_string(), series(40, 0.2, 1000.0)),
            ("1h".to_string(), series(40, -0.2, 1000.0)),
            ("15m".to_string(), series(40, 0.0, 1000.0)),
        ];
        let report = analyzer().analyze(&data, &CancelToken::new()).unwrap();
        let keys: Vec<&str> = report.analyses.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["1d", "1h", "15m"]);
        assert_eq!(report.primary().unwrap().0, "1d");
    }

    #[test]
    fn test_cancellation_between_timeframes() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let data = vec![("1d".to_string(), series(40, 0.2, 1000.0))];
        assert!(matches!(
            analyzer().analyze(&data, &cancel),
            Err(AnalysisError::Cancelled)
        ));
    }

    #[test]
    fn test_confirmations_empty_report() {
        let report = analyzer().analyze(&[], &CancelToken::new()).unwrap();
        assert_eq!(report.confirmations, Confirmations::default());
        assert!(report.primary().is_none());
    }
}
