//! Point-in-time analysis: the multi-timeframe view truncated at a target
//! timestamp, for historical reconstruction.

use std::sync::Arc;

use tracing::warn;

use crate::analyzers::{
    BarSignal, CandleAnalyzer, PatternAnalysis, PatternRecognizer, SupportResistance,
    SupportResistanceAnalyzer, TrendAnalyzer, TrendResult,
};
use crate::params::Parameters;
use crate::processor::DataProcessor;
use crate::series::{BarSeries, Processed, VolumeSeries, EPSILON};
use crate::{AnalysisError, Result, SignalBias, SignalType};

/// One timeframe's analysis as of the cutoff bar.
#[derive(Debug, Clone)]
pub struct PointInTimeSignal {
    pub timestamp: i64,
    pub candle: BarSignal,
    pub trend: TrendResult,
    pub patterns: PatternAnalysis,
    pub support_resistance: SupportResistance,
    pub pattern_summary: String,
}

/// Stop/target derived from the primary timeframe at the cutoff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskReward {
    pub current_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk: f64,
    pub reward: f64,
    pub risk_reward_ratio: f64,
}

/// Windowed volatility snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volatility {
    pub atr: f64,
    pub volatility_percent: f64,
}

/// Full point-in-time report across timeframes.
#[derive(Debug, Clone)]
pub struct PointInTimeReport {
    pub timestamp: i64,
    pub signals: Vec<(String, PointInTimeSignal)>,
    pub risk_reward: RiskReward,
    pub volatility: Volatility,
    /// Cross-timeframe confidence in [0, 1]; 0.5 is neutral.
    pub confidence_score: f64,
}

/// Re-runs the per-timeframe analyzers against truncated history.
#[derive(Debug, Clone)]
pub struct PointInTimeAnalyzer {
    params: Arc<Parameters>,
    processor: DataProcessor,
    candle: CandleAnalyzer,
    trend: TrendAnalyzer,
    patterns: PatternRecognizer,
    support_resistance: SupportResistanceAnalyzer,
}

impl PointInTimeAnalyzer {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self {
            processor: DataProcessor::new(Arc::clone(&params)),
            candle: CandleAnalyzer::new(),
            trend: TrendAnalyzer::new(Arc::clone(&params)),
            patterns: PatternRecognizer::new(Arc::clone(&params)),
            support_resistance: SupportResistanceAnalyzer::new(Arc::clone(&params)),
            params,
        }
    }

    /// Truncate every timeframe's raw series at `cutoff`, re-derive features
    /// and analyze the final bar. Timeframes that end up too short are
    /// skipped; the report fails only when nothing survives.
    pub fn analyze_at(
        &self,
        data_by_timeframe: &[(String, (BarSeries, VolumeSeries))],
        cutoff: i64,
    ) -> Result<PointInTimeReport> {
        let min_bars = self.params.point_in_time.min_required_bars;
        let mut processed_by_timeframe = Vec::new();

        for (timeframe, (price, volume)) in data_by_timeframe {
            let price = price.truncated_at(cutoff);
            let volume = volume.truncated_at(cutoff);
            match self.processor.preprocess(&price, &volume) {
                Ok(processed) if processed.len() >= min_bars => {
                    processed_by_timeframe.push((timeframe.clone(), processed));
                }
                Ok(processed) => {
                    warn!(
                        %timeframe,
                        got = processed.len(),
                        need = min_bars,
                        "timeframe too short after truncation, skipping"
                    );
                }
                Err(error) => {
                    warn!(%timeframe, %error, "timeframe failed preprocessing, skipping");
                }
            }
        }

        if processed_by_timeframe.is_empty() {
            return Err(AnalysisError::InsufficientData { need: min_bars, got: 0 });
        }

        let signals = self.analyze_all(&processed_by_timeframe)?;

        let (_, primary) = &processed_by_timeframe[0];
        let primary_signal = &signals[0].1;
        let risk_reward = self.compute_risk_reward(primary, primary_signal);
        let volatility = self.compute_volatility(primary);
        let confidence_score = self.compute_confidence_score(&signals);

        Ok(PointInTimeReport {
            timestamp: primary.last_timestamp().unwrap_or(cutoff),
            signals,
            risk_reward,
            volatility,
            confidence_score,
        })
    }

    /// Analyze the last bar of every processed bundle.
    pub fn analyze_all(
        &self,
        processed_by_timeframe: &[(String, Processed)],
    ) -> Result<Vec<(String, PointInTimeSignal)>> {
        let mut signals = Vec::new();
        for (timeframe, processed) in processed_by_timeframe {
            let Some(last) = processed.last_index() else { continue };

            let candle = self.candle.analyze_bar(last, processed)?;
            let trend = self.trend.analyze_trend(processed, last, None)?;
            let patterns = self.patterns.identify_patterns(processed, last)?;
            let support_resistance = self.support_resistance.analyze(processed)?;

            let mut summary: Vec<String> = Vec::new();
            for (name, detection) in [
                ("accumulation", &patterns.accumulation),
                ("distribution", &patterns.distribution),
                ("buying climax", &patterns.buying_climax),
                ("selling climax", &patterns.selling_climax),
            ] {
                if detection.detected {
                    summary.push(format!("{name} (strength {})", detection.strength));
                }
            }
            if patterns.testing.detected {
                summary.push(format!("{} level tests", patterns.testing.tests.len()));
            }
            let pattern_summary = if summary.is_empty() {
                "no significant patterns detected".to_string()
            } else {
                summary.join(", ")
            };

            signals.push((
                timeframe.clone(),
                PointInTimeSignal {
                    timestamp: processed.timestamps[last],
                    candle,
                    trend,
                    patterns,
                    support_resistance,
                    pattern_summary,
                },
            ));
        }
        Ok(signals)
    }

    /// Stop/target around the cutoff price, keyed on the candle bias.
    pub fn compute_risk_reward(
        &self,
        processed: &Processed,
        signal: &PointInTimeSignal,
    ) -> RiskReward {
        let Some(current_price) = processed.last_close() else {
            return RiskReward::default();
        };
        let sr = &signal.support_resistance;
        let supports: Vec<f64> = sr.support.iter().map(|level| level.price).collect();
        let resistances: Vec<f64> = sr.resistance.iter().map(|level| level.price).collect();

        let (stop_loss, take_profit) = match signal.candle.signal_type {
            SignalType::Buy => {
                let stop = supports
                    .iter()
                    .copied()
                    .filter(|&p| p < current_price)
                    .max_by(f64::total_cmp)
                    .unwrap_or(current_price * 0.95);
                let target = resistances
                    .iter()
                    .copied()
                    .filter(|&p| p > current_price)
                    .min_by(f64::total_cmp)
                    .unwrap_or(current_price * 1.10);
                (stop, target)
            }
            SignalType::Sell => {
                let stop = resistances
                    .iter()
                    .copied()
                    .filter(|&p| p > current_price)
                    .min_by(f64::total_cmp)
                    .unwrap_or(current_price * 1.05);
                let target = supports
                    .iter()
                    .copied()
                    .filter(|&p| p < current_price)
                    .max_by(f64::total_cmp)
                    .unwrap_or(current_price * 0.90);
                (stop, target)
            }
            SignalType::NoAction => (current_price, current_price),
        };

        let risk = (current_price - stop_loss).abs();
        let reward = (take_profit - current_price).abs();
        RiskReward {
            current_price,
            stop_loss,
            take_profit,
            risk,
            reward,
            risk_reward_ratio: if risk > EPSILON { reward / risk } else { 0.0 },
        }
    }

    /// ATR over the trailing window, and as a percentage of price.
    pub fn compute_volatility(&self, processed: &Processed) -> Volatility {
        let lookback = self.params.trend.atr_period.max(2);
        let n = processed.len();
        if n < 2 {
            return Volatility::default();
        }
        let start = n.saturating_sub(lookback);
        let mut true_ranges = Vec::new();
        for i in start.max(1)..n {
            let tr = (processed.high[i] - processed.low[i])
                .max((processed.high[i] - processed.close[i - 1]).abs())
                .max((processed.low[i] - processed.close[i - 1]).abs());
            true_ranges.push(tr);
        }
        let atr = true_ranges.iter().sum::<f64>() / true_ranges.len() as f64;
        let current_price = processed.close[n - 1];
        Volatility {
            atr,
            volatility_percent: if current_price > EPSILON {
                atr / current_price * 100.0
            } else {
                0.0
            },
        }
    }

    /// Aggregate the per-timeframe signals into one confidence number.
    /// Climaxes vote twice as heavily as the slower patterns.
    pub fn compute_confidence_score(&self, signals: &[(String, PointInTimeSignal)]) -> f64 {
        let mut bullish = 0.0;
        let mut bearish = 0.0;
        let mut neutral = 0.0;

        for (_, signal) in signals {
            match signal.candle.signal_type {
                SignalType::Buy => bullish += 1.0,
                SignalType::Sell => bearish += 1.0,
                SignalType::NoAction => neutral += 1.0,
            }
            match signal.trend.signal_strength {
                SignalBias::Bullish => bullish += 1.0,
                SignalBias::Bearish => bearish += 1.0,
                SignalBias::Neutral => neutral += 1.0,
            }
            let p = &signal.patterns;
            if p.selling_climax.detected {
                bullish += 2.0;
            }
            if p.buying_climax.detected {
                bearish += 2.0;
            }
            if p.accumulation.detected {
                bullish += 1.0;
            }
            if p.distribution.detected {
                bearish += 1.0;
            }
        }

        let total = bullish + bearish + neutral;
        if total <= EPSILON {
            return 0.5;
        }
        (0.5 + (bullish - bearish) / total * 0.25).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize, trend: f64) -> (BarSeries, VolumeSeries) {
        let mut price = BarSeries::new();
        let mut volume = VolumeSeries::new();
        for i in 0..n {
            let base = 100.0 + trend * i as f64;
            price.push(i as i64, base, base + 1.0, base - 1.0, base + 0.3);
            volume.push(i as i64, 1000.0);
        }
        (price, volume)
    }

    fn analyzer() -> PointInTimeAnalyzer {
        let mut params = Parameters::default();
        params.volume.lookback_period = 5;
        params.candle.lookback_period = 5;
        params.trend.atr_period = 5;
        params.wyckoff.vol_lookback = 5;
        params.wyckoff.swing_n = 2;
        params.point_in_time.min_required_bars = 10;
        PointInTimeAnalyzer::new(Arc::new(params))
    }

    #[test]
    fn test_truncation_respects_cutoff() {
        let data = vec![("1d".to_string(), series(60, 0.5))];
        let report = analyzer().analyze_at(&data, 39).unwrap();
        assert_eq!(report.timestamp, 39);
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].1.timestamp, 39);
    }

    #[test]
    fn test_too_short_after_truncation_is_insufficient() {
        let data = vec![("1d".to_string(), series(60, 0.5))];
        assert!(matches!(
            analyzer().analyze_at(&data, 3),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_same_cutoff_reproduces_signal() {
        let data = vec![("1d".to_string(), series(60, 0.5))];
        let first = analyzer().analyze_at(&data, 39).unwrap();
        let second = analyzer().analyze_at(&data, 39).unwrap();
        assert_eq!(first.signals[0].1.candle.signal_type, second.signals[0].1.candle.signal_type);
        assert_eq!(first.confidence_score, second.confidence_score);
        assert_eq!(first.risk_reward, second.risk_reward);
    }

    #[test]
    fn test_volatility_positive_for_moving_prices() {
        let data = vec![("1d".to_string(), series(60, 0.5))];
        let report = analyzer().analyze_at(&data, 59).unwrap();
        assert!(report.volatility.atr > 0.0);
        assert!(report.volatility.volatility_percent > 0.0);
    }

    #[test]
    fn test_confidence_score_bounded() {
        let data = vec![
            ("1d".to_string(), series(60, 0.5)),
            ("1h".to_string(), series(60, -0.5)),
        ];
        let report = analyzer().analyze_at(&data, 59).unwrap();
        assert!((0.0..=1.0).contains(&report.confidence_score));
    }
}
