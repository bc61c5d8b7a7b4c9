//! Windowed trend analysis: price direction versus volume behavior.

use std::sync::Arc;

use crate::params::Parameters;
use crate::series::{Processed, EPSILON};
use crate::{
    AnalysisError, Result, SignalBias, TrendDirection, TrendSignal, VolumeClass, VolumeDirection,
};

/// Outcome of a trend analysis over a lookback window.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendResult {
    pub trend_direction: TrendDirection,
    pub price_change_percent: f64,
    pub volume_trend: VolumeDirection,
    pub volume_change_percent: f64,
    pub signal_type: TrendSignal,
    pub signal_strength: SignalBias,
    pub details: String,
}

/// Classifies the trend over a trailing window and decides whether volume
/// confirms or contradicts it.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    params: Arc<Parameters>,
}

impl TrendAnalyzer {
    pub fn new(params: Arc<Parameters>) -> Self {
        Self { params }
    }

    /// Analyze the window ending at `index`. `lookback` overrides the
    /// configured trend lookback when given.
    pub fn analyze_trend(
        &self,
        processed: &Processed,
        index: usize,
        lookback: Option<usize>,
    ) -> Result<TrendResult> {
        if index >= processed.len() {
            return Err(AnalysisError::IndexOutOfRange { index, len: processed.len() });
        }
        let t = &self.params.trend;
        let lookback = lookback.unwrap_or(t.lookback_period).max(1);
        let start = index.saturating_sub(lookback);

        // Cumulative percent price change across the window.
        let start_close = processed.close[start];
        let end_close = processed.close[index];
        let price_change_percent = if start_close.abs() > EPSILON {
            (end_close - start_close) / start_close * 100.0
        } else {
            0.0
        };

        let trend_direction = if price_change_percent.abs() < t.slight_threshold_pct {
            TrendDirection::Sideways
        } else if price_change_percent > 0.0 {
            if price_change_percent > t.strong_threshold_pct {
                TrendDirection::Up
            } else {
                TrendDirection::SlightUp
            }
        } else if price_change_percent < -t.strong_threshold_pct {
            TrendDirection::Down
        } else {
            TrendDirection::SlightDown
        };

        // Volume behavior from the OBV slope over the same window.
        let obv_change = processed.obv[index] - processed.obv[start];
        let window = &processed.obv[start..=index];
        let obv_scale =
            window.iter().map(|v| v.abs()).sum::<f64>() / window.len() as f64;
        let obv_threshold = obv_scale * (t.volume_change_threshold_pct / 100.0);
        let volume_trend = if obv_change > obv_threshold + EPSILON {
            VolumeDirection::Increasing
        } else if obv_change < -obv_threshold - EPSILON {
            VolumeDirection::Decreasing
        } else {
            VolumeDirection::Flat
        };

        let start_volume = processed.volume[start];
        let volume_change_percent = if start_volume.abs() > EPSILON {
            (processed.volume[index] - start_volume) / start_volume * 100.0
        } else {
            0.0
        };

        let (signal_type, mut signal_strength, details) = match (trend_direction, volume_trend) {
            (TrendDirection::Sideways, _) => (
                TrendSignal::Consolidation,
                SignalBias::Neutral,
                format!(
                    "Sideways price movement ({price_change_percent:.2}%) indicates consolidation"
                ),
            ),
            (d, VolumeDirection::Increasing) if d.is_up() => (
                TrendSignal::TrendValidation,
                SignalBias::Bullish,
                format!(
                    "Rising price ({price_change_percent:.2}%) with rising volume \
                     ({volume_change_percent:.2}%) confirms bullish trend"
                ),
            ),
            (d, VolumeDirection::Decreasing) if d.is_up() => (
                TrendSignal::TrendAnomaly,
                SignalBias::Bearish,
                format!(
                    "Rising price ({price_change_percent:.2}%) with falling volume \
                     ({volume_change_percent:.2}%) indicates weakening bullish trend"
                ),
            ),
            (d, VolumeDirection::Decreasing) if d.is_down() => (
                TrendSignal::TrendValidation,
                SignalBias::Bearish,
                format!(
                    "Falling price ({price_change_percent:.2}%) with volume pressure on the \
                     downside confirms bearish trend"
                ),
            ),
            (d, VolumeDirection::Increasing) if d.is_down() => (
                TrendSignal::TrendAnomaly,
                SignalBias::Bullish,
                format!(
                    "Falling price ({price_change_percent:.2}%) against accumulating volume \
                     indicates weakening bearish trend"
                ),
            ),
            // Flat volume neither confirms nor contradicts; the price trend
            // stands on its own.
            (d, _) => (
                TrendSignal::TrendValidation,
                if d.is_up() { SignalBias::Bullish } else { SignalBias::Bearish },
                format!(
                    "Price trend ({price_change_percent:.2}%) with flat volume \
                     ({volume_change_percent:.2}%)"
                ),
            ),
        };

        // Repeated high-volume bars against the move hint at a climax.
        let mut details = details;
        let high_volume_count = processed.volume_class[start..=index]
            .iter()
            .filter(|c| matches!(c, VolumeClass::High | VolumeClass::VeryHigh))
            .count();
        if high_volume_count >= 3 {
            if trend_direction == TrendDirection::Up {
                details.push_str("; multiple high volume bars in uptrend may indicate buying climax");
                signal_strength = SignalBias::Bearish;
            } else if trend_direction == TrendDirection::Down {
                details
                    .push_str("; multiple high volume bars in downtrend may indicate selling climax");
                signal_strength = SignalBias::Bullish;
            }
        }

        Ok(TrendResult {
            trend_direction,
            price_change_percent,
            volume_trend,
            volume_change_percent,
            signal_type,
            signal_strength,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CandleClass, PriceDirection};

    fn bundle(close: Vec<f64>, volume: Vec<f64>, obv: Vec<f64>) -> Processed {
        let n = close.len();
        Processed {
            timestamps: (0..n as i64).collect(),
            open: close.clone(),
            high: close.iter().map(|c| c + 1.0).collect(),
            low: close.iter().map(|c| c - 1.0).collect(),
            close,
            volume,
            spread: vec![0.0; n],
            body_percent: vec![0.0; n],
            upper_wick: vec![1.0; n],
            lower_wick: vec![1.0; n],
            avg_volume: vec![f64::NAN; n],
            volume_ratio: vec![f64::NAN; n],
            volume_class: vec![VolumeClass::Average; n],
            candle_class: vec![CandleClass::Neutral; n],
            atr: vec![f64::NAN; n],
            obv,
            price_direction: vec![PriceDirection::Sideways; n],
            volume_direction: vec![VolumeDirection::Flat; n],
        }
    }

    fn analyzer() -> TrendAnalyzer {
        TrendAnalyzer::new(Arc::new(Parameters::default()))
    }

    #[test]
    fn test_rising_price_rising_volume_validates() {
        let close = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let volume = vec![100.0, 150.0, 200.0, 250.0, 300.0, 350.0];
        let obv = vec![0.0, 150.0, 350.0, 600.0, 900.0, 1250.0];
        let result = analyzer().analyze_trend(&bundle(close, volume, obv), 5, None).unwrap();
        assert_eq!(result.trend_direction, TrendDirection::Up);
        assert_eq!(result.volume_trend, VolumeDirection::Increasing);
        assert_eq!(result.signal_type, TrendSignal::TrendValidation);
        assert_eq!(result.signal_strength, SignalBias::Bullish);
    }

    #[test]
    fn test_rising_price_falling_obv_is_anomaly() {
        let close = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let volume = vec![350.0, 300.0, 250.0, 200.0, 150.0, 100.0];
        // Falling OBV while price rises.
        let obv = vec![1000.0, 800.0, 600.0, 400.0, 200.0, 0.0];
        let result = analyzer().analyze_trend(&bundle(close, volume, obv), 5, None).unwrap();
        assert_eq!(result.signal_type, TrendSignal::TrendAnomaly);
        assert_eq!(result.signal_strength, SignalBias::Bearish);
    }

    #[test]
    fn test_sideways_is_consolidation() {
        let close = vec![100.0, 100.5, 99.8, 100.2, 100.1, 100.0];
        let volume = vec![100.0; 6];
        let obv = vec![0.0; 6];
        let result = analyzer().analyze_trend(&bundle(close, volume, obv), 5, None).unwrap();
        assert_eq!(result.trend_direction, TrendDirection::Sideways);
        assert_eq!(result.signal_type, TrendSignal::Consolidation);
        assert_eq!(result.signal_strength, SignalBias::Neutral);
    }

    #[test]
    fn test_slight_down_classification() {
        // ~-3% over the window: beyond slight (2%), short of strong (5%).
        let close = vec![100.0, 99.5, 99.0, 98.3, 97.6, 97.0];
        let volume = vec![100.0, 120.0, 140.0, 160.0, 180.0, 200.0];
        let obv = vec![0.0, -120.0, -260.0, -420.0, -600.0, -800.0];
        let result = analyzer().analyze_trend(&bundle(close, volume, obv), 5, None).unwrap();
        assert_eq!(result.trend_direction, TrendDirection::SlightDown);
        assert_eq!(result.signal_type, TrendSignal::TrendValidation);
        assert_eq!(result.signal_strength, SignalBias::Bearish);
    }

    #[test]
    fn test_climax_override_flips_bias() {
        let close = vec![100.0, 103.0, 106.0, 109.0, 112.0, 115.0];
        let volume = vec![100.0, 200.0, 300.0, 400.0, 500.0, 600.0];
        let obv = vec![0.0, 200.0, 500.0, 900.0, 1400.0, 2000.0];
        let mut processed = bundle(close, volume, obv);
        for class in processed.volume_class.iter_mut() {
            *class = VolumeClass::VeryHigh;
        }
        let result = analyzer().analyze_trend(&processed, 5, None).unwrap();
        assert_eq!(result.trend_direction, TrendDirection::Up);
        assert_eq!(result.signal_strength, SignalBias::Bearish);
        assert!(result.details.contains("buying climax"));
    }

    #[test]
    fn test_index_out_of_range() {
        let processed = bundle(vec![100.0], vec![10.0], vec![0.0]);
        assert!(matches!(
            analyzer().analyze_trend(&processed, 3, None),
            Err(AnalysisError::IndexOutOfRange { .. })
        ));
    }
}
